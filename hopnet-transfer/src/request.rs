use hopnet_proto::NodeAddr;

use crate::error::TransferError;

/// The text payload of an `R` packet: what file the requester wants, where
/// its ingress emulator is (so the sender can address its tunnel headers),
/// and how large a window the sender may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequest {
    pub filename: String,
    pub requester_emulator: NodeAddr,
    pub window_size: usize,
}

impl FileRequest {
    pub fn to_payload(&self) -> String {
        format!(
            "{}\n{}\n{}",
            self.filename,
            self.requester_emulator.token(),
            self.window_size
        )
    }

    pub fn from_payload(payload: &str) -> Result<Self, TransferError> {
        let bad = |why: &str| TransferError::BadRequest(why.to_owned());
        let mut lines = payload.lines();
        let filename = lines.next().ok_or_else(|| bad("missing filename"))?.trim();
        if filename.is_empty() {
            return Err(bad("empty filename"));
        }
        let emulator = lines.next().ok_or_else(|| bad("missing emulator address"))?;
        let requester_emulator =
            NodeAddr::from_token(emulator).map_err(|_| bad("bad emulator address"))?;
        let window = lines.next().ok_or_else(|| bad("missing window size"))?;
        let window_size = window
            .trim()
            .parse()
            .map_err(|_| bad("bad window size"))?;
        Ok(Self {
            filename: filename.to_owned(),
            requester_emulator,
            window_size,
        })
    }
}
