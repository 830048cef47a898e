use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use hopnet_proto::NodeAddr;

use crate::error::TransferError;

/// One `filename file_id sender_emulator sender` line of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerEntry {
    pub file_id: u32,
    pub sender_emulator: NodeAddr,
    pub sender: NodeAddr,
}

/// The requester's tracker file: which senders serve which file, and the
/// order (`file_id` ascending) their chunks appear in the output.
///
/// Addresses use the `ip,port` token form; `#` comments are allowed.
#[derive(Debug, Default)]
pub struct Tracker {
    files: BTreeMap<String, Vec<TrackerEntry>>,
}

impl Tracker {
    pub fn load(path: &Path) -> Result<Self, TransferError> {
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn parse(text: &str) -> Result<Self, TransferError> {
        let mut files: BTreeMap<String, Vec<TrackerEntry>> = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let bad = || TransferError::BadTrackerLine(line.to_owned());
            let mut tokens = line.split_whitespace();
            let (Some(filename), Some(id), Some(emulator), Some(sender), None) = (
                tokens.next(),
                tokens.next(),
                tokens.next(),
                tokens.next(),
                tokens.next(),
            ) else {
                return Err(bad());
            };
            files.entry(filename.to_owned()).or_default().push(TrackerEntry {
                file_id: id.parse().map_err(|_| bad())?,
                sender_emulator: NodeAddr::from_token(emulator).map_err(|_| bad())?,
                sender: NodeAddr::from_token(sender).map_err(|_| bad())?,
            });
        }
        for entries in files.values_mut() {
            entries.sort_by_key(|entry| entry.file_id);
        }
        Ok(Self { files })
    }

    /// The senders serving `filename`, ascending by `file_id`. A filename
    /// the tracker does not know is a fatal configuration error.
    pub fn lookup(&self, filename: &str) -> Result<&[TrackerEntry], TransferError> {
        self.files
            .get(filename)
            .map(Vec::as_slice)
            .ok_or_else(|| TransferError::NotTracked(filename.to_owned()))
    }
}
