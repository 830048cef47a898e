use thiserror::Error;

/// Endpoint-side failures. The file-and-tracker variants are fatal at
/// startup; the rest are per-packet and only ever dropped and logged.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed tracker line {0:?}")]
    BadTrackerLine(String),
    #[error("file {0:?} is not in the tracker")]
    NotTracked(String),
    #[error("malformed request payload: {0}")]
    BadRequest(String),
}
