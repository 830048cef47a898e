use thiserror::Error;

/// Errors raised while loading topology files or parsing advertisements.
///
/// Topology failures are fatal at bootstrap; advertisement failures just
/// drop the offending flood.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("io error reading topology: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed topology line {0:?}")]
    BadTopologyLine(String),
    #[error("cannot resolve host {0:?} to an IPv4 address")]
    Unresolvable(String),
    #[error("malformed link-state advertisement: {0}")]
    BadAdvertisement(String),
}
