use thiserror::Error;

/// Decode failures for the fixed-layout wire types.
///
/// Every variant is a reason to drop the datagram; none of them is ever
/// propagated back onto the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    #[error("packet truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("unknown packet type {0:#04x}")]
    BadPacketType(u8),
    #[error("priority {0} out of range")]
    BadPriority(u8),
    #[error("source ip is zero")]
    ZeroSourceIp,
    #[error("malformed address token {0:?}")]
    BadAddrToken(String),
}
