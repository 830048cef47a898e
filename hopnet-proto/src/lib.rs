//! # hopnet-proto
//!
//! Wire types shared by every hopnet node role.
//!
//! The overlay exchanges fixed-layout, big-endian packets over UDP. A single
//! [`PacketHeader`] layout is used at both the outer (emulator-to-emulator)
//! and inner (end-to-end) level; tunnelled packets mark the outer header
//! with `wrapped` and carry the untouched inner header right behind it.
//! Client-originated packets additionally carry a [`TunnelHeader`] naming
//! the emulator that owns the far end of the tunnel.
//!
//! The codec is stateless and fully round-trippable: `decode(encode(h))`
//! reproduces `h` for every well-formed header.

pub mod constants;
pub mod error;
pub mod wire;

pub use error::ProtoError;
pub use wire::{NodeAddr, PacketHeader, PacketType, TunnelHeader};
