//! # hopnet-routing
//!
//! Topology discovery and route computation for emulator nodes.
//!
//! An emulator bootstraps its view of the overlay from a topology file,
//! then keeps it alive with a link-state protocol: every node floods a
//! versioned advertisement of its neighbour set, and every node runs
//! unit-weight shortest-path over the resulting graph to derive a
//! first-hop forwarding table. Neighbour liveness is tracked by periodic
//! pings; a silent neighbour is eventually declared dead, which bumps the
//! local advertisement and triggers a re-flood.
//!
//! Everything here is pure bookkeeping, no sockets. The emulator's event
//! loop feeds in floods and clock readings and sends whatever this crate
//! tells it to.

pub mod error;
pub mod linkstate;
pub mod ping;
pub mod topology;

pub use error::RoutingError;
pub use linkstate::{FloodOutcome, LinkStateDb, LinkStateRecord};
pub use ping::PingTracker;
pub use topology::{LinkProps, Topology};
