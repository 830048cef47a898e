//! # hopnet-transfer
//!
//! The overlay's endpoints: the sender's reliable-delivery window, the
//! requester's segmented reassembly, the tracker file that maps a filename
//! to the senders serving it, and the route-trace probe loop.
//!
//! Each piece is a socket-free state machine; the binaries in `src/bin/`
//! bolt them onto UDP sockets and drive them from a cooperative poll loop.

pub mod error;
pub mod net;
pub mod reassembly;
pub mod request;
pub mod trace;
pub mod tracker;
pub mod window;

pub use error::TransferError;
pub use reassembly::{Reassembly, ReassemblyBuffer};
pub use request::FileRequest;
pub use trace::TraceProbe;
pub use tracker::{Tracker, TrackerEntry};
pub use window::{SenderWindow, WindowConfig};
