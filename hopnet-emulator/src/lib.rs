//! # hopnet-emulator
//!
//! The emulator node: a store-and-forward relay that multiplexes four
//! concerns over one UDP socket.
//!
//! - **Link emulation**: forwarded packets pass through per-priority FIFO
//!   queues and a single delay slot; after the configured per-link delay a
//!   loss dice decides whether the packet is emitted or dropped.
//! - **Routing**: a link-state protocol discovers the emulator topology and
//!   keeps a first-hop forwarding table current as links come and go.
//! - **Tunnelling**: overlay clients register with their ingress emulator;
//!   their packets are wrapped in an emulator-to-emulator outer header on
//!   the way in and unwrapped at the egress emulator.
//! - **Tracing**: a packet arriving with TTL 0 provokes a reply that
//!   identifies this emulator, which is how route traces discover the path.
//!
//! [`node::EmulatorNode`] is a pure state machine: datagrams and clock
//! readings go in, `(destination, bytes)` emissions come out. The binary in
//! `src/bin/emulator.rs` owns the socket and the loop.

pub mod node;
pub mod queue;

pub use node::EmulatorNode;
pub use queue::PriorityQueueBank;
