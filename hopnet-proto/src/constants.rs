use std::time::Duration;

/// Largest TTL a packet may carry; also the TTL stamped on trace replies.
pub const TTL_MAX: u16 = 50;

/// Priority classes are `0..MAX_PRIORITY_CLASSES`, lower number served first.
pub const MAX_PRIORITY_CLASSES: u8 = 128;

/// Receive buffer size for every node's UDP socket.
pub const BUF_SIZE: usize = 4096;

/// How often an emulator advertises its link state to each neighbour.
pub const PING_INTERVAL: Duration = Duration::from_millis(500);

/// Sleep between successive ping transmissions in one sweep.
pub const PING_SLEEP: Duration = Duration::from_millis(1);

/// A neighbour silent for `DEAD_PING_MULTIPLIER * PING_INTERVAL` is dead.
pub const DEAD_PING_MULTIPLIER: u32 = 6;
