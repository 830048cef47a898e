use std::collections::BTreeMap;
use std::time::Instant;

use hopnet_proto::NodeAddr;
use hopnet_proto::constants::{DEAD_PING_MULTIPLIER, PING_INTERVAL};
use smallvec::SmallVec;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct PingState {
    last_sent: Instant,
    last_received: Instant,
}

/// Per-neighbour liveness bookkeeping.
///
/// Every received `L` datagram counts as a ping from its sender; every
/// neighbour is pinged at least once per [`PING_INTERVAL`]. A neighbour
/// silent for [`DEAD_PING_MULTIPLIER`] intervals is reported dead and
/// forgotten until it pings again.
#[derive(Debug, Default)]
pub struct PingTracker {
    peers: BTreeMap<NodeAddr, PingState>,
}

impl PingTracker {
    pub fn new<I: IntoIterator<Item = NodeAddr>>(initial: I, now: Instant) -> Self {
        let fresh = PingState {
            last_sent: now,
            last_received: now,
        };
        Self {
            peers: initial.into_iter().map(|addr| (addr, fresh)).collect(),
        }
    }

    /// Notes a ping from `peer`, starting to track it if it was unknown.
    pub fn record_received(&mut self, peer: NodeAddr, now: Instant) {
        self.peers
            .entry(peer)
            .or_insert(PingState {
                last_sent: now,
                last_received: now,
            })
            .last_received = now;
    }

    pub fn mark_sent(&mut self, peer: NodeAddr, now: Instant) {
        if let Some(state) = self.peers.get_mut(&peer) {
            state.last_sent = now;
        }
    }

    /// Peers whose last outgoing ping is older than one interval.
    pub fn pings_due(&self, now: Instant) -> SmallVec<[NodeAddr; 8]> {
        self.peers
            .iter()
            .filter(|(_, state)| now.duration_since(state.last_sent) > PING_INTERVAL)
            .map(|(&peer, _)| peer)
            .collect()
    }

    /// Peers that have missed six intervals of pings.
    pub fn dead_peers(&self, now: Instant) -> SmallVec<[NodeAddr; 8]> {
        let cutoff = PING_INTERVAL * DEAD_PING_MULTIPLIER;
        self.peers
            .iter()
            .filter(|(_, state)| now.duration_since(state.last_received) > cutoff)
            .map(|(&peer, _)| peer)
            .collect()
    }

    pub fn forget(&mut self, peer: NodeAddr) {
        if self.peers.remove(&peer).is_some() {
            debug!(%peer, "stopped tracking neighbour");
        }
    }

    pub fn tracked(&self) -> impl Iterator<Item = NodeAddr> + '_ {
        self.peers.keys().copied()
    }

    pub fn is_tracked(&self, peer: NodeAddr) -> bool {
        self.peers.contains_key(&peer)
    }
}
