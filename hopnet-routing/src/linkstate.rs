use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use hopnet_proto::NodeAddr;
use tracing::{debug, info};

use crate::error::RoutingError;
use crate::topology::{LinkProps, Topology};

/// One node's versioned view of its own links.
///
/// The record for a remote node only ever changes by accepting a flood with
/// a strictly higher `seq_no`; the local record changes when neighbours are
/// learned or declared dead, each change bumping `seq_no`. Records are
/// never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStateRecord {
    pub seq_no: u32,
    pub neighbours: BTreeSet<NodeAddr>,
}

/// What the pipeline must do after ingesting a flood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodOutcome {
    /// The advertisement was news: topology updated, forward it to every
    /// neighbour except the one it came from.
    Forward,
    /// Local state is newer than the sender's: answer with our copy of the
    /// originator's record.
    ReplyWithOwn,
    /// Same sequence number; nothing to do.
    Ignore,
}

/// The link-state database plus the forwarding table derived from it.
///
/// The graph is stored purely as a map keyed by node address; Dijkstra
/// runs over the map and leaves behind `destination -> first hop` entries
/// for every reachable node.
#[derive(Debug)]
pub struct LinkStateDb {
    self_addr: NodeAddr,
    records: BTreeMap<NodeAddr, LinkStateRecord>,
    forwarding: BTreeMap<NodeAddr, NodeAddr>,
    /// Emulation properties of the local node's outgoing links.
    link_props: BTreeMap<NodeAddr, LinkProps>,
}

impl LinkStateDb {
    /// Builds the database from a freshly loaded topology and computes the
    /// initial forwarding table. A `self_addr` absent from the topology
    /// yields an empty local record and an empty table.
    pub fn new(self_addr: NodeAddr, topology: &Topology) -> Self {
        let mut records: BTreeMap<NodeAddr, LinkStateRecord> = BTreeMap::new();
        let mut link_props = BTreeMap::new();
        for (&node, edges) in &topology.neighbours {
            let record = records.entry(node).or_default();
            for &(neighbour, props) in edges {
                record.neighbours.insert(neighbour);
                if node == self_addr {
                    link_props.insert(neighbour, props);
                }
            }
        }
        records.entry(self_addr).or_default();

        let mut db = Self {
            self_addr,
            records,
            forwarding: BTreeMap::new(),
            link_props,
        };
        db.build_forwarding_table();
        db
    }

    pub fn local_seq_no(&self) -> u32 {
        self.records[&self.self_addr].seq_no
    }

    pub fn local_neighbours(&self) -> &BTreeSet<NodeAddr> {
        &self.records[&self.self_addr].neighbours
    }

    pub fn record(&self, node: NodeAddr) -> Option<&LinkStateRecord> {
        self.records.get(&node)
    }

    /// Emulation properties of the link to a direct neighbour; links not in
    /// the topology file behave as perfect.
    pub fn link_props(&self, neighbour: NodeAddr) -> LinkProps {
        self.link_props.get(&neighbour).copied().unwrap_or_default()
    }

    pub fn find_next_hop(&self, dst: NodeAddr) -> Option<NodeAddr> {
        self.forwarding.get(&dst).copied()
    }

    /// The two-line ASCII advertisement for `node`, as flooded in `L`
    /// payloads: originator on the first line, originator plus neighbour
    /// list on the second.
    pub fn advertisement_payload(&self, node: NodeAddr) -> Option<String> {
        let record = self.records.get(&node)?;
        let mut second = node.token();
        for neighbour in &record.neighbours {
            second.push(' ');
            second.push_str(&neighbour.token());
        }
        Some(format!("{}\n{}", node.token(), second))
    }

    /// Parses an advertisement payload into its originator and neighbour
    /// list.
    pub fn parse_advertisement(payload: &str) -> Result<(NodeAddr, Vec<NodeAddr>), RoutingError> {
        let bad = |why: &str| RoutingError::BadAdvertisement(why.to_owned());
        let mut lines = payload.lines();
        let origin_line = lines.next().ok_or_else(|| bad("empty payload"))?;
        let origin = NodeAddr::from_token(origin_line)
            .map_err(|_| bad("bad originator token"))?;
        let neighbour_line = lines.next().ok_or_else(|| bad("missing neighbour line"))?;
        let mut tokens = neighbour_line.split_whitespace();
        let repeated = tokens.next().ok_or_else(|| bad("empty neighbour line"))?;
        if NodeAddr::from_token(repeated).map_err(|_| bad("bad originator token"))? != origin {
            return Err(bad("originator mismatch between lines"));
        }
        let mut neighbours = Vec::new();
        for token in tokens {
            neighbours
                .push(NodeAddr::from_token(token).map_err(|_| bad("bad neighbour token"))?);
        }
        Ok((origin, neighbours))
    }

    /// Ingests a flooded advertisement for `origin` carrying `new_seq_no`.
    ///
    /// A strictly newer advertisement replaces the stored neighbour set and
    /// rebuilds the forwarding table. A strictly older one means the sender
    /// is behind and must be told our copy. Equal sequence numbers change
    /// nothing.
    pub fn update_from_flood(
        &mut self,
        origin: NodeAddr,
        new_seq_no: u32,
        neighbours: &[NodeAddr],
    ) -> FloodOutcome {
        let record = self.records.entry(origin).or_default();
        let old_seq_no = record.seq_no;
        debug!(%origin, old_seq_no, new_seq_no, "link-state flood");
        if new_seq_no > old_seq_no {
            record.seq_no = new_seq_no;
            record.neighbours = neighbours.iter().copied().collect();
            info!(%origin, seq_no = new_seq_no, "accepted link-state update");
            self.build_forwarding_table();
            FloodOutcome::Forward
        } else if new_seq_no < old_seq_no {
            FloodOutcome::ReplyWithOwn
        } else {
            FloodOutcome::Ignore
        }
    }

    /// Adds a neighbour to the local record. Idempotent: the sequence
    /// number bumps and the table rebuilds only when the set actually grew.
    pub fn add_local_neighbour(&mut self, neighbour: NodeAddr) -> bool {
        let record = self
            .records
            .get_mut(&self.self_addr)
            .expect("local record always present");
        if !record.neighbours.insert(neighbour) {
            return false;
        }
        record.seq_no += 1;
        info!(%neighbour, seq_no = record.seq_no, "learned neighbour");
        self.build_forwarding_table();
        true
    }

    /// Drops dead neighbours from the local record; bumps and rebuilds only
    /// if any of them was actually present.
    pub fn remove_local_neighbours(&mut self, dead: &[NodeAddr]) -> bool {
        let record = self
            .records
            .get_mut(&self.self_addr)
            .expect("local record always present");
        let mut removed = false;
        for neighbour in dead {
            removed |= record.neighbours.remove(neighbour);
        }
        if !removed {
            return false;
        }
        record.seq_no += 1;
        info!(?dead, seq_no = record.seq_no, "removed dead neighbours");
        self.build_forwarding_table();
        true
    }

    /// Recomputes `destination -> first hop` for every node reachable from
    /// `self_addr`, treating every link as length 1.
    pub fn build_forwarding_table(&mut self) {
        self.forwarding.clear();

        let mut parents: BTreeMap<NodeAddr, NodeAddr> = BTreeMap::new();
        let mut costs: BTreeMap<NodeAddr, u32> = BTreeMap::new();
        let mut heap: BinaryHeap<Reverse<(u32, NodeAddr)>> = BinaryHeap::new();
        costs.insert(self.self_addr, 0);
        heap.push(Reverse((0, self.self_addr)));

        while let Some(Reverse((cost, node))) = heap.pop() {
            if cost > costs.get(&node).copied().unwrap_or(u32::MAX) {
                continue;
            }
            let Some(record) = self.records.get(&node) else {
                continue;
            };
            for &adjacent in &record.neighbours {
                let new_cost = cost + 1;
                if new_cost < costs.get(&adjacent).copied().unwrap_or(u32::MAX) {
                    parents.insert(adjacent, node);
                    costs.insert(adjacent, new_cost);
                    heap.push(Reverse((new_cost, adjacent)));
                }
            }
        }

        for &destination in parents.keys() {
            // Walk the parent chain back to the root; the node one step
            // short of it is the first hop.
            let mut hop = destination;
            loop {
                match parents.get(&hop) {
                    Some(&parent) if parent == self.self_addr => break,
                    Some(&parent) => hop = parent,
                    None => break,
                }
            }
            self.forwarding.insert(destination, hop);
        }

        self.log_snapshot();
    }

    fn log_snapshot(&self) {
        info!("topology:");
        for (node, record) in &self.records {
            let neighbours: Vec<String> =
                record.neighbours.iter().map(|n| n.to_string()).collect();
            info!(
                "  {} seq={} -> {}",
                node,
                record.seq_no,
                neighbours.join(",")
            );
        }
        info!("forwarding table:");
        for (destination, next_hop) in &self.forwarding {
            info!("  {destination} via {next_hop}");
        }
    }
}
