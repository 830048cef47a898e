use std::collections::{BTreeSet, VecDeque};
use std::time::{Duration, Instant};

use hopnet_proto::constants::TTL_MAX;
use hopnet_proto::{NodeAddr, PacketHeader, PacketType, TunnelHeader};
use hopnet_routing::{FloodOutcome, LinkStateDb, PingTracker, Topology};
use rand::Rng;
use rand::rngs::StdRng;
use smallvec::SmallVec;
use tracing::{debug, info, warn};

/// The emulator's packet-processing pipeline, free of any socket.
///
/// Feed it datagrams and clock readings; it pushes `(destination, bytes)`
/// emissions onto an outbound queue drained with [`poll_outbound`], except
/// for link-state pings which [`ping_sweep`] hands back directly so the
/// caller can pace them.
///
/// [`poll_outbound`]: EmulatorNode::poll_outbound
/// [`ping_sweep`]: EmulatorNode::ping_sweep
#[derive(Debug)]
pub struct EmulatorNode {
    self_addr: NodeAddr,
    db: LinkStateDb,
    pings: PingTracker,
    registered_clients: BTreeSet<NodeAddr>,
    bank: crate::queue::PriorityQueueBank,
    outbound: VecDeque<(NodeAddr, Vec<u8>)>,
    rng: StdRng,
}

impl EmulatorNode {
    pub fn new(
        self_addr: NodeAddr,
        topology: &Topology,
        queue_size: usize,
        rng: StdRng,
        now: Instant,
    ) -> Self {
        let db = LinkStateDb::new(self_addr, topology);
        // Only fellow emulators (nodes with their own topology line) are
        // pinged; leaf links to client hosts never answer and must not be
        // aged out.
        let peers: Vec<NodeAddr> = db
            .local_neighbours()
            .iter()
            .copied()
            .filter(|&neighbour| db.record(neighbour).is_some())
            .collect();
        let pings = PingTracker::new(peers, now);
        Self {
            self_addr,
            db,
            pings,
            registered_clients: BTreeSet::new(),
            bank: crate::queue::PriorityQueueBank::new(queue_size),
            outbound: VecDeque::new(),
            rng,
        }
    }

    pub fn link_state(&self) -> &LinkStateDb {
        &self.db
    }

    pub fn is_registered(&self, client: NodeAddr) -> bool {
        self.registered_clients.contains(&client)
    }

    pub fn poll_outbound(&mut self) -> Option<(NodeAddr, Vec<u8>)> {
        self.outbound.pop_front()
    }

    /// Dispatches one received datagram. Malformed input is dropped here;
    /// no error ever leaves the pipeline.
    pub fn handle_datagram(&mut self, bytes: &[u8], now: Instant) {
        let header = match PacketHeader::decode(bytes) {
            Ok(header) => header,
            Err(err) => {
                info!(%err, "dropping malformed datagram");
                return;
            }
        };

        if header.ttl == 0 {
            self.handle_expired(&header, bytes);
            return;
        }

        match header.packet_type {
            PacketType::LinkState => self.handle_link_state(&header, bytes, now),
            PacketType::Ack if header.dst == self.self_addr && !header.wrapped => {
                info!(client = %header.src, "registered client");
                self.registered_clients.insert(header.src);
            }
            _ => self.handle_data_plane(&header, bytes),
        }
    }

    /// TTL reached zero: only trace probes get an answer, everything else
    /// dies quietly. This is the mechanism behind route traces: the reply
    /// names this emulator as the hop where the probe expired.
    fn handle_expired(&mut self, header: &PacketHeader, bytes: &[u8]) {
        if header.packet_type != PacketType::Trace {
            debug!(%header, "dropping expired packet");
            return;
        }

        if self.registered_clients.contains(&header.src) && !header.wrapped {
            // The probe came straight from a local client and still carries
            // its tunnel header; answer on the client side.
            let offset = PacketHeader::SIZE + TunnelHeader::SIZE;
            if bytes.len() < offset {
                info!(%header, "dropping truncated client trace probe");
                return;
            }
            let mut reply = header.reversed();
            reply.src = self.self_addr;
            info!(%reply, "answering local trace probe");
            let mut packet = reply.encode().to_vec();
            packet.extend_from_slice(&bytes[offset..]);
            self.outbound.push_back((reply.dst, packet));
            return;
        }

        // The probe expired mid-path: answer toward the originator's
        // ingress emulator, wrapped at both layers like any tunnelled
        // packet.
        let inner = match PacketHeader::decode(&bytes[PacketHeader::SIZE..]) {
            Ok(inner) => inner,
            Err(err) => {
                info!(%err, "dropping expired trace with bad inner header");
                return;
            }
        };
        let mut outer_reply = header.reversed();
        outer_reply.src = self.self_addr;
        outer_reply.ttl = TTL_MAX;
        let mut inner_reply = inner.reversed();
        inner_reply.src = self.self_addr;
        inner_reply.ttl = TTL_MAX;

        let mut packet = outer_reply.encode().to_vec();
        packet.extend_from_slice(&inner_reply.encode());
        packet.extend_from_slice(&bytes[2 * PacketHeader::SIZE..]);
        info!(%outer_reply, "answering transit trace probe");
        self.forward_via_route(outer_reply, packet);
    }

    /// An `L` datagram is both a liveness ping from a direct neighbour and
    /// a flooded advertisement that may or may not be news.
    fn handle_link_state(&mut self, header: &PacketHeader, bytes: &[u8], now: Instant) {
        self.db.add_local_neighbour(header.src);
        self.pings.record_received(header.src, now);

        let Ok(payload) = std::str::from_utf8(&bytes[PacketHeader::SIZE..]) else {
            info!(%header, "dropping link-state packet with non-text payload");
            return;
        };
        let (origin, neighbours) = match LinkStateDb::parse_advertisement(payload) {
            Ok(parsed) => parsed,
            Err(err) => {
                info!(%err, "dropping unparseable advertisement");
                return;
            }
        };

        match self.db.update_from_flood(origin, header.seq_no, &neighbours) {
            FloodOutcome::Forward => {
                // Flood onward to every neighbour except the one that told us.
                for peer in self.pings.tracked().collect::<SmallVec<[NodeAddr; 8]>>() {
                    if peer == header.src {
                        continue;
                    }
                    let mut forwarded = header.reversed();
                    forwarded.dst = peer;
                    let mut packet = forwarded.encode().to_vec();
                    packet.extend_from_slice(payload.as_bytes());
                    debug!(%peer, %origin, "flooding advertisement");
                    self.outbound.push_back((peer, packet));
                }
            }
            FloodOutcome::ReplyWithOwn => {
                // The sender is behind: push our newer copy of the
                // originator's record straight back.
                let Some(record) = self.db.record(origin) else {
                    return;
                };
                let seq_no = record.seq_no;
                let Some(payload) = self.db.advertisement_payload(origin) else {
                    return;
                };
                let mut reply = header.reversed();
                reply.src = self.self_addr;
                reply.seq_no = seq_no;
                reply.payload_length = payload.len() as u32;
                debug!(dst = %reply.dst, %origin, seq_no, "correcting stale advertisement");
                let mut packet = reply.encode().to_vec();
                packet.extend_from_slice(payload.as_bytes());
                self.outbound.push_back((reply.dst, packet));
            }
            FloodOutcome::Ignore => {}
        }
    }

    /// `R`/`D`/`E`/`T` traffic, plus in-transit acknowledgements.
    fn handle_data_plane(&mut self, header: &PacketHeader, bytes: &[u8]) {
        if header.dst == self.self_addr && header.wrapped {
            self.unwrap_to_client(header, bytes);
            return;
        }
        if self.registered_clients.contains(&header.src) && !header.wrapped {
            self.wrap_client_packet(header, bytes);
            return;
        }
        self.forward_via_route(*header, bytes.to_vec());
    }

    /// We are the egress emulator: strip the outer header and hand the
    /// inner packet to the destination client, if it lives here.
    fn unwrap_to_client(&mut self, header: &PacketHeader, bytes: &[u8]) {
        let inner_bytes = &bytes[PacketHeader::SIZE..];
        let inner = match PacketHeader::decode(inner_bytes) {
            Ok(inner) => inner,
            Err(err) => {
                info!(%err, "dropping tunnelled packet with bad inner header");
                return;
            }
        };
        if !self.registered_clients.contains(&inner.dst) {
            info!(%header, inner_dst = %inner.dst, "tunnel endpoint is not a registered client");
            return;
        }
        debug!(%inner, "delivering tunnelled packet to client");
        self.outbound.push_back((inner.dst, inner_bytes.to_vec()));
    }

    /// We are the ingress emulator for this registered client: consume its
    /// tunnel header and wrap the packet for the far-end emulator.
    fn wrap_client_packet(&mut self, header: &PacketHeader, bytes: &[u8]) {
        let tunnel = match TunnelHeader::decode(&bytes[PacketHeader::SIZE..]) {
            Ok(tunnel) => tunnel,
            Err(err) => {
                info!(%err, client = %header.src, "dropping client packet with bad tunnel header");
                return;
            }
        };
        let rest = &bytes[PacketHeader::SIZE + TunnelHeader::SIZE..];
        if tunnel.dst_emulator == self.self_addr {
            // Both tunnel ends live on this emulator: nothing to wrap,
            // route the bare packet toward its destination so it still
            // passes through the queue and the link emulation.
            let mut packet = header.encode().to_vec();
            packet.extend_from_slice(rest);
            self.forward_via_route(*header, packet);
            return;
        }
        let outer = PacketHeader {
            priority: header.priority,
            src: self.self_addr,
            dst: tunnel.dst_emulator,
            packet_type: header.packet_type,
            seq_no: 0,
            ttl: header.ttl,
            payload_length: (PacketHeader::SIZE + rest.len()) as u32,
            wrapped: true,
        };
        let mut packet = outer.encode().to_vec();
        packet.extend_from_slice(&header.encode());
        packet.extend_from_slice(rest);
        debug!(%outer, "wrapped client packet");
        self.forward_via_route(outer, packet);
    }

    /// Plain store-and-forward: resolve the first hop, burn one TTL, then
    /// queue. `E` is the exception and skips the bank so end-of-stream
    /// survives congestion.
    fn forward_via_route(&mut self, mut header: PacketHeader, mut packet: Vec<u8>) {
        let Some(next_hop) = self.db.find_next_hop(header.dst) else {
            info!(%header, "no forwarding entry found, dropping packet");
            return;
        };
        header.ttl -= 1;
        packet[..PacketHeader::SIZE].copy_from_slice(&header.encode());

        if header.packet_type == PacketType::End {
            debug!(%header, %next_hop, "forwarding end-of-stream immediately");
            self.outbound.push_back((next_hop, packet));
            return;
        }
        if self.bank.admit(header.priority, packet) {
            debug!(%header, "queued packet");
        } else {
            info!(
                %header,
                "packet loss: priority queue {} was full",
                header.priority
            );
        }
    }

    /// One scheduling step for the delay slot: load it if empty, otherwise
    /// check whether the occupant has served its delay and either emit it
    /// to its next hop or lose it to the dice.
    pub fn tick_queue(&mut self, now: Instant) {
        let Some((admitted, packet)) = self.bank.slot() else {
            if self.bank.fill_slot(now) {
                debug!("packet entered delay slot");
            }
            return;
        };

        let header = match PacketHeader::decode(packet) {
            Ok(header) => header,
            Err(_) => {
                // Cannot happen for packets we queued ourselves, but never
                // let a bad slot wedge the emulator.
                self.bank.take_slot();
                return;
            }
        };
        let Some(next_hop) = self.db.find_next_hop(header.dst) else {
            info!(%header, "route vanished while delayed, dropping packet");
            self.bank.take_slot();
            return;
        };
        let props = self.db.link_props(next_hop);
        if now.duration_since(admitted) < Duration::from_millis(props.delay_ms) {
            return;
        }

        let (_, packet) = self
            .bank
            .take_slot()
            .expect("slot occupied, checked above");
        if header.packet_type != PacketType::End
            && props.loss_pct > 0
            && self.rng.gen_range(1..=100u32) <= u32::from(props.loss_pct)
        {
            info!(%header, "packet loss: loss event occurred");
            return;
        }
        debug!(%header, %next_hop, "emitting packet");
        self.outbound.push_back((next_hop, packet));
    }

    /// Ping maintenance between datagrams: returns the due pings for the
    /// caller to send (paced), and retires neighbours that have gone
    /// silent, re-advertising the shrunken neighbour set.
    pub fn ping_sweep(&mut self, now: Instant) -> SmallVec<[(NodeAddr, Vec<u8>); 8]> {
        let mut pings = SmallVec::new();
        if let Some(payload) = self.db.advertisement_payload(self.self_addr) {
            let seq_no = self.db.local_seq_no();
            for peer in self.pings.pings_due(now) {
                let header = PacketHeader {
                    priority: 0,
                    src: self.self_addr,
                    dst: peer,
                    packet_type: PacketType::LinkState,
                    seq_no,
                    ttl: 1,
                    payload_length: payload.len() as u32,
                    wrapped: false,
                };
                let mut packet = header.encode().to_vec();
                packet.extend_from_slice(payload.as_bytes());
                debug!(%peer, seq_no, "pinging neighbour");
                pings.push((peer, packet));
                self.pings.mark_sent(peer, now);
            }
        }

        let dead = self.pings.dead_peers(now);
        if !dead.is_empty() {
            for &peer in &dead {
                warn!(%peer, "neighbour missed six ping intervals, declaring dead");
                self.pings.forget(peer);
            }
            self.db.remove_local_neighbours(&dead);
        }
        pings
    }
}
