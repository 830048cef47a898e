use hopnet_proto::{NodeAddr, PacketHeader, PacketType, TunnelHeader};

/// The route-trace probe loop as a state machine.
///
/// Probes go out with TTL 0, 1, 2, …; each expires one hop further along
/// the path and the emulator it dies at answers with a `T` naming itself.
/// The trace is complete when the destination emulator answers.
#[derive(Debug)]
pub struct TraceProbe {
    self_addr: NodeAddr,
    dst_emulator: NodeAddr,
    next_ttl: u16,
    responders: Vec<NodeAddr>,
    done: bool,
}

impl TraceProbe {
    pub fn new(self_addr: NodeAddr, dst_emulator: NodeAddr) -> Self {
        Self {
            self_addr,
            dst_emulator,
            next_ttl: 0,
            responders: Vec::new(),
            done: false,
        }
    }

    /// The probe packet for the current TTL, tunnel header included.
    pub fn probe_packet(&self) -> Vec<u8> {
        let header = PacketHeader {
            priority: 0,
            src: self.self_addr,
            dst: self.dst_emulator,
            packet_type: PacketType::Trace,
            seq_no: 0,
            ttl: self.next_ttl,
            payload_length: TunnelHeader::SIZE as u32,
            wrapped: false,
        };
        let tunnel = TunnelHeader {
            dst_emulator: self.dst_emulator,
        };
        let mut packet = header.encode().to_vec();
        packet.extend_from_slice(&tunnel.encode());
        packet
    }

    /// Consumes a `T` reply: records the responder, advances the TTL, and
    /// reports who answered. Non-trace packets are ignored.
    pub fn on_reply(&mut self, header: &PacketHeader) -> Option<NodeAddr> {
        if header.packet_type != PacketType::Trace {
            return None;
        }
        let responder = header.src;
        self.responders.push(responder);
        self.next_ttl += 1;
        if responder == self.dst_emulator {
            self.done = true;
        }
        Some(responder)
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn next_ttl(&self) -> u16 {
        self.next_ttl
    }

    /// The emulators that have answered, in hop order.
    pub fn responders(&self) -> &[NodeAddr] {
        &self.responders
    }
}
