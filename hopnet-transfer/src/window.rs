use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use hopnet_proto::constants::TTL_MAX;
use hopnet_proto::{NodeAddr, PacketHeader, PacketType, TunnelHeader};
use tracing::{debug, info, warn};

/// A segment is abandoned after this many retransmissions.
pub const MAX_RETRIES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    /// Waiting for an ack; counts retransmissions so far.
    Live { retransmit_count: u32 },
    /// Acked, or abandoned after [`MAX_RETRIES`].
    Retired { failed: bool },
}

#[derive(Debug)]
struct Slot {
    state: SlotState,
    last_transmit: Instant,
    packet: Vec<u8>,
}

/// Static parameters of one file-serving session.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    /// Window size granted by the requester.
    pub capacity: usize,
    /// Packets per second; consecutive transmissions are spaced `1/rate`.
    pub rate: f64,
    /// Retransmission timeout per in-flight segment.
    pub timeout: Duration,
    pub priority: u8,
    /// This sender.
    pub src: NodeAddr,
    /// The requester the file goes to.
    pub dst: NodeAddr,
    /// The requester's ingress emulator, named in every tunnel header.
    pub requester_emulator: NodeAddr,
    pub initial_seq: u32,
}

/// The sender's fixed-size window of in-flight segments.
///
/// Segments are installed with [`admit`], retired by acks or by exhausting
/// their retries in [`tick`], and the whole window is cleared wholesale
/// once every slot is retired. All transmissions, first and repeat alike,
/// are paced at least `1/rate` apart; outgoing packets pile up in an
/// emission queue the caller drains onto its socket.
///
/// [`admit`]: SenderWindow::admit
/// [`tick`]: SenderWindow::tick
#[derive(Debug)]
pub struct SenderWindow {
    config: WindowConfig,
    slots: BTreeMap<u32, Slot>,
    next_seq: u32,
    next_send_at: Instant,
    first_transmissions: u64,
    retransmissions: u64,
    emissions: VecDeque<Vec<u8>>,
}

impl SenderWindow {
    pub fn new(config: WindowConfig, now: Instant) -> Self {
        let next_seq = config.initial_seq;
        Self {
            config,
            slots: BTreeMap::new(),
            next_seq,
            next_send_at: now,
            first_transmissions: 0,
            retransmissions: 0,
            emissions: VecDeque::new(),
        }
    }

    fn pacing_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.config.rate)
    }

    pub fn has_room(&self) -> bool {
        self.slots.len() < self.config.capacity
    }

    /// Whether the pacing gate allows another transmission at `now`.
    pub fn ready_to_send(&self, now: Instant) -> bool {
        now >= self.next_send_at
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    /// Installs `payload` as the next segment and transmits it once.
    /// Callers check [`has_room`] and [`ready_to_send`] first. Returns
    /// whether the window still has a free slot afterwards.
    ///
    /// [`has_room`]: SenderWindow::has_room
    /// [`ready_to_send`]: SenderWindow::ready_to_send
    pub fn admit(&mut self, payload: &[u8], now: Instant) -> bool {
        debug_assert!(self.has_room() && self.ready_to_send(now));
        let seq_no = self.next_seq;
        let packet = self.data_packet(PacketType::Data, seq_no, payload);
        debug!(seq_no, len = payload.len(), "first transmission");
        self.emissions.push_back(packet.clone());
        self.slots.insert(
            seq_no,
            Slot {
                state: SlotState::Live {
                    retransmit_count: 0,
                },
                last_transmit: now,
                packet,
            },
        );
        self.next_seq += 1;
        self.first_transmissions += 1;
        self.next_send_at = now + self.pacing_interval();
        self.has_room()
    }

    /// Retires the acked slot. Duplicate and unknown acks are ignored.
    pub fn on_ack(&mut self, seq_no: u32) {
        if let Some(slot) = self.slots.get_mut(&seq_no)
            && matches!(slot.state, SlotState::Live { .. })
        {
            debug!(seq_no, "acked");
            slot.state = SlotState::Retired { failed: false };
            slot.packet.clear();
        }
    }

    /// Drives retransmissions: every live slot past its timeout is resent
    /// (paced), and a slot that has burned all its retries is retired as
    /// failed. Returns true once every slot is retired.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut all_retired = true;
        let timeout = self.config.timeout;
        let interval = self.pacing_interval();
        for (&seq_no, slot) in &mut self.slots {
            let SlotState::Live { retransmit_count } = slot.state else {
                continue;
            };
            if retransmit_count == MAX_RETRIES {
                warn!(seq_no, "failed to transmit segment, giving up");
                slot.state = SlotState::Retired { failed: true };
                slot.packet.clear();
                continue;
            }
            all_retired = false;
            if now > slot.last_transmit + timeout && now >= self.next_send_at {
                slot.state = SlotState::Live {
                    retransmit_count: retransmit_count + 1,
                };
                slot.last_transmit = now;
                self.retransmissions += 1;
                self.next_send_at = now + interval;
                info!(seq_no, attempt = retransmit_count + 1, "retransmitting segment");
                self.emissions.push_back(slot.packet.clone());
            }
        }
        all_retired
    }

    /// Empties the window once [`tick`] reports everything retired.
    ///
    /// [`tick`]: SenderWindow::tick
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// The end-of-stream packet, stamped with the first unused sequence
    /// number.
    pub fn end_packet(&self) -> Vec<u8> {
        self.data_packet(PacketType::End, self.next_seq, &[])
    }

    pub fn poll_emission(&mut self) -> Option<Vec<u8>> {
        self.emissions.pop_front()
    }

    /// `(retransmissions, first transmissions, loss rate percent)`.
    pub fn loss_summary(&self) -> (u64, u64, f64) {
        let total = self.retransmissions + self.first_transmissions;
        let rate = if total == 0 {
            0.0
        } else {
            self.retransmissions as f64 * 100.0 / total as f64
        };
        (self.retransmissions, self.first_transmissions, rate)
    }

    fn data_packet(&self, packet_type: PacketType, seq_no: u32, payload: &[u8]) -> Vec<u8> {
        let header = PacketHeader {
            priority: self.config.priority,
            src: self.config.src,
            dst: self.config.dst,
            packet_type,
            seq_no,
            ttl: TTL_MAX,
            payload_length: payload.len() as u32,
            wrapped: false,
        };
        let tunnel = TunnelHeader {
            dst_emulator: self.config.requester_emulator,
        };
        let mut packet = header.encode().to_vec();
        packet.extend_from_slice(&tunnel.encode());
        packet.extend_from_slice(payload);
        packet
    }
}
