use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

/// The per-priority FIFO bank feeding an emulator's single delay slot.
///
/// Admission is tail-drop: a packet bound for a full class queue is the one
/// discarded, never a packet already queued. Classes are served in strictly
/// ascending priority number (lower number first), FIFO within a class.
/// The delay slot holds at most one packet, the one currently "on the
/// wire", and a packet in the slot is never preempted.
///
/// The bank stores opaque packet bytes; deciding a packet's delay, loss
/// and next hop is the pipeline's job at emission time.
#[derive(Debug)]
pub struct PriorityQueueBank {
    queue_size: usize,
    queues: BTreeMap<u8, VecDeque<Vec<u8>>>,
    delay_slot: Option<(Instant, Vec<u8>)>,
}

impl PriorityQueueBank {
    pub fn new(queue_size: usize) -> Self {
        Self {
            queue_size,
            queues: BTreeMap::new(),
            delay_slot: None,
        }
    }

    /// Appends `packet` to its class queue. Returns false (and drops the
    /// packet) when the class is already at capacity.
    pub fn admit(&mut self, priority: u8, packet: Vec<u8>) -> bool {
        let queue = self.queues.entry(priority).or_default();
        if queue.len() >= self.queue_size {
            return false;
        }
        queue.push_back(packet);
        true
    }

    /// Moves the head of the smallest non-empty class into the delay slot,
    /// stamped `now`. No-op if the slot is occupied or the bank is empty.
    /// Returns whether the slot was filled by this call.
    pub fn fill_slot(&mut self, now: Instant) -> bool {
        if self.delay_slot.is_some() {
            return false;
        }
        for queue in self.queues.values_mut() {
            if let Some(packet) = queue.pop_front() {
                self.delay_slot = Some((now, packet));
                return true;
            }
        }
        false
    }

    /// The packet currently serving its delay, if any.
    pub fn slot(&self) -> Option<(Instant, &[u8])> {
        self.delay_slot
            .as_ref()
            .map(|(admitted, packet)| (*admitted, packet.as_slice()))
    }

    pub fn take_slot(&mut self) -> Option<(Instant, Vec<u8>)> {
        self.delay_slot.take()
    }

    pub fn queued_len(&self, priority: u8) -> usize {
        self.queues.get(&priority).map_or(0, VecDeque::len)
    }

    pub fn is_idle(&self) -> bool {
        self.delay_slot.is_none() && self.queues.values().all(VecDeque::is_empty)
    }
}
