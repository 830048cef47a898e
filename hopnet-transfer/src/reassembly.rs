use std::collections::BTreeMap;
use std::io::{self, Write};
use std::time::Instant;

use hopnet_proto::NodeAddr;
use tracing::debug;

/// Gap-free accumulator for the segments one sender contributes.
///
/// Segments are stored by sequence number, duplicates ignored, and the
/// buffer is complete once the sender's `E` has been seen. Assembly walks
/// the map in ascending sequence order, so arrival order never matters.
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    chunks: BTreeMap<u32, Vec<u8>>,
    end_seq: Option<u32>,
    data_packets: u64,
    data_bytes: u64,
    first_packet_at: Option<Instant>,
    last_packet_at: Option<Instant>,
}

impl ReassemblyBuffer {
    /// Stores one `D` segment; returns false for duplicates (which are
    /// still acknowledged by the caller, just not stored).
    pub fn store(&mut self, seq_no: u32, data: &[u8], now: Instant) -> bool {
        self.first_packet_at.get_or_insert(now);
        self.last_packet_at = Some(now);
        self.data_packets += 1;
        self.data_bytes += data.len() as u64;
        if self.chunks.contains_key(&seq_no) {
            debug!(seq_no, "duplicate segment");
            return false;
        }
        self.chunks.insert(seq_no, data.to_vec());
        true
    }

    /// Records the sender's end-of-stream marker.
    pub fn finish(&mut self, end_seq: u32, now: Instant) {
        self.last_packet_at = Some(now);
        self.end_seq = Some(end_seq);
    }

    pub fn is_finished(&self) -> bool {
        self.end_seq.is_some()
    }

    /// All stored payloads, ascending by sequence number.
    pub fn assemble(&self) -> Vec<u8> {
        let total: usize = self.chunks.values().map(Vec::len).sum();
        let mut out = Vec::with_capacity(total);
        for chunk in self.chunks.values() {
            out.extend_from_slice(chunk);
        }
        out
    }

    pub fn stored_bytes(&self) -> u64 {
        self.chunks.values().map(|c| c.len() as u64).sum()
    }

    /// `(data packets seen, data bytes seen, test duration)` for the
    /// per-sender terminal summary.
    pub fn summary(&self) -> (u64, u64, std::time::Duration) {
        let duration = match (self.first_packet_at, self.last_packet_at) {
            (Some(first), Some(last)) => last.duration_since(first),
            _ => std::time::Duration::ZERO,
        };
        (self.data_packets, self.data_bytes, duration)
    }
}

/// The requester's per-sender buffers, flushed to disk in tracker
/// (`file_id`) order once every sender has signalled `E`.
#[derive(Debug, Default)]
pub struct Reassembly {
    /// Keyed by `file_id`; ordering of the output file follows the keys.
    buffers: BTreeMap<u32, (NodeAddr, ReassemblyBuffer)>,
}

impl Reassembly {
    /// Announces one tracker entry before any packets arrive.
    pub fn add_sender(&mut self, file_id: u32, sender: NodeAddr) {
        self.buffers
            .insert(file_id, (sender, ReassemblyBuffer::default()));
    }

    fn buffer_for(&mut self, sender: NodeAddr) -> Option<&mut ReassemblyBuffer> {
        self.buffers
            .values_mut()
            .find(|(addr, _)| *addr == sender)
            .map(|(_, buffer)| buffer)
    }

    /// Stores a `D` segment from `sender`; returns false when the sender
    /// is unknown or the segment is a duplicate.
    pub fn handle_data(&mut self, sender: NodeAddr, seq_no: u32, data: &[u8], now: Instant) -> bool {
        match self.buffer_for(sender) {
            Some(buffer) => buffer.store(seq_no, data, now),
            None => false,
        }
    }

    /// Handles a sender's `E`; returns its summary when the sender is known.
    pub fn handle_end(
        &mut self,
        sender: NodeAddr,
        end_seq: u32,
        now: Instant,
    ) -> Option<(u64, u64, std::time::Duration)> {
        let buffer = self.buffer_for(sender)?;
        buffer.finish(end_seq, now);
        Some(buffer.summary())
    }

    pub fn is_known_sender(&self, sender: NodeAddr) -> bool {
        self.buffers.values().any(|(addr, _)| *addr == sender)
    }

    /// True once every announced sender has reported `E`.
    pub fn all_finished(&self) -> bool {
        !self.buffers.is_empty()
            && self.buffers.values().all(|(_, buffer)| buffer.is_finished())
    }

    /// Writes every buffer in ascending `file_id` order, each in ascending
    /// sequence order.
    pub fn write_out<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for (_, buffer) in self.buffers.values() {
            writer.write_all(&buffer.assemble())?;
        }
        Ok(())
    }

    pub fn total_stored_bytes(&self) -> u64 {
        self.buffers
            .values()
            .map(|(_, buffer)| buffer.stored_bytes())
            .sum()
    }
}
