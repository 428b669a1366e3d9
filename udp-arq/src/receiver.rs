//! Receive-side acceptance state machine for both ARQ variants.
//!
//! [`ReceiveWindow`] decides whether an inbound packet is stored and which
//! acknowledgment goes back; [`crate::receiver_engine::ReceiverEngine`] owns
//! the socket and sends it.
//!
//! - **Go-Back-N**: only the packet numbered `expected_seq` is accepted.
//!   Anything else is discarded and answered with a duplicate cumulative ack
//!   for `expected_seq − 1`.
//! - **Selective-Repeat**: any packet not yet stored is buffered, whatever
//!   its position.  Every packet in range is acked with its own sequence
//!   number, duplicates included, so a lost ack is repaired by the sender's
//!   retransmission.
//!
//! The transfer length is only known once the final-flagged packet has
//! arrived.  When the full range `origin..=final` is present the window moves
//! to [`ReceiverState::Draining`] and the engine sends the closing burst
//! from [`ReceiveWindow::drain_acks`].

use std::collections::BTreeMap;

use log::warn;

use crate::chunk::{reassemble, ChunkError, SEQ_ORIGIN};
use crate::config::ArqVariant;
use crate::packet::{Ack, Packet};
use crate::state::ReceiverState;

/// Receive-side state for one transfer.
#[derive(Debug)]
pub struct ReceiveWindow {
    variant: ArqVariant,
    window_size: u32,

    /// Go-Back-N: next in-order sequence number.
    expected_seq: u32,

    chunks: BTreeMap<u16, Vec<u8>>,
    final_seq: Option<u16>,

    stored_bytes: u64,
    capacity: u64,

    state: ReceiverState,
    packets: u64,
    duplicates: u64,
    discarded: u64,
}

impl ReceiveWindow {
    /// `window_size` sizes the Selective-Repeat drain burst; `capacity` caps
    /// the bytes held for reconstruction.
    pub fn new(variant: ArqVariant, window_size: u32, capacity: u64) -> Self {
        Self {
            variant,
            window_size: window_size.max(1),
            expected_seq: SEQ_ORIGIN.into(),
            chunks: BTreeMap::new(),
            final_seq: None,
            stored_bytes: 0,
            capacity,
            state: ReceiverState::Receiving,
            packets: 0,
            duplicates: 0,
            discarded: 0,
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn expected_seq(&self) -> u32 {
        self.expected_seq
    }

    pub fn final_seq(&self) -> Option<u16> {
        self.final_seq
    }

    pub fn stored_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn stored_bytes(&self) -> u64 {
        self.stored_bytes
    }

    /// Packets seen while receiving, accepted or not.
    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Packets that repeated an already stored (or already passed) chunk.
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Packets dropped without an ack (out of range or over capacity).
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Process one inbound packet and return the ack to send, if any.
    ///
    /// Returns `None` once the window has left [`ReceiverState::Receiving`].
    pub fn on_packet(&mut self, packet: Packet) -> Option<Ack> {
        if self.state != ReceiverState::Receiving {
            return None;
        }
        self.packets += 1;
        match self.variant {
            ArqVariant::GoBackN => self.on_packet_gbn(packet),
            ArqVariant::SelectiveRepeat => self.on_packet_sr(packet),
        }
    }

    fn on_packet_gbn(&mut self, packet: Packet) -> Option<Ack> {
        let seq = u32::from(packet.seq);
        if seq != self.expected_seq {
            if seq < self.expected_seq {
                self.duplicates += 1;
            }
            // SEQ_ORIGIN is 1, so this is at least 0.
            return Some(Ack::new((self.expected_seq - 1) as u16));
        }

        if !self.has_room(packet.payload.len()) {
            return None;
        }
        self.store(packet.seq, packet.payload);
        self.expected_seq += 1;
        if packet.is_final {
            self.final_seq = Some(packet.seq);
            self.state = ReceiverState::Draining;
        }
        Some(Ack::new(packet.seq))
    }

    fn on_packet_sr(&mut self, packet: Packet) -> Option<Ack> {
        let seq = packet.seq;
        if seq < SEQ_ORIGIN || self.final_seq.is_some_and(|f| seq > f) {
            self.discarded += 1;
            return None;
        }
        if packet.is_final && self.final_seq.is_some_and(|f| f != seq) {
            warn!("[recv] second final packet seq={seq} ignored");
            self.discarded += 1;
            return None;
        }

        if self.chunks.contains_key(&seq) {
            self.duplicates += 1;
            return Some(Ack::new(seq));
        }
        if !self.has_room(packet.payload.len()) {
            return None;
        }

        self.store(seq, packet.payload);
        if packet.is_final {
            self.set_final(seq);
        }
        if self.range_complete() {
            self.state = ReceiverState::Draining;
        }
        Some(Ack::new(seq))
    }

    /// Acks the engine repeats [`crate::config::DRAIN_BURST`] times once
    /// draining.
    ///
    /// Go-Back-N needs only the cumulative ack for the final packet.
    /// Selective-Repeat re-acks the last `window_size` sequence numbers: the
    /// sender can have nothing outstanding further back than that.
    pub fn drain_acks(&self) -> Vec<Ack> {
        let Some(f) = self.final_seq else {
            return Vec::new();
        };
        match self.variant {
            ArqVariant::GoBackN => vec![Ack::new(f)],
            ArqVariant::SelectiveRepeat => {
                let first = u32::from(f)
                    .saturating_sub(self.window_size - 1)
                    .max(SEQ_ORIGIN.into()) as u16;
                (first..=f).map(Ack::new).collect()
            }
        }
    }

    /// Reconstruct the file and move to [`ReceiverState::Done`].
    ///
    /// Fails with the first missing sequence number when the final packet
    /// has not arrived or the range has a hole; the buffer is released either
    /// way.
    pub fn finish(&mut self) -> Result<Vec<u8>, ChunkError> {
        let result = match self.final_seq {
            Some(f) => reassemble(&self.chunks, usize::from(f - SEQ_ORIGIN) + 1),
            None => Err(ChunkError::Gap {
                seq: self.first_missing(),
            }),
        };
        self.chunks.clear();
        self.stored_bytes = 0;
        self.state = ReceiverState::Done;
        result
    }

    /// Lowest sequence number not yet stored.
    pub fn first_missing(&self) -> u16 {
        let mut expect = SEQ_ORIGIN;
        for &seq in self.chunks.keys() {
            if seq != expect {
                break;
            }
            expect = expect.wrapping_add(1);
        }
        expect
    }

    fn has_room(&mut self, len: usize) -> bool {
        if self.stored_bytes + len as u64 > self.capacity {
            warn!(
                "[recv] output capacity of {} bytes reached; dropping {len}-byte chunk",
                self.capacity
            );
            self.discarded += 1;
            return false;
        }
        true
    }

    fn store(&mut self, seq: u16, payload: Vec<u8>) {
        self.stored_bytes += payload.len() as u64;
        self.chunks.insert(seq, payload);
    }

    /// Record the final sequence number and drop anything buffered past it.
    fn set_final(&mut self, seq: u16) {
        self.final_seq = Some(seq);
        if let Some(next) = seq.checked_add(1) {
            let beyond = self.chunks.split_off(&next);
            if !beyond.is_empty() {
                warn!("[recv] dropping {} chunk(s) past final seq={seq}", beyond.len());
                self.discarded += beyond.len() as u64;
                self.stored_bytes -= beyond.values().map(|c| c.len() as u64).sum::<u64>();
            }
        }
    }

    fn range_complete(&self) -> bool {
        self.final_seq
            .is_some_and(|f| self.chunks.len() == usize::from(f - SEQ_ORIGIN) + 1)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
