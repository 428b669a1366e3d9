//! Send-side window state machine for both ARQ variants.
//!
//! [`SendWindow`] decides *which* sequence numbers go on the wire and when;
//! it never touches a socket.  [`crate::sender_engine::SenderEngine`] calls
//! these methods once per loop iteration and performs the actual I/O.
//!
//! # Window layout
//!
//! ```text
//!   base              next_seq          base + W
//!     │                   │                 │
//!  ───┼───────────────────┼─────────────────┼──────▶ seq space
//!     │ <── in flight ──▶ │ <── sendable ─▶ │
//! ```
//!
//! Invariant: `base ≤ next_seq ≤ base + W` and `next_seq ≤ max_seq + 1`.
//! Positions are kept as `u32` so `max_seq + 1` stays representable when the
//! final sequence number is `u16::MAX`.
//!
//! # Variant policies
//!
//! | | Go-Back-N | Selective-Repeat |
//! |---|---|---|
//! | ack meaning | cumulative: everything ≤ `a` | exactly `a` |
//! | timers | one, for the oldest unacked packet | one per unacked packet |
//! | on timeout | resend `[base, next_seq)` | resend the expired packets only |
//!
//! # Final-packet retry budget
//!
//! Only retransmission rounds that re-send the still-unacknowledged final
//! packet are charged against `final_retry_budget`.  Under Go-Back-N every
//! round after the final packet went out contains it; under Selective-Repeat
//! the per-packet timers drift apart, so rounds re-sending earlier packets
//! alone are free.  When the final packet comes due with the budget already
//! spent, [`SendWindow::poll_timeouts`] fails with
//! [`TransferError::TransferIncomplete`].  Once the final acknowledgment has
//! been seen the budget no longer applies.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::chunk::{ChunkMap, MAX_CHUNKS};
use crate::config::{ArqVariant, SenderConfig};
use crate::error::TransferError;
use crate::timer::RetransmitTimer;

// ---------------------------------------------------------------------------
// AckSet
// ---------------------------------------------------------------------------

/// Bitset of acknowledged sequence numbers.  Bits are only ever set.
#[derive(Debug, Clone, Default)]
pub struct AckSet {
    words: Vec<u64>,
    count: usize,
}

impl AckSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `seq`.  Returns `true` if it was not already marked.
    pub fn insert(&mut self, seq: u32) -> bool {
        let (word, bit) = (seq as usize / 64, seq % 64);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let mask = 1u64 << bit;
        if self.words[word] & mask != 0 {
            return false;
        }
        self.words[word] |= mask;
        self.count += 1;
        true
    }

    pub fn contains(&self, seq: u32) -> bool {
        self.words
            .get(seq as usize / 64)
            .is_some_and(|w| w & (1u64 << (seq % 64)) != 0)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

// ---------------------------------------------------------------------------
// SendWindow
// ---------------------------------------------------------------------------

/// Sliding-window send state for one transfer.
#[derive(Debug)]
pub struct SendWindow {
    variant: ArqVariant,
    window_size: u32,

    /// Oldest unacknowledged sequence number.
    base: u32,
    /// Next sequence number never sent before.
    next_seq: u32,
    max_seq: u32,
    origin: u32,

    /// Go-Back-N: single timer covering the oldest in-flight packet.
    timer: RetransmitTimer,
    /// Selective-Repeat: one timer per sent, unacknowledged packet.
    timers: BTreeMap<u32, RetransmitTimer>,
    /// Selective-Repeat: individually acknowledged sequence numbers.
    acked: AckSet,

    final_retry_budget: u32,
    final_retransmissions: u32,

    transmissions: u64,
    retransmissions: u64,
}

impl SendWindow {
    /// Create a window covering sequence numbers `origin..=max_seq`.
    ///
    /// `window_size` is capped at [`MAX_CHUNKS`]; no transfer has more
    /// packets than that to put in flight.
    ///
    /// # Panics
    ///
    /// Panics if `window_size` is zero or `max_seq < origin`.
    pub fn new(
        variant: ArqVariant,
        window_size: u32,
        retry_timeout: Duration,
        final_retry_budget: u32,
        origin: u16,
        max_seq: u16,
    ) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        assert!(max_seq >= origin, "max_seq must not precede origin");
        Self {
            variant,
            window_size: window_size.min(MAX_CHUNKS as u32),
            base: origin.into(),
            next_seq: origin.into(),
            max_seq: max_seq.into(),
            origin: origin.into(),
            timer: RetransmitTimer::new(retry_timeout),
            timers: BTreeMap::new(),
            acked: AckSet::new(),
            final_retry_budget,
            final_retransmissions: 0,
            transmissions: 0,
            retransmissions: 0,
        }
    }

    /// Window over every chunk of `chunks`, configured from `config`.  A
    /// zero window size is treated as 1.
    pub fn for_chunks(config: &SenderConfig, chunks: &ChunkMap) -> Self {
        Self::new(
            config.variant,
            config.window_size.max(1),
            config.retry_timeout,
            config.final_retry_budget,
            chunks.origin(),
            chunks.max_seq(),
        )
    }

    pub fn variant(&self) -> ArqVariant {
        self.variant
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    pub fn max_seq(&self) -> u32 {
        self.max_seq
    }

    /// Packets sent at least once but not yet covered by `base`.
    pub fn in_flight(&self) -> u32 {
        self.next_seq - self.base
    }

    /// `true` once every packet through `max_seq` is acknowledged.
    pub fn is_complete(&self) -> bool {
        self.base > self.max_seq
    }

    /// `true` once the final packet has been put on the wire at least once.
    pub fn final_sent(&self) -> bool {
        self.next_seq > self.max_seq
    }

    /// Whether `seq` has been acknowledged, under either variant.
    pub fn is_acked(&self, seq: u16) -> bool {
        let seq = u32::from(seq);
        seq < self.base || self.acked.contains(seq)
    }

    pub fn final_retransmissions(&self) -> u32 {
        self.final_retransmissions
    }

    /// Datagrams handed to the transport, first sends and resends alike.
    pub fn transmissions(&self) -> u64 {
        self.transmissions
    }

    pub fn retransmissions(&self) -> u64 {
        self.retransmissions
    }

    /// Earliest armed retransmission deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.variant {
            ArqVariant::GoBackN => self.timer.deadline(),
            ArqVariant::SelectiveRepeat => {
                self.timers.values().filter_map(RetransmitTimer::deadline).min()
            }
        }
    }

    /// Claim every never-sent sequence number that now fits in the window.
    ///
    /// The caller must transmit each returned sequence number.  Covers
    /// `[next_seq, min(max_seq, base + W − 1)]`.
    pub fn take_sendable(&mut self, now: Instant) -> Vec<u16> {
        let limit = self.max_seq.min(self.base + self.window_size - 1);
        let mut out = Vec::new();

        while self.next_seq <= limit {
            let seq = self.next_seq;
            match self.variant {
                ArqVariant::GoBackN => {
                    if self.base == self.next_seq {
                        self.timer.start(now);
                    }
                }
                ArqVariant::SelectiveRepeat => {
                    let mut t = RetransmitTimer::new(self.timer.timeout());
                    t.start(now);
                    self.timers.insert(seq, t);
                }
            }
            self.next_seq += 1;
            self.transmissions += 1;
            out.push(seq as u16);
        }

        self.check_invariant();
        out
    }

    /// Collect the sequence numbers whose retransmission timer has fired and
    /// restart those timers.
    ///
    /// Returns an empty list when nothing is due.  Fails with
    /// [`TransferError::TransferIncomplete`] when the final packet is due
    /// again after the final-packet retry budget has been spent.
    pub fn poll_timeouts(&mut self, now: Instant) -> Result<Vec<u16>, TransferError> {
        let due: Vec<u32> = match self.variant {
            ArqVariant::GoBackN => {
                if self.timer.expired(now) {
                    (self.base..self.next_seq).collect()
                } else {
                    Vec::new()
                }
            }
            ArqVariant::SelectiveRepeat => self
                .timers
                .iter()
                .filter(|(_, t)| t.expired(now))
                .map(|(&seq, _)| seq)
                .collect(),
        };

        if due.is_empty() {
            return Ok(Vec::new());
        }

        // Timers of acknowledged packets are gone, so a due final packet is
        // an unacknowledged one.
        if due.contains(&self.max_seq) {
            if self.final_retransmissions >= self.final_retry_budget {
                return Err(TransferError::TransferIncomplete {
                    retransmissions: self.final_retransmissions,
                });
            }
            self.final_retransmissions += 1;
        }

        match self.variant {
            ArqVariant::GoBackN => self.timer.start(now),
            ArqVariant::SelectiveRepeat => {
                for seq in &due {
                    if let Some(t) = self.timers.get_mut(seq) {
                        t.start(now);
                    }
                }
            }
        }

        self.transmissions += due.len() as u64;
        self.retransmissions += due.len() as u64;
        Ok(due.into_iter().map(|s| s as u16).collect())
    }

    /// Apply one acknowledgment.  Returns how many packets it newly
    /// acknowledged (0 for stale, duplicate or bogus acks).
    pub fn on_ack(&mut self, ack: u16, now: Instant) -> u32 {
        let a = u32::from(ack);
        // Below the origin nothing was ever acknowledged; at or past
        // `next_seq` the packet was never sent.
        if a < self.origin || a >= self.next_seq {
            return 0;
        }

        let newly = match self.variant {
            ArqVariant::GoBackN => {
                // Covers both stale acks (< base − 1) and duplicates (== base − 1).
                if a < self.base {
                    return 0;
                }
                let n = a + 1 - self.base;
                self.base = a + 1;
                if self.base == self.next_seq {
                    self.timer.stop();
                } else {
                    self.timer.start(now);
                }
                n
            }
            ArqVariant::SelectiveRepeat => {
                if a < self.base || !self.acked.insert(a) {
                    return 0;
                }
                self.timers.remove(&a);
                while self.base < self.next_seq && self.acked.contains(self.base) {
                    self.base += 1;
                }
                1
            }
        };

        self.check_invariant();
        newly
    }

    fn check_invariant(&self) {
        debug_assert!(
            self.base <= self.next_seq
                && self.next_seq <= self.base + self.window_size
                && self.next_seq <= self.max_seq + 1,
            "window invariant violated: base={} next_seq={} W={} max_seq={}",
            self.base,
            self.next_seq,
            self.window_size,
            self.max_seq
        );
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
