//! Engine finite-state-machine types.
//!
//! Transitions are driven by [`crate::sender_engine`] and
//! [`crate::receiver_engine`]; the window state machines in
//! [`crate::sender`] and [`crate::receiver`] report the conditions that
//! trigger them.

use std::fmt;

/// Lifecycle of a sending engine.
///
/// ```text
///  Idle ──file loaded──▶ Sending ──base > max_seq──▶ Complete
///                           │
///                           └──budget spent / socket error──▶ Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// No transfer started yet.
    #[default]
    Idle,
    /// Packets in flight; looping over timers, sends and acks.
    Sending,
    /// Every packet acknowledged.
    Complete,
    /// Final-packet retry budget exhausted or fatal transport error.
    Aborted,
}

/// Lifecycle of a receiving engine.
///
/// ```text
///  Receiving ──final packet accepted / range complete──▶ Draining ──▶ Done
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    /// Accepting packets and acknowledging them.
    #[default]
    Receiving,
    /// Everything is in; repeating the closing acks.
    Draining,
    /// Output handed off; no further acks are sent.
    Done,
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
