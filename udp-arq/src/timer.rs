//! Retransmission timers.
//!
//! A [`RetransmitTimer`] is a deadline that is either armed or stopped.  It
//! does not sleep on its own; the engine loops ask it whether it has expired
//! and use [`RetransmitTimer::deadline`] to bound how long they wait on the
//! socket.
//!
//! The timeout is fixed for the whole transfer (there is no RTT estimation
//! and no back-off): the window size is the only rate control.

use std::time::{Duration, Instant};

/// A single retransmission deadline.
#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl RetransmitTimer {
    /// Create a stopped timer that fires `timeout` after each start.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Arm (or re-arm) the timer relative to `now`.
    pub fn start(&mut self, now: Instant) {
        self.deadline = Some(now + self.timeout);
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// `true` when armed and `now` is at or past the deadline.
    pub fn expired(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(d) if now >= d)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
