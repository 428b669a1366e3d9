//! Engine configuration.
//!
//! Both engines take an explicit configuration value by ownership; there is
//! no process-wide state.  The binary builds these from command-line
//! arguments, tests build them directly.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::chunk::MAX_FILE_SIZE;

/// Retransmissions of the final packet allowed before giving up.
pub const DEFAULT_FINAL_RETRY_BUDGET: u32 = 15;

/// Times the receiver repeats its closing acknowledgments.
pub const DRAIN_BURST: usize = 15;

/// Receiver window used to size the Selective-Repeat drain burst when none is
/// given.
pub const DEFAULT_RECEIVER_WINDOW: u32 = 64;

/// Upper bound on a single receiver wait when no idle timeout is configured.
pub const RECEIVER_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Which ARQ discipline both ends run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArqVariant {
    /// Cumulative acks, one timer, whole-window retransmission.
    GoBackN,
    /// Per-packet acks, per-packet timers, selective retransmission.
    SelectiveRepeat,
}

impl FromStr for ArqVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gbn" | "go-back-n" => Ok(ArqVariant::GoBackN),
            "sr" | "selective-repeat" => Ok(ArqVariant::SelectiveRepeat),
            other => Err(format!("unknown ARQ variant `{other}` (expected gbn or sr)")),
        }
    }
}

impl fmt::Display for ArqVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArqVariant::GoBackN => f.write_str("gbn"),
            ArqVariant::SelectiveRepeat => f.write_str("sr"),
        }
    }
}

/// Sending side settings.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub remote: SocketAddr,
    /// Fixed retransmission timeout; also bounds every socket wait.
    pub retry_timeout: Duration,
    /// Maximum packets in flight (W ≥ 1).
    pub window_size: u32,
    pub variant: ArqVariant,
    pub final_retry_budget: u32,
}

impl SenderConfig {
    pub fn new(
        remote: SocketAddr,
        retry_timeout: Duration,
        window_size: u32,
        variant: ArqVariant,
    ) -> Self {
        Self {
            remote,
            retry_timeout,
            window_size,
            variant,
            final_retry_budget: DEFAULT_FINAL_RETRY_BUDGET,
        }
    }

    pub fn with_final_retry_budget(mut self, budget: u32) -> Self {
        self.final_retry_budget = budget;
        self
    }
}

/// Receiving side settings.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub bind: SocketAddr,
    pub variant: ArqVariant,
    /// Maximum bytes the reconstruction buffer may hold.
    pub output_capacity: u64,
    /// Sender window the receiver expects; sizes the SR drain burst.
    pub window_size: u32,
    /// Give up with a reassembly gap after this long without traffic, once
    /// the first packet has arrived.  `None` waits indefinitely.
    pub idle_timeout: Option<Duration>,
}

impl ReceiverConfig {
    pub fn new(bind: SocketAddr, variant: ArqVariant) -> Self {
        Self {
            bind,
            variant,
            output_capacity: MAX_FILE_SIZE,
            window_size: DEFAULT_RECEIVER_WINDOW,
            idle_timeout: None,
        }
    }

    pub fn with_window_size(mut self, window_size: u32) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_output_capacity(mut self, capacity: u64) -> Self {
        self.output_capacity = capacity;
        self
    }

    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.idle_timeout = Some(idle);
        self
    }
}
