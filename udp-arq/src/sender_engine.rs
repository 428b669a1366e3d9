//! Sending engine: drives a [`SendWindow`] over a [`Transport`].
//!
//! # Control loop
//!
//! ```text
//!        ┌─────────────────────────────────────────────┐
//!        ▼                                             │
//!  poll_timeouts ──▶ resend expired                    │
//!        │                                             │
//!  take_sendable ──▶ send new packets                  │
//!        │                                             │
//!  recv_timeout(min(RTO, next deadline)) ──▶ on_ack ───┘
//!        │
//!   base > max_seq ──▶ Complete
//! ```
//!
//! The receive wait never exceeds the retry timeout, so a single task
//! services both timers and acknowledgments without `select!`.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::chunk::{check_size, ChunkMap};
use crate::config::SenderConfig;
use crate::error::{Result, TransferError};
use crate::packet::{self, Ack};
use crate::sender::SendWindow;
use crate::socket::{Socket, Transport};
use crate::state::SenderState;

/// Outcome of a successful transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferReport {
    /// File bytes delivered (headers excluded).
    pub bytes: u64,
    pub chunks: usize,
    pub transmissions: u64,
    pub retransmissions: u64,
    /// From the first packet sent to the last acknowledgment received.
    pub elapsed: Duration,
}

impl TransferReport {
    /// Payload throughput in bytes per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.bytes as f64 / secs
    }

    /// Payload throughput in KB/s (1 KB = 1024 bytes).
    pub fn throughput_kbps(&self) -> f64 {
        self.throughput() / 1024.0
    }
}

/// Read a file for sending, rejecting it before any socket is opened if it
/// does not fit the sequence space.
pub async fn load_file(path: &Path) -> Result<Vec<u8>> {
    let file_err = |source: std::io::Error| TransferError::File {
        path: path.to_path_buf(),
        source,
    };
    let meta = tokio::fs::metadata(path).await.map_err(file_err)?;
    check_size(meta.len())?;
    tokio::fs::read(path).await.map_err(file_err)
}

/// Send `path` to `config.remote` over a fresh UDP socket.
pub async fn send_file(config: SenderConfig, path: &Path) -> Result<TransferReport> {
    let data = load_file(path).await?;
    let mut engine = SenderEngine::bind(config).await?;
    engine.send_bytes(&data).await
}

/// The sending side of one transfer.
#[derive(Debug)]
pub struct SenderEngine<T = Socket> {
    transport: T,
    config: SenderConfig,
    state: SenderState,
}

impl SenderEngine<Socket> {
    /// Bind an ephemeral socket of the same address family as the remote.
    pub async fn bind(config: SenderConfig) -> Result<Self> {
        let local: SocketAddr = match config.remote {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = Socket::bind(local).await?;
        debug!("[send] bound {}", socket.local_addr);
        Ok(Self::new(socket, config))
    }
}

impl<T: Transport> SenderEngine<T> {
    pub fn new(transport: T, config: SenderConfig) -> Self {
        Self {
            transport,
            config,
            state: SenderState::Idle,
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Read `path` and send it.  See [`SenderEngine::send_bytes`].
    pub async fn send_file(&mut self, path: &Path) -> Result<TransferReport> {
        let data = load_file(path).await?;
        self.send_bytes(&data).await
    }

    /// Deliver `data` reliably to the configured remote.
    ///
    /// Returns once every chunk is acknowledged, or fails with
    /// [`TransferError::TransferIncomplete`] after the final-packet retry
    /// budget is spent.
    pub async fn send_bytes(&mut self, data: &[u8]) -> Result<TransferReport> {
        let chunks = ChunkMap::split(data)?;
        let mut window = SendWindow::for_chunks(&self.config, &chunks);

        info!(
            "[send] {} bytes in {} chunk(s) to {} ({}, W={}, RTO={:?})",
            chunks.total_bytes(),
            chunks.len(),
            self.config.remote,
            self.config.variant,
            self.config.window_size,
            self.config.retry_timeout
        );

        self.state = SenderState::Sending;
        let started = Instant::now();

        if let Err(e) = self.run(&chunks, &mut window).await {
            warn!("[send] aborted: {e}");
            self.state = SenderState::Aborted;
            return Err(e);
        }

        self.state = SenderState::Complete;
        let report = TransferReport {
            bytes: chunks.total_bytes(),
            chunks: chunks.len(),
            transmissions: window.transmissions(),
            retransmissions: window.retransmissions(),
            elapsed: started.elapsed(),
        };
        info!(
            "[send] complete: {} bytes in {:?}, {} retransmission(s)",
            report.bytes, report.elapsed, report.retransmissions
        );
        Ok(report)
    }

    async fn run(&mut self, chunks: &ChunkMap, window: &mut SendWindow) -> Result<()> {
        let rto = self.config.retry_timeout;

        while !window.is_complete() {
            let now = Instant::now();

            let expired = window.poll_timeouts(now)?;
            if !expired.is_empty() {
                debug!(
                    "[send] timeout: resending {} packet(s) from seq={} (base={})",
                    expired.len(),
                    expired[0],
                    window.base()
                );
            }
            for seq in expired {
                self.transmit(chunks, seq).await?;
            }

            for seq in window.take_sendable(now) {
                trace!("[send] → DATA seq={seq} in_flight={}", window.in_flight());
                self.transmit(chunks, seq).await?;
            }

            let wait = window
                .next_deadline()
                .map_or(rto, |d| d.saturating_duration_since(Instant::now()))
                .min(rto);

            // Block for the first ack, then drain whatever else is queued.
            let mut incoming = self.transport.recv_timeout(wait).await?;
            while let Some((datagram, from)) = incoming {
                self.on_datagram(window, &datagram, from);
                if window.is_complete() {
                    break;
                }
                incoming = self.transport.recv_timeout(Duration::ZERO).await?;
            }
        }
        Ok(())
    }

    async fn transmit(&mut self, chunks: &ChunkMap, seq: u16) -> Result<()> {
        let payload = chunks.get(seq);
        debug_assert!(payload.is_some(), "seq {seq} is outside the chunk map");
        let Some(payload) = payload else {
            warn!("[send] seq={seq} is outside the chunk map; not sent");
            return Ok(());
        };
        let datagram = packet::encode(seq, chunks.is_final(seq), payload);
        self.transport.send_to(&datagram, self.config.remote).await?;
        Ok(())
    }

    fn on_datagram(&self, window: &mut SendWindow, datagram: &[u8], from: SocketAddr) {
        if from != self.config.remote {
            trace!("[send] ignoring datagram from stranger {from}");
            return;
        }
        match Ack::decode(datagram) {
            Ok(ack) => {
                let newly = window.on_ack(ack.seq, Instant::now());
                if newly > 0 {
                    debug!("[send] ← ACK {} (+{newly}, base={})", ack.seq, window.base());
                } else {
                    trace!("[send] ← ACK {} (no progress)", ack.seq);
                }
            }
            Err(e) => debug!("[send] dropping malformed ack: {e}"),
        }
    }
}
