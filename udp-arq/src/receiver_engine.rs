//! Receiving engine: drives a [`ReceiveWindow`] over a [`Transport`].
//!
//! The engine locks onto the first peer that sends a well-formed packet and
//! ignores everyone else.  Once the window reports the full range is in, it
//! repeats the closing acknowledgments [`DRAIN_BURST`] times, reassembles,
//! and stops.

use std::net::SocketAddr;
use std::path::Path;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::chunk::SEQ_ORIGIN;
use crate::config::{ReceiverConfig, DRAIN_BURST, RECEIVER_POLL_INTERVAL};
use crate::error::{Result, TransferError};
use crate::packet::Packet;
use crate::receiver::ReceiveWindow;
use crate::socket::{Socket, Transport};
use crate::state::ReceiverState;

/// Outcome of a successful receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveReport {
    pub bytes: u64,
    pub chunks: usize,
    /// Data packets seen from the peer, duplicates included.
    pub packets: u64,
    pub duplicates: u64,
    /// From the first packet to the end of the drain burst.
    pub elapsed: Duration,
    pub peer: SocketAddr,
}

/// Bind `config.bind`, receive one file and write it to `path`.
pub async fn receive_file(config: ReceiverConfig, path: &Path) -> Result<ReceiveReport> {
    let mut engine = ReceiverEngine::bind(config).await?;
    engine.receive_file(path).await
}

/// The receiving side of one transfer.
#[derive(Debug)]
pub struct ReceiverEngine<T = Socket> {
    transport: T,
    config: ReceiverConfig,
    state: ReceiverState,
}

impl ReceiverEngine<Socket> {
    pub async fn bind(config: ReceiverConfig) -> Result<Self> {
        let socket = Socket::bind(config.bind).await?;
        info!("[recv] listening on {} ({})", socket.local_addr, config.variant);
        Ok(Self::new(socket, config))
    }
}

impl<T: Transport> ReceiverEngine<T> {
    pub fn new(transport: T, config: ReceiverConfig) -> Self {
        Self {
            transport,
            config,
            state: ReceiverState::Receiving,
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Receive one file and write it to `path`.  Nothing is written unless
    /// the whole file arrived.
    pub async fn receive_file(&mut self, path: &Path) -> Result<ReceiveReport> {
        let (data, report) = self.receive().await?;
        tokio::fs::write(path, &data)
            .await
            .map_err(|source| TransferError::File {
                path: path.to_path_buf(),
                source,
            })?;
        info!("[recv] wrote {} bytes to {}", data.len(), path.display());
        Ok(report)
    }

    /// Receive one file into memory.
    ///
    /// Waits indefinitely for the first packet.  With an idle timeout
    /// configured, a transfer that stalls afterwards fails with
    /// [`TransferError::ReassemblyGap`] naming the first missing sequence
    /// number.
    pub async fn receive(&mut self) -> Result<(Vec<u8>, ReceiveReport)> {
        let mut window = ReceiveWindow::new(
            self.config.variant,
            self.config.window_size,
            self.config.output_capacity,
        );
        self.state = ReceiverState::Receiving;

        let idle_timeout = self.config.idle_timeout;
        let poll = idle_timeout.map_or(RECEIVER_POLL_INTERVAL, |d| d.min(RECEIVER_POLL_INTERVAL));

        let mut peer: Option<SocketAddr> = None;
        let mut started = Instant::now();
        let mut last_packet = started;

        while window.state() == ReceiverState::Receiving {
            let Some((datagram, from)) = self.transport.recv_timeout(poll).await? else {
                if let (Some(idle), Some(_)) = (idle_timeout, peer) {
                    if last_packet.elapsed() >= idle {
                        let seq = window.first_missing();
                        warn!("[recv] idle for {idle:?}; giving up with seq={seq} missing");
                        self.state = ReceiverState::Done;
                        return Err(TransferError::ReassemblyGap { seq });
                    }
                }
                continue;
            };

            if peer.is_some_and(|p| p != from) {
                trace!("[recv] ignoring datagram from stranger {from}");
                continue;
            }

            let packet = match Packet::decode(&datagram) {
                Ok(p) => p,
                Err(e) => {
                    debug!("[recv] dropping malformed frame from {from}: {e}");
                    continue;
                }
            };

            if peer.is_none() {
                info!("[recv] transfer started by {from}");
                peer = Some(from);
                started = Instant::now();
            }
            last_packet = Instant::now();

            let seq = packet.seq;
            match window.on_packet(packet) {
                Some(ack) => {
                    trace!("[recv] ← DATA seq={seq}; → ACK {}", ack.seq);
                    self.transport.send_to(&ack.encode(), from).await?;
                }
                None => trace!("[recv] ← DATA seq={seq} dropped"),
            }
        }

        // Leaving the loop means a packet arrived, so the peer is known.
        let Some(peer) = peer else {
            return Err(TransferError::ReassemblyGap {
                seq: window.first_missing(),
            });
        };

        self.state = ReceiverState::Draining;
        let closing = window.drain_acks();
        debug!(
            "[recv] draining: {} ack(s) x {DRAIN_BURST} to {peer}",
            closing.len()
        );
        for _ in 0..DRAIN_BURST {
            for ack in &closing {
                self.transport.send_to(&ack.encode(), peer).await?;
            }
        }

        let packets = window.packets();
        let duplicates = window.duplicates();
        let result = window.finish();
        self.state = ReceiverState::Done;
        let data = result?;

        let report = ReceiveReport {
            bytes: data.len() as u64,
            chunks: window.final_seq().map_or(0, |f| usize::from(f - SEQ_ORIGIN) + 1),
            packets,
            duplicates,
            elapsed: started.elapsed(),
            peer,
        };
        info!(
            "[recv] complete: {} bytes in {} chunk(s), {} duplicate(s)",
            report.bytes, report.chunks, report.duplicates
        );
        Ok((data, report))
    }
}
