//! Fault-injecting network layer for testing.
//!
//! Real networks drop, reorder, and duplicate datagrams.  To exercise the
//! engines' recovery paths without depending on actual network conditions,
//! [`Simulator`] wraps any [`Transport`] and applies a configurable fault
//! model to every outbound datagram:
//!
//! | Fault       | Description                                             |
//! |-------------|---------------------------------------------------------|
//! | Loss        | Drop the datagram with probability `loss_rate`.         |
//! | Duplication | Deliver the datagram twice with `duplicate_rate`.       |
//! | Reordering  | Hold the datagram back with `reorder_rate` and release  |
//! |             | it right after the next datagram sent.                  |
//!
//! Faults are drawn from a seeded [`StdRng`], so a failing run can be
//! replayed with the same seed.  Inbound datagrams pass through untouched:
//! wrap both endpoints to impair both directions.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::socket::Transport;

/// Configuration for the fault model.  Probabilities are in `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub loss_rate: f64,
    pub duplicate_rate: f64,
    pub reorder_rate: f64,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults: a transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            reorder_rate: 0.0,
            seed: 0,
        }
    }
}

impl SimulatorConfig {
    /// Independent loss only.
    pub fn lossy(loss_rate: f64, seed: u64) -> Self {
        Self {
            loss_rate,
            seed,
            ..Self::default()
        }
    }
}

/// Counters of what the fault model did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    pub offered: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub reordered: u64,
}

/// A fault-injecting wrapper around another transport.
#[derive(Debug)]
pub struct Simulator<T> {
    inner: T,
    config: SimulatorConfig,
    rng: StdRng,
    held: Option<(Vec<u8>, SocketAddr)>,
    stats: SimulatorStats,
}

impl<T: Transport> Simulator<T> {
    pub fn new(inner: T, config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            inner,
            config,
            rng,
            held: None,
            stats: SimulatorStats::default(),
        }
    }

    pub fn stats(&self) -> SimulatorStats {
        self.stats
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn roll(&mut self, p: f64) -> bool {
        p > 0.0 && self.rng.random_bool(p.min(1.0))
    }

    async fn forward(&mut self, datagram: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.inner.send_to(datagram, dest).await?;
        if self.roll(self.config.duplicate_rate) {
            self.stats.duplicated += 1;
            trace!("[sim] duplicating {}-byte datagram", datagram.len());
            self.inner.send_to(datagram, dest).await?;
        }
        Ok(())
    }
}

impl<T: Transport + Send> Transport for Simulator<T> {
    async fn send_to(&mut self, datagram: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.stats.offered += 1;

        if self.roll(self.config.loss_rate) {
            self.stats.dropped += 1;
            trace!("[sim] dropping {}-byte datagram to {dest}", datagram.len());
            return Ok(());
        }

        if self.held.is_none() && self.roll(self.config.reorder_rate) {
            self.stats.reordered += 1;
            trace!("[sim] holding back {}-byte datagram", datagram.len());
            self.held = Some((datagram.to_vec(), dest));
            return Ok(());
        }

        self.forward(datagram, dest).await?;
        if let Some((late, late_dest)) = self.held.take() {
            self.forward(&late, late_dest).await?;
        }
        Ok(())
    }

    fn recv_timeout(
        &mut self,
        wait: Duration,
    ) -> impl Future<Output = io::Result<Option<(Vec<u8>, SocketAddr)>>> + Send {
        self.inner.recv_timeout(wait)
    }

    fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::Socket;

    async fn pair() -> (Socket, Socket) {
        let a = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        (a, b)
    }

    async fn drain(sock: &mut Socket) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some((d, _)) = sock.recv_timeout(Duration::from_millis(50)).await.unwrap() {
            out.push(d);
        }
        out
    }

    #[tokio::test]
    async fn default_config_is_pass_through() {
        let (a, mut b) = pair().await;
        let dest = b.local_addr;
        let mut sim = Simulator::new(a, SimulatorConfig::default());
        for i in 0..5u8 {
            sim.send_to(&[i], dest).await.unwrap();
        }
        assert_eq!(drain(&mut b).await, vec![vec![0], vec![1], vec![2], vec![3], vec![4]]);
        assert_eq!(sim.stats().offered, 5);
        assert_eq!(sim.stats().dropped, 0);
    }

    #[tokio::test]
    async fn full_loss_drops_everything() {
        let (a, mut b) = pair().await;
        let dest = b.local_addr;
        let mut sim = Simulator::new(a, SimulatorConfig::lossy(1.0, 1));
        for i in 0..5u8 {
            sim.send_to(&[i], dest).await.unwrap();
        }
        assert!(drain(&mut b).await.is_empty());
        assert_eq!(sim.stats().dropped, 5);
    }

    #[tokio::test]
    async fn full_duplication_sends_twice() {
        let (a, mut b) = pair().await;
        let dest = b.local_addr;
        let config = SimulatorConfig {
            duplicate_rate: 1.0,
            ..SimulatorConfig::default()
        };
        let mut sim = Simulator::new(a, config);
        sim.send_to(b"x", dest).await.unwrap();
        assert_eq!(drain(&mut b).await, vec![b"x".to_vec(), b"x".to_vec()]);
    }

    #[tokio::test]
    async fn reordered_datagram_follows_the_next_one() {
        let (a, mut b) = pair().await;
        let dest = b.local_addr;
        let config = SimulatorConfig {
            reorder_rate: 1.0,
            ..SimulatorConfig::default()
        };
        let mut sim = Simulator::new(a, config);
        sim.send_to(b"first", dest).await.unwrap();
        // Slot is occupied, so the second goes straight out and releases the first.
        sim.send_to(b"second", dest).await.unwrap();
        assert_eq!(
            drain(&mut b).await,
            vec![b"second".to_vec(), b"first".to_vec()]
        );
        assert_eq!(sim.stats().reordered, 1);
    }
}
