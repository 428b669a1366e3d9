//! Datagram transport abstraction.
//!
//! [`Transport`] is the seam between the engines and the network: a send
//! that never waits on the peer, and a receive whose wait is bounded by the
//! caller.  [`Socket`] implements it over `tokio::net::UdpSocket`;
//! [`crate::simulator::Simulator`] wraps any transport to inject faults.
//!
//! All protocol logic lives elsewhere; this module owns only byte I/O.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

/// Receive buffer size.  Larger than any well-formed datagram so oversized
/// input is seen (and rejected by the framer) rather than silently truncated.
const RECV_BUF: usize = 2048;

/// An unreliable, unordered datagram channel owned by a single engine.
pub trait Transport {
    /// Hand one datagram to the network.
    fn send_to(
        &mut self,
        datagram: &[u8],
        dest: SocketAddr,
    ) -> impl Future<Output = io::Result<()>> + Send;

    /// Wait at most `wait` for one datagram.
    ///
    /// `Ok(None)` means nothing arrived in time; it is a normal outcome, not
    /// an error.  A zero `wait` still returns a datagram that is already
    /// queued.
    fn recv_timeout(
        &mut self,
        wait: Duration,
    ) -> impl Future<Output = io::Result<Option<(Vec<u8>, SocketAddr)>>> + Send;

    /// Address this transport is bound to.
    fn local_addr(&self) -> SocketAddr;
}

/// Returns true if a receive error is a side effect of the peer going away
/// (an ICMP unreachable reported on the socket) rather than a local failure.
fn is_transient_io_error(e: &io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
    )
}

/// A UDP socket speaking raw datagrams.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after the OS assigns an
    /// ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing port 0 lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }
}

impl Transport for Socket {
    async fn send_to(&mut self, datagram: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.inner.send_to(datagram, dest).await?;
        Ok(())
    }

    async fn recv_timeout(&mut self, wait: Duration) -> io::Result<Option<(Vec<u8>, SocketAddr)>> {
        let mut buf = vec![0u8; RECV_BUF];
        match tokio::time::timeout(wait, self.inner.recv_from(&mut buf)).await {
            Ok(Ok((n, from))) => {
                buf.truncate(n);
                Ok(Some((buf, from)))
            }
            Ok(Err(e)) if is_transient_io_error(&e) => {
                log::debug!("[socket] transient receive error ignored: {e}");
                Ok(None)
            }
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Ok(None),
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
