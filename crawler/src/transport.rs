//! UDP transport seam for the crawl session.
//!
//! The [`Datagrams`] trait abstracts the single shared socket, enabling
//! dependency injection for testing without touching the dispatch logic.
//! One instance owns the process-wide listening lifecycle; no second session
//! should share a socket.

use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

/// A source and sink of UDP datagrams.
pub(crate) trait Datagrams: Send + Sync + 'static {
    fn send_to(
        &self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl std::future::Future<Output = io::Result<usize>> + Send;
    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl std::future::Future<Output = io::Result<(usize, SocketAddr)>> + Send;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// The real transport: a bound tokio UDP socket.
#[derive(Debug)]
pub(crate) struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind the crawler's socket. A failure here is fatal to startup; errors
    /// on the bound socket later are not.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(UdpTransport { socket })
    }
}

impl Datagrams for UdpTransport {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
