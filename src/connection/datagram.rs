//! Optional datagram endpoint attached to a connection.

use std::io;

use async_trait::async_trait;
use tokio::net::UdpSocket;

/// A boundary-preserving, unreliable transport bound to one peer.
///
/// Every `send` writes exactly one datagram and every `recv` yields exactly
/// one. Implementations must be cancellation-safe for `recv`: the receive
/// loop drops a pending `recv` future when the connection closes.
#[async_trait]
pub trait DatagramTransport: Send + Sync + 'static {
    /// Send one datagram to the peer.
    async fn send(&self, datagram: &[u8]) -> io::Result<usize>;

    /// Receive one datagram from the peer into `buf`.
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// A UDP socket already [`connect`](UdpSocket::connect)ed to the peer.
#[async_trait]
impl DatagramTransport for UdpSocket {
    async fn send(&self, datagram: &[u8]) -> io::Result<usize> { UdpSocket::send(self, datagram).await }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> { UdpSocket::recv(self, buf).await }
}
