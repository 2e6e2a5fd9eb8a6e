//! Builder assembling connections from configuration, codec and subscribers.

use std::{fmt, io, net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tracing::debug;

use super::{
    Connection,
    ConnectionConfig,
    ConnectionError,
    DatagramTransport,
    events::Subscribers,
};
use crate::codec::{PacketCodec, RawCodec};

/// Template for [`Connection`]s.
///
/// A builder is cheap to clone; the acceptor clones its template once per
/// accepted stream so every connection starts with the same subscribers.
///
/// # Examples
///
/// ```no_run
/// use framelink::{connection::ConnectionBuilder, reassembly::TransportKind};
///
/// # async fn demo() {
/// let conn = ConnectionBuilder::new()
///     .on_packet(|packet, _conn| println!("received {} bytes", packet.len()))
///     .dial("127.0.0.1:7777".parse().expect("valid address"));
/// conn.connect().await;
/// conn.send(&bytes::Bytes::from_static(b"hello"), TransportKind::Stream)
///     .await;
/// # }
/// ```
pub struct ConnectionBuilder<C: PacketCodec = RawCodec> {
    pub(super) config: ConnectionConfig,
    pub(super) codec: Arc<C>,
    pub(super) subscribers: Subscribers<C>,
    pub(super) datagram: Option<Arc<dyn DatagramTransport>>,
}

impl ConnectionBuilder<RawCodec> {
    /// Builder for connections exchanging raw payload bytes.
    #[must_use]
    pub fn new() -> Self { Self::with_codec(RawCodec) }
}

impl Default for ConnectionBuilder<RawCodec> {
    fn default() -> Self { Self::new() }
}

impl<C: PacketCodec> Clone for ConnectionBuilder<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            codec: Arc::clone(&self.codec),
            subscribers: self.subscribers.clone(),
            datagram: self.datagram.clone(),
        }
    }
}

impl<C: PacketCodec> fmt::Debug for ConnectionBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBuilder")
            .field("config", &self.config)
            .field("subscribers", &self.subscribers)
            .field("datagram", &self.datagram.is_some())
            .finish_non_exhaustive()
    }
}

impl<C: PacketCodec> ConnectionBuilder<C> {
    /// Builder for connections using `codec` for payloads.
    #[must_use]
    pub fn with_codec(codec: C) -> Self {
        Self {
            config: ConnectionConfig::default(),
            codec: Arc::new(codec),
            subscribers: Subscribers::default(),
            datagram: None,
        }
    }

    /// Replace the connection configuration.
    #[must_use]
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// The configuration connections will be built with.
    #[must_use]
    pub const fn connection_config(&self) -> &ConnectionConfig { &self.config }

    /// Attach a datagram endpoint to the next connection built.
    ///
    /// `socket` should already be connected to the peer.
    #[must_use]
    pub fn datagram<D: DatagramTransport>(mut self, socket: D) -> Self {
        self.datagram = Some(Arc::new(socket));
        self
    }

    /// Detach any datagram endpoint.
    #[must_use]
    pub fn without_datagram(mut self) -> Self {
        self.datagram = None;
        self
    }

    /// Subscribe to successful completion of the connect handshake.
    #[must_use]
    pub fn on_connected<F>(mut self, f: F) -> Self
    where
        F: Fn(&Connection<C>) + Send + Sync + 'static,
    {
        self.subscribers.connected.push(Arc::new(f));
        self
    }

    /// Subscribe to failures of the connect handshake.
    #[must_use]
    pub fn on_connect_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&io::Error, &Connection<C>) + Send + Sync + 'static,
    {
        self.subscribers.connect_error.push(Arc::new(f));
        self
    }

    /// Subscribe to every other connection fault.
    #[must_use]
    pub fn on_connection_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&ConnectionError, &Connection<C>) + Send + Sync + 'static,
    {
        self.subscribers.connection_error.push(Arc::new(f));
        self
    }

    /// Subscribe to reassembled packets.
    #[must_use]
    pub fn on_packet<F>(mut self, f: F) -> Self
    where
        F: Fn(&C::Packet, &Connection<C>) + Send + Sync + 'static,
    {
        self.subscribers.packet.push(Arc::new(f));
        self
    }

    /// Build a client connection to `addr` without connecting yet.
    ///
    /// Call [`Connection::connect`] to run the handshake.
    #[must_use]
    pub fn dial(self, addr: SocketAddr) -> Connection<C> {
        Connection::new(self, false, Some(addr), None)
    }

    /// Wrap a stream accepted by a listener.
    ///
    /// The connection is connected immediately and its receive loops are
    /// running when this returns. Must be called within a Tokio runtime.
    pub fn accept_from<S>(self, stream: S, peer_addr: Option<SocketAddr>) -> Connection<C>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Connection::open(self, stream, peer_addr, true)
    }

    /// Wrap an accepted TCP stream, applying the configured socket options.
    ///
    /// Must be called within a Tokio runtime.
    pub fn accept_tcp(self, stream: TcpStream) -> Connection<C> {
        apply_nodelay(&stream, self.config.is_nodelay());
        let peer_addr = stream.peer_addr().ok();
        self.accept_from(stream, peer_addr)
    }

    /// Wrap a stream this side opened itself, such as one half of an
    /// in-memory pipe.
    ///
    /// Behaves like [`accept_from`](Self::accept_from) but the connection
    /// reports itself as the client side.
    pub fn establish<S>(self, stream: S, peer_addr: Option<SocketAddr>) -> Connection<C>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Connection::open(self, stream, peer_addr, false)
    }
}

pub(super) fn apply_nodelay(stream: &TcpStream, enabled: bool) {
    if let Err(error) = stream.set_nodelay(enabled) {
        debug!(%error, "failed to set TCP_NODELAY");
    }
}
