//! The connection engine.
//!
//! A [`Connection`] owns a byte stream and, optionally, a datagram endpoint.
//! Each transport has its own receive loop feeding its own
//! [`SharedReassembly`]; a drain cuts complete frames out of those buffers and
//! raises one packet event per frame. Failures never escape a public method:
//! they are delivered to the connection error subscribers and the connection
//! is marked disconnected.
//!
//! Draining happens either after every read ("background processing") or
//! whenever the owner calls [`Connection::drain`]. Each drain runs at most
//! [`ConnectionConfig::process_iterations`] steps per transport.

use std::{
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::Mutex as AsyncMutex,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info, warn};

use crate::{
    codec::{PacketCodec, RawCodec},
    reassembly::{ReassemblyBuffer, SharedReassembly, TransportKind},
};

mod builder;
mod config;
mod counter;
mod datagram;
mod error;
mod events;
mod receive;
mod send;

pub use builder::ConnectionBuilder;
pub use config::{
    ConnectionConfig,
    DEFAULT_DATAGRAM_RECV_SIZE,
    DEFAULT_MAX_PROCESS_ITERATIONS,
    DEFAULT_READ_CHUNK_SIZE,
};
pub use counter::active_connection_count;
use counter::ActiveConnection;
pub use datagram::DatagramTransport;
pub use error::ConnectionError;
pub use events::{ConnectErrorHandler, ConnectedHandler, ErrorHandler, PacketHandler};
use events::{EventHub, Panicked};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One peer-to-peer channel.
///
/// `Connection` is a cheap handle; clones share the same underlying state.
/// The receive loops hold a handle of their own, so a connection stays open
/// after its owner drops every handle until [`close`](Self::close) is called
/// or a connection error stops the loops.
pub struct Connection<C: PacketCodec = RawCodec> {
    inner: Arc<Inner<C>>,
}

struct Inner<C: PacketCodec> {
    config: ConnectionConfig,
    codec: Arc<C>,
    is_server: bool,
    peer_addr: Option<SocketAddr>,
    connected: AtomicBool,
    closed: AtomicBool,
    background: AtomicBool,
    events: EventHub<C>,
    stream_buffer: SharedReassembly,
    datagram_buffer: SharedReassembly,
    writer: AsyncMutex<Option<BoxedWriter>>,
    datagram: Mutex<Option<Arc<dyn DatagramTransport>>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    active: Mutex<Option<ActiveConnection>>,
}

impl<C: PacketCodec> Inner<C> {
    fn buffer(&self, kind: TransportKind) -> &SharedReassembly {
        match kind {
            TransportKind::Stream => &self.stream_buffer,
            TransportKind::Datagram => &self.datagram_buffer,
        }
    }

    fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }

    fn is_connected(&self) -> bool { self.connected.load(Ordering::Acquire) }

    /// Whether another read may be issued.
    fn can_rearm(&self) -> bool { !self.is_closed() && self.is_connected() }
}

impl<C: PacketCodec> Clone for Connection<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: PacketCodec> fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer_addr", &self.inner.peer_addr)
            .field("is_server", &self.inner.is_server)
            .field("connected", &self.is_connected())
            .field("closed", &self.is_closed())
            .field("background_processing", &self.background_processing())
            .finish_non_exhaustive()
    }
}

impl<C: PacketCodec> Connection<C> {
    fn new(
        builder: ConnectionBuilder<C>,
        is_server: bool,
        peer_addr: Option<SocketAddr>,
        writer: Option<BoxedWriter>,
    ) -> Self {
        let ConnectionBuilder {
            config,
            codec,
            subscribers,
            datagram,
        } = builder;
        let buffer = |kind| {
            SharedReassembly::new(ReassemblyBuffer::new(
                kind,
                config.byte_order(),
                config.frame_length_limit(),
            ))
        };
        Self {
            inner: Arc::new(Inner {
                config,
                codec,
                is_server,
                peer_addr,
                connected: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                background: AtomicBool::new(config.is_background_processing()),
                events: EventHub::new(subscribers),
                stream_buffer: buffer(TransportKind::Stream),
                datagram_buffer: buffer(TransportKind::Datagram),
                writer: AsyncMutex::new(writer),
                datagram: Mutex::new(datagram),
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
                active: Mutex::new(Some(ActiveConnection::new())),
            }),
        }
    }

    /// Build a connection over an already connected stream and start
    /// receiving.
    fn open<S>(
        builder: ConnectionBuilder<C>,
        stream: S,
        peer_addr: Option<SocketAddr>,
        is_server: bool,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let conn = Self::new(builder, is_server, peer_addr, Some(Box::new(writer)));
        conn.inner.connected.store(true, Ordering::Release);
        info!(?peer_addr, is_server, "connection established");
        conn.start_receiving(Box::new(reader));
        conn
    }

    /// Run the connect handshake of a dialled connection.
    ///
    /// On success the connection is marked connected, the connected event is
    /// raised and the receive loops start. On failure the connect error
    /// event is raised with the transport error; the connection stays open so
    /// `connect` may be retried.
    ///
    /// Does nothing on a closed, accepted or already connected connection.
    pub async fn connect(&self) {
        let inner = &self.inner;
        if inner.is_closed() || inner.is_server || inner.is_connected() {
            return;
        }
        let Some(addr) = inner.peer_addr else {
            return;
        };
        let result = TcpStream::connect(addr).await;
        if inner.is_closed() {
            return;
        }
        match result {
            Ok(stream) => {
                builder::apply_nodelay(&stream, inner.config.is_nodelay());
                let (reader, writer) = tokio::io::split(stream);
                {
                    let mut slot = inner.writer.lock().await;
                    if inner.is_closed() {
                        return;
                    }
                    *slot = Some(Box::new(writer));
                }
                inner.connected.store(true, Ordering::Release);
                info!(%addr, "connected");
                let panics = inner.events.connected(self);
                self.report_panics(panics);
                if inner.can_rearm() {
                    self.start_receiving(Box::new(reader));
                }
            }
            Err(error) => {
                inner.connected.store(false, Ordering::Release);
                crate::metrics::inc_errors("connect");
                warn!(%addr, %error, "connect failed");
                for panicked in inner.events.connect_error(&error, self) {
                    log_swallowed_panic(&panicked);
                }
            }
        }
    }

    fn start_receiving(&self, reader: BoxedReader) {
        let inner = &self.inner;
        inner.tasks.spawn(receive::stream_loop(
            self.clone(),
            reader,
            inner.shutdown.clone(),
        ));
        if let Some(socket) = self.datagram_transport() {
            inner.tasks.spawn(receive::datagram_loop(
                self.clone(),
                socket,
                inner.shutdown.clone(),
            ));
        }
    }

    fn datagram_transport(&self) -> Option<Arc<dyn DatagramTransport>> {
        self.inner
            .datagram
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Close the connection.
    ///
    /// The first call marks the connection closed, stops the receive loops
    /// and releases the transports; later calls do nothing. Teardown errors
    /// are ignored. No events are raised once this returns.
    pub fn close(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        inner.shutdown.cancel();
        inner.tasks.close();
        // A send holding the writer drops it once it sees the closed flag.
        if let Ok(mut writer) = inner.writer.try_lock() {
            writer.take();
        }
        inner
            .datagram
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        info!(peer_addr = ?inner.peer_addr, is_server = inner.is_server, "connection closed");
    }

    /// Wait until the connection is closed and its receive loops have
    /// stopped.
    pub async fn closed(&self) {
        self.inner.shutdown.cancelled().await;
        self.inner.tasks.wait().await;
    }

    /// Whether the connection is connected and usable for sending.
    #[must_use]
    pub fn is_connected(&self) -> bool { self.inner.is_connected() }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.inner.is_closed() }

    /// Whether this connection was accepted rather than dialled.
    #[must_use]
    pub fn is_server(&self) -> bool { self.inner.is_server }

    /// Address of the peer, when known.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> { self.inner.peer_addr }

    /// Whether frames are drained automatically after each read.
    #[must_use]
    pub fn background_processing(&self) -> bool { self.inner.background.load(Ordering::Acquire) }

    /// Drain automatically after each read from now on.
    pub fn enable_background_processing(&self) {
        self.inner.background.store(true, Ordering::Release);
    }

    /// Whether a datagram endpoint is attached.
    #[must_use]
    pub fn has_datagram(&self) -> bool { self.datagram_transport().is_some() }

    /// The configuration this connection was built with.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig { &self.inner.config }

    /// Subscribe to successful completion of the connect handshake.
    pub fn subscribe_connected<F>(&self, f: F)
    where
        F: Fn(&Connection<C>) + Send + Sync + 'static,
    {
        self.inner.events.add_connected(Arc::new(f));
    }

    /// Subscribe to failures of the connect handshake.
    pub fn subscribe_connect_error<F>(&self, f: F)
    where
        F: Fn(&std::io::Error, &Connection<C>) + Send + Sync + 'static,
    {
        self.inner.events.add_connect_error(Arc::new(f));
    }

    /// Subscribe to connection faults.
    pub fn subscribe_connection_error<F>(&self, f: F)
    where
        F: Fn(&ConnectionError, &Connection<C>) + Send + Sync + 'static,
    {
        self.inner.events.add_connection_error(Arc::new(f));
    }

    /// Subscribe to reassembled packets.
    pub fn subscribe_packet<F>(&self, f: F)
    where
        F: Fn(&C::Packet, &Connection<C>) + Send + Sync + 'static,
    {
        self.inner.events.add_packet(Arc::new(f));
    }

    /// Mark the connection disconnected and raise the connection error event.
    ///
    /// Ignored once the connection is closed.
    fn report_error(&self, error: ConnectionError) {
        let inner = &self.inner;
        if inner.is_closed() {
            return;
        }
        inner.connected.store(false, Ordering::Release);
        crate::metrics::inc_errors(error.kind());
        if error.is_peer_closed() {
            info!(peer_addr = ?inner.peer_addr, %error, "peer disconnected");
        } else {
            warn!(peer_addr = ?inner.peer_addr, %error, kind = error.kind(), "connection error");
        }
        for panicked in inner.events.connection_error(&error, self) {
            log_swallowed_panic(&panicked);
        }
    }

    fn report_panics(&self, panics: Vec<Panicked>) {
        for panicked in panics {
            self.report_error(panicked.into());
        }
    }
}

/// A panic raised by an error subscriber cannot be reported as another error.
fn log_swallowed_panic(panicked: &Panicked) {
    error!(
        event = panicked.event,
        panic = %panicked.message,
        "error subscriber panicked"
    );
}

#[cfg(test)]
mod tests;
