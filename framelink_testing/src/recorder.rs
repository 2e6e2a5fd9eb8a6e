//! Recording the events a connection raises.

use std::{
    fmt,
    io,
    pin::pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use framelink::{
    codec::PacketCodec,
    connection::{Connection, ConnectionBuilder},
};
use tokio::{sync::Notify, time::timeout};

/// How long the `wait_for_*` helpers wait before panicking.
pub const WAIT: Duration = Duration::from_secs(5);

struct State<P> {
    packets: Mutex<Vec<P>>,
    errors: Mutex<Vec<(&'static str, String)>>,
    connect_errors: Mutex<Vec<io::ErrorKind>>,
    connected: Mutex<usize>,
    notify: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }

/// Collects packets, errors and lifecycle events from connections.
///
/// Clones share the same record.
pub struct EventRecorder<P> {
    state: Arc<State<P>>,
}

impl<P> Clone for EventRecorder<P> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<P> fmt::Debug for EventRecorder<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRecorder")
            .field("packets", &lock(&self.state.packets).len())
            .field("errors", &*lock(&self.state.errors))
            .field("connected", &*lock(&self.state.connected))
            .finish_non_exhaustive()
    }
}

impl<P: Clone + Send + Sync + 'static> Default for EventRecorder<P> {
    fn default() -> Self { Self::new() }
}

impl<P: Clone + Send + Sync + 'static> EventRecorder<P> {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(State {
                packets: Mutex::new(Vec::new()),
                errors: Mutex::new(Vec::new()),
                connect_errors: Mutex::new(Vec::new()),
                connected: Mutex::new(0),
                notify: Notify::new(),
            }),
        }
    }

    /// Register recording subscribers on `builder`.
    #[must_use]
    pub fn attach<C>(&self, builder: ConnectionBuilder<C>) -> ConnectionBuilder<C>
    where
        C: PacketCodec<Packet = P>,
    {
        let packets = self.clone();
        let errors = self.clone();
        let connected = self.clone();
        let connect_errors = self.clone();
        builder
            .on_packet(move |packet, _| packets.record_packet(packet))
            .on_connection_error(move |error, _| {
                errors.record_error(error.kind(), error.to_string());
            })
            .on_connected(move |_| connected.record_connected())
            .on_connect_error(move |error, _| connect_errors.record_connect_error(error.kind()))
    }

    /// Register recording subscribers on an existing connection.
    pub fn subscribe<C>(&self, conn: &Connection<C>)
    where
        C: PacketCodec<Packet = P>,
    {
        let packets = self.clone();
        let errors = self.clone();
        conn.subscribe_packet(move |packet, _| packets.record_packet(packet));
        conn.subscribe_connection_error(move |error, _| {
            errors.record_error(error.kind(), error.to_string());
        });
    }

    fn record_packet(&self, packet: &P) {
        lock(&self.state.packets).push(packet.clone());
        self.state.notify.notify_waiters();
    }

    fn record_error(&self, kind: &'static str, message: String) {
        lock(&self.state.errors).push((kind, message));
        self.state.notify.notify_waiters();
    }

    fn record_connected(&self) {
        *lock(&self.state.connected) += 1;
        self.state.notify.notify_waiters();
    }

    fn record_connect_error(&self, kind: io::ErrorKind) {
        lock(&self.state.connect_errors).push(kind);
        self.state.notify.notify_waiters();
    }

    /// Packets received so far, in delivery order.
    #[must_use]
    pub fn packets(&self) -> Vec<P> { lock(&self.state.packets).clone() }

    /// Connection error kinds raised so far.
    #[must_use]
    pub fn error_kinds(&self) -> Vec<&'static str> {
        lock(&self.state.errors).iter().map(|(kind, _)| *kind).collect()
    }

    /// Connection error messages raised so far.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        lock(&self.state.errors)
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Number of connected events raised.
    #[must_use]
    pub fn connected_count(&self) -> usize { *lock(&self.state.connected) }

    /// Kinds of the connect errors raised so far.
    #[must_use]
    pub fn connect_errors(&self) -> Vec<io::ErrorKind> { lock(&self.state.connect_errors).clone() }

    /// Wait until at least `count` packets have arrived and return them all.
    ///
    /// # Panics
    ///
    /// Panics if they do not arrive within [`WAIT`].
    pub async fn wait_for_packets(&self, count: usize) -> Vec<P> {
        self.wait_until(|| lock(&self.state.packets).len() >= count)
            .await;
        self.packets()
    }

    /// Wait until at least `count` connection errors have been raised and
    /// return their kinds.
    ///
    /// # Panics
    ///
    /// Panics if they are not raised within [`WAIT`].
    pub async fn wait_for_errors(&self, count: usize) -> Vec<&'static str> {
        self.wait_until(|| lock(&self.state.errors).len() >= count)
            .await;
        self.error_kinds()
    }

    /// Wait until `condition` holds, rechecking after every recorded event.
    ///
    /// # Panics
    ///
    /// Panics if it does not hold within [`WAIT`].
    pub async fn wait_until(&self, condition: impl Fn() -> bool) {
        let waited = timeout(WAIT, async {
            loop {
                let mut notified = pin!(self.state.notify.notified());
                notified.as_mut().enable();
                if condition() {
                    return;
                }
                notified.await;
            }
        })
        .await;
        assert!(waited.is_ok(), "condition not reached within {WAIT:?}: {self:?}");
    }
}
