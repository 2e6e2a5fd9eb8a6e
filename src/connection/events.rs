//! Event subscriber registry and panic-isolating dispatch.

use std::{
    fmt,
    io,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, PoisonError, RwLock},
};

use super::{Connection, ConnectionError};
use crate::{codec::PacketCodec, panic::format_panic};

/// Subscriber for the connected event.
pub type ConnectedHandler<C> = Arc<dyn Fn(&Connection<C>) + Send + Sync>;
/// Subscriber for failures of the connect handshake.
pub type ConnectErrorHandler<C> = Arc<dyn Fn(&io::Error, &Connection<C>) + Send + Sync>;
/// Subscriber for every other connection fault.
pub type ErrorHandler<C> = Arc<dyn Fn(&ConnectionError, &Connection<C>) + Send + Sync>;
/// Subscriber receiving each reassembled packet.
pub type PacketHandler<C> =
    Arc<dyn Fn(&<C as PacketCodec>::Packet, &Connection<C>) + Send + Sync>;

/// Names of the events, as reported in [`ConnectionError::SubscriberPanicked`].
pub(super) mod names {
    pub const CONNECTED: &str = "connected";
    pub const CONNECT_ERROR: &str = "connect_error";
    pub const CONNECTION_ERROR: &str = "connection_error";
    pub const PACKET_READY: &str = "packet_ready";
}

/// A subscriber that panicked during dispatch.
#[derive(Debug)]
pub(super) struct Panicked {
    pub event: &'static str,
    pub message: String,
}

impl From<Panicked> for ConnectionError {
    fn from(value: Panicked) -> Self {
        ConnectionError::SubscriberPanicked {
            event: value.event,
            message: value.message,
        }
    }
}

/// Subscribers registered on a builder before any connection exists.
pub(super) struct Subscribers<C: PacketCodec> {
    pub connected: Vec<ConnectedHandler<C>>,
    pub connect_error: Vec<ConnectErrorHandler<C>>,
    pub connection_error: Vec<ErrorHandler<C>>,
    pub packet: Vec<PacketHandler<C>>,
}

impl<C: PacketCodec> Default for Subscribers<C> {
    fn default() -> Self {
        Self {
            connected: Vec::new(),
            connect_error: Vec::new(),
            connection_error: Vec::new(),
            packet: Vec::new(),
        }
    }
}

impl<C: PacketCodec> Clone for Subscribers<C> {
    fn clone(&self) -> Self {
        Self {
            connected: self.connected.clone(),
            connect_error: self.connect_error.clone(),
            connection_error: self.connection_error.clone(),
            packet: self.packet.clone(),
        }
    }
}

impl<C: PacketCodec> fmt::Debug for Subscribers<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("connected", &self.connected.len())
            .field("connect_error", &self.connect_error.len())
            .field("connection_error", &self.connection_error.len())
            .field("packet", &self.packet.len())
            .finish()
    }
}

/// Live subscriber lists of one connection.
///
/// Lists are snapshotted before dispatch so a subscriber may register
/// further subscribers without deadlocking.
pub(super) struct EventHub<C: PacketCodec> {
    connected: RwLock<Vec<ConnectedHandler<C>>>,
    connect_error: RwLock<Vec<ConnectErrorHandler<C>>>,
    connection_error: RwLock<Vec<ErrorHandler<C>>>,
    packet: RwLock<Vec<PacketHandler<C>>>,
}

fn snapshot<T: Clone>(list: &RwLock<Vec<T>>) -> Vec<T> {
    list.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn push<T>(list: &RwLock<Vec<T>>, item: T) {
    list.write().unwrap_or_else(PoisonError::into_inner).push(item);
}

/// Call every handler, isolating panics from each other and from the caller.
fn dispatch<H: ?Sized>(
    event: &'static str,
    handlers: Vec<Arc<H>>,
    call: impl Fn(&H),
) -> Vec<Panicked> {
    handlers
        .iter()
        .filter_map(|handler| {
            catch_unwind(AssertUnwindSafe(|| call(handler)))
                .err()
                .map(|payload| Panicked {
                    event,
                    message: format_panic(&*payload).to_string(),
                })
        })
        .collect()
}

impl<C: PacketCodec> EventHub<C> {
    pub fn new(subscribers: Subscribers<C>) -> Self {
        Self {
            connected: RwLock::new(subscribers.connected),
            connect_error: RwLock::new(subscribers.connect_error),
            connection_error: RwLock::new(subscribers.connection_error),
            packet: RwLock::new(subscribers.packet),
        }
    }

    pub fn add_connected(&self, handler: ConnectedHandler<C>) { push(&self.connected, handler); }

    pub fn add_connect_error(&self, handler: ConnectErrorHandler<C>) {
        push(&self.connect_error, handler);
    }

    pub fn add_connection_error(&self, handler: ErrorHandler<C>) {
        push(&self.connection_error, handler);
    }

    pub fn add_packet(&self, handler: PacketHandler<C>) { push(&self.packet, handler); }

    pub fn connected(&self, conn: &Connection<C>) -> Vec<Panicked> {
        dispatch(names::CONNECTED, snapshot(&self.connected), |h| h(conn))
    }

    pub fn connect_error(&self, error: &io::Error, conn: &Connection<C>) -> Vec<Panicked> {
        dispatch(names::CONNECT_ERROR, snapshot(&self.connect_error), |h| {
            h(error, conn);
        })
    }

    pub fn connection_error(&self, error: &ConnectionError, conn: &Connection<C>) -> Vec<Panicked> {
        dispatch(names::CONNECTION_ERROR, snapshot(&self.connection_error), |h| {
            h(error, conn);
        })
    }

    pub fn packet(&self, packet: &C::Packet, conn: &Connection<C>) -> Vec<Panicked> {
        dispatch(names::PACKET_READY, snapshot(&self.packet), |h| h(packet, conn))
    }
}

impl<C: PacketCodec> fmt::Debug for EventHub<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("connected", &snapshot(&self.connected).len())
            .field("connect_error", &snapshot(&self.connect_error).len())
            .field("connection_error", &snapshot(&self.connection_error).len())
            .field("packet", &snapshot(&self.packet).len())
            .finish()
    }
}
