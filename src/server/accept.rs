//! The accept loop.

use std::{
    io,
    net::SocketAddr,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use log::{error, info, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::sleep,
};
use tokio_util::sync::CancellationToken;

use super::{AcceptorError, BackoffConfig};
use crate::{
    codec::PacketCodec,
    connection::{Connection, ConnectionBuilder},
    panic::format_panic,
};

/// Source of incoming connections consumed by the accept loop.
///
/// Implementations must be cancellation-safe: dropping a pending `accept()`
/// future must not leak resources.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub(crate) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

/// Subscriber for newly accepted connections.
pub type NewConnectionHandler<C> = Arc<dyn Fn(&Connection<C>) + Send + Sync>;
/// Subscriber for accept failures.
pub type AcceptErrorHandler = Arc<dyn Fn(&AcceptorError) + Send + Sync>;

/// Subscribers of one acceptor.
pub(super) struct AcceptHooks<C: PacketCodec> {
    new_connection: RwLock<Vec<NewConnectionHandler<C>>>,
    accept_error: RwLock<Vec<AcceptErrorHandler>>,
}

impl<C: PacketCodec> Default for AcceptHooks<C> {
    fn default() -> Self {
        Self {
            new_connection: RwLock::new(Vec::new()),
            accept_error: RwLock::new(Vec::new()),
        }
    }
}

impl<C: PacketCodec> AcceptHooks<C> {
    pub fn add_new_connection(&self, handler: NewConnectionHandler<C>) {
        self.new_connection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    pub fn add_accept_error(&self, handler: AcceptErrorHandler) {
        self.accept_error
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    pub fn handler_counts(&self) -> (usize, usize) {
        (
            self.new_connection
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            self.accept_error
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        )
    }

    fn new_connection(&self, conn: &Connection<C>) {
        let handlers = self
            .new_connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in handlers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(conn))) {
                let peer_addr = conn.peer_addr();
                error!(
                    "new connection subscriber panicked: panic={}, peer_addr={peer_addr:?}",
                    format_panic(&*panic)
                );
            }
        }
    }

    fn accept_error(&self, err: &AcceptorError) {
        let handlers = self
            .accept_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in handlers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(err))) {
                error!(
                    "accept error subscriber panicked: panic={}",
                    format_panic(&*panic)
                );
            }
        }
    }
}

/// Accept connections until `shutdown` is cancelled.
///
/// Each accepted stream becomes a [`Connection`] built from a clone of
/// `builder`, with its receive loop already running, and is handed to the
/// new connection subscribers. Accept failures are reported to the accept
/// error subscribers and retried after an exponential back-off.
pub(super) async fn accept_loop<C, L>(
    listener: Arc<L>,
    builder: ConnectionBuilder<C>,
    hooks: Arc<AcceptHooks<C>>,
    shutdown: CancellationToken,
    backoff: BackoffConfig,
) where
    C: PacketCodec,
    L: AcceptListener + ?Sized,
{
    let backoff = backoff.normalized();
    let mut delay = backoff.initial_delay;
    loop {
        let accepted = select! {
            biased;

            () = shutdown.cancelled() => break,
            res = listener.accept() => res,
        };
        match accepted {
            Ok((stream, addr)) => {
                info!("accepted connection: peer_addr={addr}");
                let conn = builder.clone().accept_tcp(stream);
                hooks.new_connection(&conn);
                delay = backoff.initial_delay;
            }
            Err(e) => {
                let local_addr = listener.local_addr().ok();
                warn!("accept error: error={e:?}, local_addr={local_addr:?}");
                hooks.accept_error(&AcceptorError::Accept(e));
                select! {
                    biased;

                    () = shutdown.cancelled() => break,
                    () = sleep(delay) => {}
                }
                delay = backoff.next_delay(delay);
            }
        }
    }
    info!("accept loop stopped");
}
