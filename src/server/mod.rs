//! TCP acceptor producing [`Connection`]s.
//!
//! The acceptor is the server-side entry point: it listens on a socket,
//! wraps each accepted stream in a connection built from a template
//! [`ConnectionBuilder`], and raises a new connection event. Subscribers
//! registered on the template see packets from the first read onwards, so
//! packet handling belongs there rather than in a new connection subscriber.

use std::{fmt, future::Future, net::SocketAddr, sync::Arc};

use log::info;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::{
    codec::{PacketCodec, RawCodec},
    connection::{Connection, ConnectionBuilder},
};

mod accept;
mod backoff;
mod error;

#[cfg(test)]
mod test_util;

pub use accept::{AcceptErrorHandler, NewConnectionHandler};
use accept::{AcceptHooks, accept_loop};
pub use backoff::BackoffConfig;
pub use error::AcceptorError;

/// Settings for an [`Acceptor`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AcceptorConfig {
    backoff: BackoffConfig,
}

impl AcceptorConfig {
    /// Configure the back-off applied after accept failures.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff.normalized();
        self
    }

    /// The back-off applied after accept failures.
    #[must_use]
    pub const fn backoff_config(&self) -> BackoffConfig { self.backoff }
}

/// Listens for TCP connections and turns them into [`Connection`]s.
///
/// Accepted connections are stream-only; any datagram endpoint on the
/// template builder is ignored.
///
/// # Examples
///
/// ```no_run
/// use framelink::{connection::ConnectionBuilder, server::Acceptor};
///
/// # async fn demo() -> Result<(), framelink::server::AcceptorError> {
/// let acceptor = Acceptor::bind(
///     "127.0.0.1:7777".parse().expect("valid address"),
///     ConnectionBuilder::new(),
/// )
/// .await?;
/// acceptor.subscribe_new_connection(|conn| println!("peer {:?}", conn.peer_addr()));
/// acceptor.run().await;
/// # Ok(())
/// # }
/// ```
pub struct Acceptor<C: PacketCodec = RawCodec> {
    listener: Arc<TcpListener>,
    builder: ConnectionBuilder<C>,
    config: AcceptorConfig,
    hooks: Arc<AcceptHooks<C>>,
}

impl<C: PacketCodec> fmt::Debug for Acceptor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (new_connection, accept_error) = self.hooks.handler_counts();
        f.debug_struct("Acceptor")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("builder", &self.builder)
            .field("config", &self.config)
            .field("new_connection_subscribers", &new_connection)
            .field("accept_error_subscribers", &accept_error)
            .finish()
    }
}

impl<C: PacketCodec> Acceptor<C> {
    /// Bind a listener on `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`AcceptorError::Bind`] if the socket cannot be bound.
    pub async fn bind(addr: SocketAddr, builder: ConnectionBuilder<C>) -> Result<Self, AcceptorError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| AcceptorError::Bind {
                addr: Some(addr),
                source,
            })?;
        Ok(Self::from_tokio(listener, builder))
    }

    /// Use an already bound standard library listener.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`AcceptorError::Bind`] if the listener cannot be switched to
    /// non-blocking mode or registered with the runtime.
    pub fn bind_existing_listener(
        listener: std::net::TcpListener,
        builder: ConnectionBuilder<C>,
    ) -> Result<Self, AcceptorError> {
        let addr = listener.local_addr().ok();
        let listener = listener
            .set_nonblocking(true)
            .and_then(|()| TcpListener::from_std(listener))
            .map_err(|source| AcceptorError::Bind { addr, source })?;
        Ok(Self::from_tokio(listener, builder))
    }

    fn from_tokio(listener: TcpListener, builder: ConnectionBuilder<C>) -> Self {
        Self {
            listener: Arc::new(listener),
            builder: builder.without_datagram(),
            config: AcceptorConfig::default(),
            hooks: Arc::new(AcceptHooks::default()),
        }
    }

    /// Replace the acceptor settings.
    #[must_use]
    pub fn config(mut self, config: AcceptorConfig) -> Self {
        self.config = config;
        self
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns the error reported by the socket.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> { self.listener.local_addr() }

    /// Subscribe to newly accepted connections.
    pub fn subscribe_new_connection<F>(&self, f: F)
    where
        F: Fn(&Connection<C>) + Send + Sync + 'static,
    {
        self.hooks.add_new_connection(Arc::new(f));
    }

    /// Subscribe to accept failures.
    pub fn subscribe_accept_error<F>(&self, f: F)
    where
        F: Fn(&AcceptorError) + Send + Sync + 'static,
    {
        self.hooks.add_accept_error(Arc::new(f));
    }

    /// Accept connections until `shutdown` completes.
    ///
    /// Connections already accepted are not closed; their owners close them.
    pub async fn run_with_shutdown<F>(&self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let token = CancellationToken::new();
        let signal = {
            let token = token.clone();
            async move {
                shutdown.await;
                token.cancel();
            }
        };
        if let Ok(addr) = self.listener.local_addr() {
            info!("accepting connections: local_addr={addr}");
        }
        tokio::join!(
            accept_loop(
                Arc::clone(&self.listener),
                self.builder.clone(),
                Arc::clone(&self.hooks),
                token,
                self.config.backoff,
            ),
            signal,
        );
    }

    /// Accept connections until Ctrl-C is received.
    pub async fn run(&self) {
        self.run_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    }
}
