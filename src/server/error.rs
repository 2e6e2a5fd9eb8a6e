//! Errors raised by [`Acceptor`](super::Acceptor) operations.

use std::{io, net::SocketAddr};

use thiserror::Error;

/// Errors that may occur while binding or running an acceptor.
#[derive(Debug, Error)]
pub enum AcceptorError {
    /// Binding the listening socket failed.
    #[error("failed to bind {addr:?}: {source}")]
    Bind {
        /// Address requested, when known.
        addr: Option<SocketAddr>,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Accepting a connection failed.
    #[error("accept error: {0}")]
    Accept(#[from] io::Error),
}
