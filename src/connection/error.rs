//! Errors reported through the connection error event.

use std::io;

use thiserror::Error;

use crate::{codec::CodecError, frame::FramingError, reassembly::TransportKind};

/// Faults raised by a [`Connection`](super::Connection).
///
/// None of these escape a public method. Each one is delivered to the
/// connection error subscribers and leaves the connection disconnected.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Reading from or writing to a transport failed.
    #[error("{transport} i/o error: {source}")]
    Io {
        /// Transport the failing operation ran on.
        transport: TransportKind,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// A read completed with zero bytes.
    #[error("{0} closed by peer")]
    PeerClosed(TransportKind),
    /// Buffered input violated the wire format.
    #[error("{transport} framing error: {source}")]
    Framing {
        /// Transport whose buffer was poisoned.
        transport: TransportKind,
        /// What was wrong with the bytes.
        #[source]
        source: FramingError,
    },
    /// A packet could not be encoded or a payload could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// The codec panicked while decoding an inbound payload.
    #[error("{transport} codec panicked while decoding: {message}")]
    CodecPanicked {
        /// Transport the payload arrived on.
        transport: TransportKind,
        /// Formatted panic payload.
        message: String,
    },
    /// A subscriber panicked while handling an event.
    #[error("{event} subscriber panicked: {message}")]
    SubscriberPanicked {
        /// Name of the event being dispatched.
        event: &'static str,
        /// Formatted panic payload.
        message: String,
    },
    /// An outbound payload exceeded the configured frame length.
    #[error("payload of {size} bytes exceeds maximum frame length {max}")]
    OversizedPayload {
        /// Encoded payload size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },
}

impl ConnectionError {
    /// Short label used for the `kind` metric label and in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::PeerClosed(_) => "peer_closed",
            Self::Framing { .. } => "framing",
            Self::Codec(_) | Self::CodecPanicked { .. } => "codec",
            Self::SubscriberPanicked { .. } => "subscriber_panicked",
            Self::OversizedPayload { .. } => "oversized_payload",
        }
    }

    /// Whether this error is the peer closing its end of the transport.
    #[must_use]
    pub const fn is_peer_closed(&self) -> bool { matches!(self, Self::PeerClosed(_)) }
}
