//! Error types for the packet codec layer.

use std::error::Error as StdError;

use thiserror::Error;

/// Failure while converting between packets and frame payloads.
///
/// Codec errors never disturb frame boundaries: the frame that failed to
/// decode has already been removed from the reassembly buffer.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Failed to serialize an outbound packet.
    #[error("failed to encode packet")]
    Encode(#[source] Box<dyn StdError + Send + Sync>),
    /// Failed to deserialize an inbound payload.
    #[error("failed to decode packet")]
    Decode(#[source] Box<dyn StdError + Send + Sync>),
    /// The payload decoded but left unread bytes behind.
    #[error("payload has trailing bytes: decoded {consumed} of {total}")]
    TrailingBytes {
        /// Bytes used by the decoded packet.
        consumed: usize,
        /// Total payload length.
        total: usize,
    },
}
