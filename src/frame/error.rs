//! Errors raised while cutting frames out of a byte stream or datagram.
//!
//! Every variant is a protocol violation: once one is observed the byte
//! alignment of the transport can no longer be trusted.

use thiserror::Error;

/// Framing-level errors occurring during frame boundary detection.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// Frame length prefix indicates size exceeding configured maximum.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Actual frame size indicated by the length prefix.
        size: usize,
        /// Maximum allowed frame size.
        max: usize,
    },

    /// A datagram was too short to hold a length prefix.
    #[error("incomplete frame header: have {have}, need {need}")]
    IncompleteHeader {
        /// Bytes available in the datagram.
        have: usize,
        /// Bytes required for complete header.
        need: usize,
    },

    /// A datagram ended before the payload its prefix declared.
    #[error("truncated datagram: {available} of {declared} payload bytes")]
    TruncatedDatagram {
        /// Payload length declared by the prefix.
        declared: usize,
        /// Payload bytes actually carried by the datagram.
        available: usize,
    },
}
