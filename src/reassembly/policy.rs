//! Transport kinds and the framing policy each one implies.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The transport a frame travels over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Ordered, reliable byte stream (TCP).
    Stream,
    /// Unordered, unreliable, boundary-preserving datagrams (UDP).
    Datagram,
}

impl TransportKind {
    /// Short lowercase name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TransportKind::Stream => "stream",
            TransportKind::Datagram => "datagram",
        }
    }

    /// The framing policy for this transport.
    #[must_use]
    pub const fn policy(self) -> FramingPolicy {
        match self {
            TransportKind::Stream => FramingPolicy::STREAM,
            TransportKind::Datagram => FramingPolicy::DATAGRAM,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// What happens to bytes that follow a completed frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Remainder {
    /// Keep them; they start the next frame.
    Keep,
    /// Drop them along with the datagram that carried them.
    Discard,
}

/// What happens when fewer bytes are buffered than the next step needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shortfall {
    /// Leave the bytes in place until the next read arrives.
    Wait,
    /// Treat the unit as truncated; it can never be completed.
    Reject,
}

/// Parameters distinguishing stream framing from datagram framing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramingPolicy {
    remainder: Remainder,
    shortfall: Shortfall,
}

impl FramingPolicy {
    /// Policy for a byte stream: remainders carry over and shortfalls wait.
    pub const STREAM: FramingPolicy = FramingPolicy {
        remainder: Remainder::Keep,
        shortfall: Shortfall::Wait,
    };

    /// Policy for datagrams: one datagram is one frame, nothing carries over.
    pub const DATAGRAM: FramingPolicy = FramingPolicy {
        remainder: Remainder::Discard,
        shortfall: Shortfall::Reject,
    };

    /// Handling of bytes after a completed frame.
    #[must_use]
    pub const fn remainder(self) -> Remainder { self.remainder }

    /// Handling of a buffer too short for the next step.
    #[must_use]
    pub const fn shortfall(self) -> Shortfall { self.shortfall }

    /// Whether each buffered unit is an independent datagram.
    #[must_use]
    pub const fn preserves_boundaries(self) -> bool { matches!(self.remainder, Remainder::Discard) }

    /// Whether reads may be sized to the bytes still missing from a frame.
    ///
    /// Only a stream can be read partially; a datagram read always takes the
    /// whole datagram.
    #[must_use]
    pub const fn allows_sized_reads(self) -> bool { matches!(self.shortfall, Shortfall::Wait) }
}
