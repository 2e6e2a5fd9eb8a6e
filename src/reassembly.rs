//! Inbound frame reassembly.
//!
//! Bytes read from a transport are appended to a [`ReassemblyBuffer`], and a
//! pull-style state machine cuts complete length-prefixed frames out of them
//! one [`step`](ReassemblyBuffer::step) at a time. The same state machine
//! serves both transports; a [`FramingPolicy`] captures the two places where
//! a byte stream and a datagram socket differ:
//!
//! - whether bytes left over after a frame are kept for the next frame (stream) or discarded with
//!   the datagram that carried them (datagram);
//! - whether a shortfall means "wait for more bytes" (stream) or "this datagram is truncated"
//!   (datagram).
//!
//! [`SharedReassembly`] wraps a buffer for use from both the read-completion
//! path and the drain path of a connection.

mod buffer;
mod policy;
mod shared;

pub use buffer::{ReassemblyBuffer, Step};
pub use policy::{FramingPolicy, Remainder, Shortfall, TransportKind};
pub use shared::{DrainGuard, SharedReassembly};
