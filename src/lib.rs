#![doc(html_root_url = "https://docs.rs/framelink/latest")]
//! Public API for the `framelink` library.
//!
//! `framelink` moves discrete packets over a TCP stream and, optionally, a
//! UDP socket. Every packet travels as one frame: a 4-byte little-endian
//! length prefix followed by the payload. A [`Connection`] reassembles frames
//! from partial reads and raises one event per packet; an [`Acceptor`] turns
//! incoming TCP streams into connections.

pub mod byte_order;
pub mod codec;
pub mod connection;
pub mod frame;
pub mod message;
pub mod metrics;
pub mod panic;
pub mod reassembly;
pub mod server;

pub use codec::{BincodeCodec, CodecError, PacketCodec, RawCodec};
pub use connection::{
    Connection,
    ConnectionBuilder,
    ConnectionConfig,
    ConnectionError,
    DatagramTransport,
    active_connection_count,
};
pub use frame::FramingError;
pub use message::Message;
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED};
pub use reassembly::TransportKind;
pub use server::{Acceptor, AcceptorConfig, AcceptorError, BackoffConfig};
