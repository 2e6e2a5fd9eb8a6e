//! Packet codecs turning application values into frame payloads.
//!
//! The connection engine treats a codec as an opaque pair of functions:
//! [`PacketCodec::encode`] produces the payload bytes placed after the length
//! prefix, and [`PacketCodec::decode`] turns a fully reassembled payload back
//! into a packet. Two codecs ship with the crate:
//!
//! - [`RawCodec`] passes payload bytes through untouched.
//! - [`BincodeCodec`] encodes any [`Message`] with bincode's standard
//!   configuration.

use std::{fmt, marker::PhantomData};

use bytes::Bytes;

use crate::message::Message;

pub mod error;

pub use error::CodecError;

/// Converts packets to and from frame payloads.
pub trait PacketCodec: Send + Sync + 'static {
    /// Value delivered to packet subscribers and accepted by `send`.
    type Packet: Send + Sync + 'static;

    /// Encode `packet` into the payload bytes of one frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if the packet cannot be represented.
    fn encode(&self, packet: &Self::Packet) -> Result<Bytes, CodecError>;

    /// Decode one complete frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the payload is malformed.
    fn decode(&self, payload: Bytes) -> Result<Self::Packet, CodecError>;
}

/// Identity codec: packets are the raw payload bytes.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use framelink::codec::{PacketCodec, RawCodec};
///
/// let payload = RawCodec.encode(&Bytes::from_static(b"ping")).expect("encode");
/// assert_eq!(RawCodec.decode(payload).expect("decode"), Bytes::from_static(b"ping"));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawCodec;

impl PacketCodec for RawCodec {
    type Packet = Bytes;

    fn encode(&self, packet: &Self::Packet) -> Result<Bytes, CodecError> { Ok(packet.clone()) }

    fn decode(&self, payload: Bytes) -> Result<Self::Packet, CodecError> { Ok(payload) }
}

/// Codec for bincode [`Message`] types.
///
/// Decoding rejects payloads with trailing bytes after the message so a
/// mismatched message type is reported instead of silently truncated.
pub struct BincodeCodec<M> {
    _message: PhantomData<fn() -> M>,
}

impl<M> BincodeCodec<M> {
    /// Create a codec for message type `M`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _message: PhantomData,
        }
    }
}

impl<M> Default for BincodeCodec<M> {
    fn default() -> Self { Self::new() }
}

impl<M> Clone for BincodeCodec<M> {
    fn clone(&self) -> Self { *self }
}

impl<M> Copy for BincodeCodec<M> {}

impl<M> fmt::Debug for BincodeCodec<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BincodeCodec")
            .field("message", &std::any::type_name::<M>())
            .finish()
    }
}

impl<M> PacketCodec for BincodeCodec<M>
where
    M: Message + Send + Sync + 'static,
{
    type Packet = M;

    fn encode(&self, packet: &Self::Packet) -> Result<Bytes, CodecError> {
        packet
            .to_bytes()
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode(Box::new(e)))
    }

    fn decode(&self, payload: Bytes) -> Result<Self::Packet, CodecError> {
        let (message, consumed) =
            M::from_bytes(&payload).map_err(|e| CodecError::Decode(Box::new(e)))?;
        if consumed != payload.len() {
            return Err(CodecError::TrailingBytes {
                consumed,
                total: payload.len(),
            });
        }
        Ok(message)
    }
}
