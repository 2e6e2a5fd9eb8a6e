//! Wire format for a single frame.
//!
//! Every frame is a 4-byte unsigned length prefix in wire order (see
//! [`crate::byte_order`]) followed by exactly that many payload bytes. The
//! payload is opaque at this layer; [`crate::codec`] gives it meaning.

use bytes::{BufMut, Bytes, BytesMut};

use crate::byte_order::ByteOrder;

pub mod error;

pub use error::FramingError;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Minimum configurable maximum frame length in bytes.
///
/// Frame length limits are clamped to at least this value.
pub const MIN_FRAME_LENGTH: usize = 64;

/// Maximum configurable frame length in bytes (16 MiB).
///
/// Frame length limits are clamped to at most this value so a corrupt or
/// hostile prefix can never request an unbounded allocation.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Frame length limit used when none is configured (1 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024 * 1024;

pub(crate) fn clamp_frame_length(value: usize) -> usize {
    value.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH)
}

/// Build the length prefix for a payload of `len` bytes.
///
/// `host` is the byte order of the machine producing the prefix; the returned
/// bytes are always in wire order.
///
/// # Errors
///
/// Returns [`FramingError::OversizedFrame`] if `len` does not fit the 4-byte
/// prefix.
pub fn length_prefix(len: usize, host: ByteOrder) -> Result<[u8; LENGTH_PREFIX_SIZE], FramingError> {
    let value = u32::try_from(len).map_err(|_| FramingError::OversizedFrame {
        size: len,
        max: u32::MAX as usize,
    })?;
    Ok(host.to_wire(host.host_bytes(value)))
}

/// Decode a wire-order length prefix on a host with byte order `host`.
///
/// # Examples
///
/// ```
/// use framelink::{byte_order::ByteOrder, frame::read_length_prefix};
///
/// assert_eq!(read_length_prefix([5, 0, 0, 0], ByteOrder::Big), 5);
/// assert_eq!(read_length_prefix([5, 0, 0, 0], ByteOrder::Little), 5);
/// ```
#[must_use]
pub fn read_length_prefix(wire: [u8; LENGTH_PREFIX_SIZE], host: ByteOrder) -> usize {
    host.from_host_bytes(host.from_wire(wire)) as usize
}

/// Prepend the length prefix to `payload`.
///
/// # Errors
///
/// Returns [`FramingError::OversizedFrame`] if the payload is longer than
/// `max_frame_length`.
///
/// # Examples
///
/// ```
/// use framelink::{byte_order::ByteOrder, frame::encode_frame};
///
/// let frame = encode_frame(b"hi", ByteOrder::native(), 1024).expect("frame fits");
/// assert_eq!(&frame[..], &[2, 0, 0, 0, b'h', b'i']);
/// ```
pub fn encode_frame(
    payload: &[u8],
    host: ByteOrder,
    max_frame_length: usize,
) -> Result<Bytes, FramingError> {
    if payload.len() > max_frame_length {
        return Err(FramingError::OversizedFrame {
            size: payload.len(),
            max: max_frame_length,
        });
    }
    let prefix = length_prefix(payload.len(), host)?;
    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.put_slice(&prefix);
    frame.put_slice(payload);
    Ok(frame.freeze())
}
