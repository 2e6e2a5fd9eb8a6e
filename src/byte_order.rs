//! Helpers for the canonical wire byte order.
//!
//! Length prefixes always travel little-endian, whatever the host. The
//! [`ByteOrder`] value describes how a host lays out integers in memory so the
//! conversion to and from the wire order stays explicit at every call site,
//! and so both directions can be exercised on a single machine.

use serde::{Deserialize, Serialize};

/// Integer layout of a host, or of the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Least significant byte first. This is the wire order.
    Little,
    /// Most significant byte first.
    Big,
}

impl ByteOrder {
    /// The order used on the wire for every length prefix.
    pub const WIRE: ByteOrder = ByteOrder::Little;

    /// The native order of the machine running this code.
    ///
    /// # Examples
    ///
    /// ```
    /// use framelink::byte_order::ByteOrder;
    ///
    /// let native = ByteOrder::native();
    /// assert_eq!(native.is_wire_order(), cfg!(target_endian = "little"));
    /// ```
    #[must_use]
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    /// The opposite order.
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            ByteOrder::Little => ByteOrder::Big,
            ByteOrder::Big => ByteOrder::Little,
        }
    }

    /// Returns `true` when this order matches [`ByteOrder::WIRE`].
    #[must_use]
    pub const fn is_wire_order(self) -> bool { matches!(self, ByteOrder::Little) }

    /// Lay out `value` the way a host with this order stores it in memory.
    #[must_use]
    pub const fn host_bytes(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        }
    }

    /// Interpret host-ordered bytes as a `u32`.
    #[must_use]
    pub const fn from_host_bytes(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        }
    }

    /// Convert host-ordered bytes into wire order.
    ///
    /// # Examples
    ///
    /// ```
    /// use framelink::byte_order::ByteOrder;
    ///
    /// let host = ByteOrder::Big;
    /// let wire = host.to_wire(host.host_bytes(0x0102_0304));
    /// assert_eq!(wire, [0x04, 0x03, 0x02, 0x01]);
    /// ```
    #[must_use]
    pub const fn to_wire(self, host: [u8; 4]) -> [u8; 4] {
        match self {
            ByteOrder::Little => host,
            ByteOrder::Big => reverse(host),
        }
    }

    /// Convert wire-ordered bytes into this host's order.
    #[must_use]
    pub const fn from_wire(self, wire: [u8; 4]) -> [u8; 4] {
        // Byte reversal is its own inverse.
        self.to_wire(wire)
    }
}

impl Default for ByteOrder {
    fn default() -> Self { ByteOrder::native() }
}

const fn reverse(bytes: [u8; 4]) -> [u8; 4] { [bytes[3], bytes[2], bytes[1], bytes[0]] }

/// Serialise a `u32` length prefix in wire order.
///
/// # Examples
///
/// ```
/// use framelink::byte_order::write_wire_u32;
///
/// assert_eq!(write_wire_u32(0x1234_5678), [0x78, 0x56, 0x34, 0x12]);
/// ```
#[must_use]
pub const fn write_wire_u32(value: u32) -> [u8; 4] { value.to_le_bytes() }

/// Parse a wire-order `u32` length prefix.
///
/// # Examples
///
/// ```
/// use framelink::byte_order::read_wire_u32;
///
/// assert_eq!(read_wire_u32([0x78, 0x56, 0x34, 0x12]), 0x1234_5678);
/// ```
#[must_use]
pub const fn read_wire_u32(bytes: [u8; 4]) -> u32 { u32::from_le_bytes(bytes) }
