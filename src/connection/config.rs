//! Tunables for a single connection.

use serde::{Deserialize, Serialize};

use crate::{
    byte_order::ByteOrder,
    frame::{DEFAULT_MAX_FRAME_LENGTH, LENGTH_PREFIX_SIZE, clamp_frame_length},
};

/// Default drain iteration bound per transport per call.
pub const DEFAULT_MAX_PROCESS_ITERATIONS: usize = 5;
/// Default size of one stream read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;
/// Default receive buffer for one datagram.
pub const DEFAULT_DATAGRAM_RECV_SIZE: usize = 65_535;

/// Settings shared by every connection built from one
/// [`ConnectionBuilder`](super::ConnectionBuilder).
///
/// Out-of-range values are normalised by the setters and again by the
/// getters, so a configuration loaded through `serde` is safe to use as is.
///
/// # Examples
///
/// ```
/// use framelink::connection::ConnectionConfig;
///
/// let config = ConnectionConfig::default()
///     .max_process_iterations(0)
///     .background_processing(true);
/// assert_eq!(config.process_iterations(), 1);
/// assert!(config.is_background_processing());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    max_process_iterations: usize,
    background_processing: bool,
    read_chunk_size: usize,
    max_frame_length: usize,
    nodelay: bool,
    datagram_recv_size: usize,
    host_byte_order: ByteOrder,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_process_iterations: DEFAULT_MAX_PROCESS_ITERATIONS,
            background_processing: false,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            nodelay: true,
            datagram_recv_size: DEFAULT_DATAGRAM_RECV_SIZE,
            host_byte_order: ByteOrder::native(),
        }
    }
}

impl ConnectionConfig {
    /// Bound the number of extraction steps one drain runs per transport.
    ///
    /// Zero is treated as one.
    #[must_use]
    pub fn max_process_iterations(mut self, iterations: usize) -> Self {
        self.max_process_iterations = iterations.max(1);
        self
    }

    /// Drain automatically after every read completion.
    #[must_use]
    pub fn background_processing(mut self, enabled: bool) -> Self {
        self.background_processing = enabled;
        self
    }

    /// Set the default size of one stream read.
    ///
    /// Values below the length prefix width are raised to it.
    #[must_use]
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(LENGTH_PREFIX_SIZE);
        self
    }

    /// Set the largest payload accepted from or sent to the peer.
    ///
    /// The value is clamped to
    /// [`MIN_FRAME_LENGTH`](crate::frame::MIN_FRAME_LENGTH)..=[`MAX_FRAME_LENGTH`](crate::frame::MAX_FRAME_LENGTH).
    #[must_use]
    pub fn max_frame_length(mut self, length: usize) -> Self {
        self.max_frame_length = clamp_frame_length(length);
        self
    }

    /// Enable or disable `TCP_NODELAY` on dialled and accepted TCP streams.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }

    /// Set the receive buffer used for one datagram.
    ///
    /// Datagrams longer than this are truncated by the socket.
    #[must_use]
    pub fn datagram_recv_size(mut self, size: usize) -> Self {
        self.datagram_recv_size = size.max(LENGTH_PREFIX_SIZE);
        self
    }

    /// Override the byte order the connection assumes for the local host.
    ///
    /// Only useful for exercising interoperability between hosts of
    /// different endianness on one machine; the wire order never changes.
    #[must_use]
    pub fn host_byte_order(mut self, order: ByteOrder) -> Self {
        self.host_byte_order = order;
        self
    }

    /// Effective drain iteration bound.
    #[must_use]
    pub fn process_iterations(&self) -> usize { self.max_process_iterations.max(1) }

    /// Whether new connections start in background processing mode.
    #[must_use]
    pub const fn is_background_processing(&self) -> bool { self.background_processing }

    /// Effective stream read size.
    #[must_use]
    pub fn read_chunk(&self) -> usize { self.read_chunk_size.max(LENGTH_PREFIX_SIZE) }

    /// Effective maximum frame length.
    #[must_use]
    pub fn frame_length_limit(&self) -> usize { clamp_frame_length(self.max_frame_length) }

    /// Whether `TCP_NODELAY` is applied.
    #[must_use]
    pub const fn is_nodelay(&self) -> bool { self.nodelay }

    /// Effective datagram receive buffer size.
    #[must_use]
    pub fn datagram_buffer(&self) -> usize { self.datagram_recv_size.max(LENGTH_PREFIX_SIZE) }

    /// Byte order assumed for the local host.
    #[must_use]
    pub const fn byte_order(&self) -> ByteOrder { self.host_byte_order }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::frame::{MAX_FRAME_LENGTH, MIN_FRAME_LENGTH};

    #[test]
    fn defaults_match_documented_values() {
        let config = ConnectionConfig::default();
        assert_eq!(config.process_iterations(), 5);
        assert!(!config.is_background_processing());
        assert_eq!(config.read_chunk(), 4096);
        assert_eq!(config.frame_length_limit(), 1024 * 1024);
        assert!(config.is_nodelay());
        assert_eq!(config.datagram_buffer(), 65_535);
        assert_eq!(config.byte_order(), ByteOrder::native());
    }

    #[rstest]
    #[case::below_minimum(1, MIN_FRAME_LENGTH)]
    #[case::in_range(4096, 4096)]
    #[case::above_maximum(usize::MAX, MAX_FRAME_LENGTH)]
    fn frame_length_is_clamped(#[case] requested: usize, #[case] expected: usize) {
        let config = ConnectionConfig::default().max_frame_length(requested);
        assert_eq!(config.frame_length_limit(), expected);
    }

    #[test]
    fn read_chunk_covers_a_prefix() {
        let config = ConnectionConfig::default().read_chunk_size(1);
        assert_eq!(config.read_chunk(), LENGTH_PREFIX_SIZE);
    }
}
