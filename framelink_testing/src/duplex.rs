//! Connections over in-memory duplex streams.

use framelink::{
    codec::PacketCodec,
    connection::{Connection, ConnectionBuilder},
};
use tokio::io::{DuplexStream, duplex};

/// Buffer size of each direction of the in-memory pipe.
pub const DUPLEX_CAPACITY: usize = 64 * 1024;

/// Accept a connection whose peer is a raw duplex stream.
///
/// Write frames into the returned stream to feed the connection and read
/// from it to observe what the connection sends. Must be called within a
/// Tokio runtime.
pub fn accept_duplex<C: PacketCodec>(builder: ConnectionBuilder<C>) -> (Connection<C>, DuplexStream) {
    let (local, remote) = duplex(DUPLEX_CAPACITY);
    (builder.accept_from(local, None), remote)
}

/// Wire two connections to each other: `(server, client)`.
///
/// Must be called within a Tokio runtime.
pub fn connected_pair<C: PacketCodec>(
    server: ConnectionBuilder<C>,
    client: ConnectionBuilder<C>,
) -> (Connection<C>, Connection<C>) {
    let (a, b) = duplex(DUPLEX_CAPACITY);
    (server.accept_from(a, None), client.establish(b, None))
}
