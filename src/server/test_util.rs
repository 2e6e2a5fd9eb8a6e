//! Test helpers shared across server modules.

use std::net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};

use rstest::fixture;

use super::Acceptor;
use crate::connection::ConnectionBuilder;

#[fixture]
/// Returns a bound [`StdTcpListener`] on a free port for use in tests.
///
/// Keeping the listener bound prevents another process from claiming the
/// port between discovery and use.
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("Failed to bind free port listener")
}

pub fn bind_acceptor(listener: StdTcpListener) -> Acceptor {
    Acceptor::bind_existing_listener(listener, ConnectionBuilder::new()).expect("Failed to bind")
}
