//! Engine tests over in-memory duplex streams.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use bincode::{Decode, Encode};
use bytes::Bytes;
use rstest::rstest;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex},
    sync::mpsc::{UnboundedReceiver, unbounded_channel},
    time::timeout,
};
use tracing_test::traced_test;

use super::{Connection, ConnectionBuilder, ConnectionConfig};
use crate::{
    byte_order::ByteOrder,
    codec::{BincodeCodec, CodecError, PacketCodec},
    frame::{FramingError, encode_frame},
    reassembly::{Step, TransportKind},
};

const WAIT: Duration = Duration::from_secs(2);

fn framed(payload: &[u8]) -> Vec<u8> {
    encode_frame(payload, ByteOrder::native(), 1024)
        .expect("encode frame")
        .to_vec()
}

/// Builder whose packets and errors are forwarded to channels.
fn recording<C: PacketCodec>(
    builder: ConnectionBuilder<C>,
) -> (
    ConnectionBuilder<C>,
    UnboundedReceiver<C::Packet>,
    UnboundedReceiver<String>,
)
where
    C::Packet: Clone,
{
    let (packet_tx, packets) = unbounded_channel();
    let (error_tx, errors) = unbounded_channel();
    let builder = builder
        .on_packet(move |packet, _| {
            let _ = packet_tx.send(packet.clone());
        })
        .on_connection_error(move |error, _| {
            let _ = error_tx.send(format!("{}: {error}", error.kind()));
        });
    (builder, packets, errors)
}

async fn wait_for_buffered<C: PacketCodec>(conn: &Connection<C>, len: usize) {
    timeout(WAIT, async {
        while conn.inner.stream_buffer.buffered_len() < len {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("bytes were not buffered in time");
}

async fn next<T>(rx: &mut UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("event not raised in time")
        .expect("sender dropped")
}

fn accept<C: PacketCodec>(builder: ConnectionBuilder<C>) -> (Connection<C>, DuplexStream) {
    let (local, remote) = duplex(64 * 1024);
    (builder.accept_from(local, None), remote)
}

#[tokio::test]
async fn accepted_connection_starts_connected() {
    let (conn, _peer) = accept(ConnectionBuilder::new());
    assert!(conn.is_connected());
    assert!(conn.is_server());
    assert!(!conn.is_closed());
    assert!(!conn.has_datagram());
    conn.close();
}

#[tokio::test]
async fn zero_byte_read_disconnects_once() {
    let (builder, _packets, mut errors) = recording(ConnectionBuilder::new());
    let (conn, peer) = accept(builder);

    drop(peer);

    assert_eq!(next(&mut errors).await, "peer_closed: stream closed by peer");
    assert!(!conn.is_connected());
    assert!(!conn.is_closed(), "a peer close does not close the connection");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(errors.try_recv().is_err(), "only one error is raised");
    conn.close();
}

#[tokio::test]
async fn close_is_idempotent() {
    let (builder, _packets, mut errors) = recording(ConnectionBuilder::new());
    let (conn, _peer) = accept(builder);

    conn.close();
    conn.clone().close();
    conn.close();

    assert!(conn.is_closed());
    timeout(WAIT, conn.closed())
        .await
        .expect("receive loop stopped");
    assert!(errors.try_recv().is_err(), "closing raises no events");
}

#[tokio::test]
async fn close_before_connect_completes() {
    let conn = ConnectionBuilder::new().dial("127.0.0.1:9".parse().expect("addr"));
    conn.close();
    conn.connect().await;
    assert!(conn.is_closed());
    assert!(!conn.is_connected());
}

#[rstest]
#[case::bound_above_burst(8, vec![5, 0])]
#[case::bound_equal_to_burst(5, vec![5, 0])]
#[case::bound_below_burst(2, vec![2, 2, 1, 0])]
#[tokio::test]
async fn drain_respects_the_iteration_bound(#[case] bound: usize, #[case] expected: Vec<usize>) {
    let config = ConnectionConfig::default().max_process_iterations(bound);
    let (builder, mut packets, _errors) = recording(ConnectionBuilder::new().config(config));
    let (conn, mut peer) = accept(builder);

    let mut burst = Vec::new();
    for i in 0..5_u8 {
        burst.extend(framed(&[i; 3]));
    }
    peer.write_all(&burst).await.expect("write burst");
    wait_for_buffered(&conn, burst.len()).await;

    let counts: Vec<_> = expected.iter().map(|_| conn.drain()).collect();
    assert_eq!(counts, expected);
    for i in 0..5_u8 {
        assert_eq!(next(&mut packets).await, Bytes::from(vec![i; 3]));
    }
    conn.close();
}

#[tokio::test]
async fn background_processing_delivers_every_frame() {
    let config = ConnectionConfig::default()
        .max_process_iterations(2)
        .background_processing(true);
    let (builder, mut packets, _errors) = recording(ConnectionBuilder::new().config(config));
    let (conn, mut peer) = accept(builder);
    assert!(conn.background_processing());

    let mut burst = Vec::new();
    for i in 0..7_u8 {
        burst.extend(framed(&[i]));
    }
    burst.extend(framed(b""));
    peer.write_all(&burst).await.expect("write burst");

    for i in 0..7_u8 {
        assert_eq!(next(&mut packets).await, Bytes::from(vec![i]));
    }
    assert_eq!(next(&mut packets).await, Bytes::new());
    conn.close();
}

#[tokio::test]
async fn background_processing_can_be_enabled_later() {
    let (builder, mut packets, _errors) = recording(ConnectionBuilder::new());
    let (conn, mut peer) = accept(builder);

    peer.write_all(&framed(b"early")).await.expect("write");
    wait_for_buffered(&conn, 9).await;
    conn.enable_background_processing();
    peer.write_all(&framed(b"late")).await.expect("write");

    assert_eq!(next(&mut packets).await, Bytes::from_static(b"early"));
    assert_eq!(next(&mut packets).await, Bytes::from_static(b"late"));
    conn.close();
}

#[tokio::test]
async fn frames_split_across_writes_are_reassembled() {
    let config = ConnectionConfig::default().background_processing(true);
    let (builder, mut packets, _errors) = recording(ConnectionBuilder::new().config(config));
    let (conn, mut peer) = accept(builder);

    let bytes = framed(b"fragmented payload");
    for chunk in bytes.chunks(3) {
        peer.write_all(chunk).await.expect("write chunk");
        tokio::task::yield_now().await;
    }

    assert_eq!(
        next(&mut packets).await,
        Bytes::from_static(b"fragmented payload")
    );
    conn.close();
}

#[tokio::test]
async fn panicking_subscriber_becomes_connection_error() {
    let config = ConnectionConfig::default().background_processing(true);
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let (builder, _packets, mut errors) = recording(
        ConnectionBuilder::new()
            .config(config)
            .on_packet(|_, _| panic!("subscriber exploded"))
            .on_packet(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
    );
    let (conn, mut peer) = accept(builder);

    peer.write_all(&framed(b"boom")).await.expect("write");

    assert_eq!(
        next(&mut errors).await,
        "subscriber_panicked: packet_ready subscriber panicked: subscriber exploded"
    );
    assert!(!conn.is_connected());
    assert_eq!(
        delivered.load(Ordering::SeqCst),
        1,
        "other subscribers still run"
    );
    conn.close();
}

#[tokio::test]
async fn panicking_error_subscriber_is_contained() {
    let (builder, _packets, mut errors) = recording(
        ConnectionBuilder::new().on_connection_error(|_, _| panic!("error handler exploded")),
    );
    let (conn, peer) = accept(builder);

    drop(peer);

    assert!(next(&mut errors).await.starts_with("peer_closed"));
    assert!(!conn.is_connected());
    conn.close();
}

#[tokio::test]
async fn oversized_prefix_is_a_framing_error() {
    let config = ConnectionConfig::default()
        .max_frame_length(64)
        .background_processing(true);
    let (builder, mut packets, mut errors) = recording(ConnectionBuilder::new().config(config));
    let (conn, mut peer) = accept(builder);

    peer.write_all(&1000_u32.to_le_bytes()).await.expect("write");
    peer.write_all(&[0; 16]).await.expect("write");

    assert_eq!(
        next(&mut errors).await,
        format!(
            "framing: stream framing error: {}",
            FramingError::OversizedFrame { size: 1000, max: 64 }
        )
    );
    assert!(!conn.is_connected());
    assert!(packets.try_recv().is_err());
    conn.close();
}

#[derive(Clone, Debug, PartialEq, Encode, Decode)]
struct Move {
    entity: u32,
    x: f32,
    y: f32,
}

#[tokio::test]
async fn decode_failure_is_a_codec_error() {
    let config = ConnectionConfig::default().background_processing(true);
    let (builder, _packets, mut errors) = recording(
        ConnectionBuilder::with_codec(BincodeCodec::<Move>::new()).config(config),
    );
    let (local, mut peer) = duplex(1024);
    let conn = builder.accept_from(local, None);

    peer.write_all(&framed(&[0xff])).await.expect("write");

    assert!(next(&mut errors).await.starts_with("codec:"));
    conn.close();
}

#[tokio::test]
async fn send_writes_a_length_prefixed_frame() {
    let (conn, mut peer) = accept(ConnectionBuilder::new());

    conn.send(&Bytes::from_static(b"hello"), TransportKind::Stream)
        .await;

    let mut buf = [0_u8; 9];
    peer.read_exact(&mut buf).await.expect("read frame");
    assert_eq!(buf, [5, 0, 0, 0, b'h', b'e', b'l', b'l', b'o']);
    conn.close();
}

#[tokio::test]
async fn send_after_close_is_a_no_op() {
    let (builder, _packets, mut errors) = recording(ConnectionBuilder::new());
    let (conn, mut peer) = accept(builder);

    conn.close();
    conn.send(&Bytes::from_static(b"late"), TransportKind::Stream)
        .await;

    let mut buf = [0_u8; 1];
    let read = timeout(WAIT, peer.read(&mut buf))
        .await
        .expect("peer sees the close");
    assert_eq!(read.expect("read"), 0, "nothing was written");
    assert!(errors.try_recv().is_err());
}

#[tokio::test]
async fn oversized_send_is_reported() {
    let config = ConnectionConfig::default().max_frame_length(64);
    let (builder, _packets, mut errors) = recording(ConnectionBuilder::new().config(config));
    let (conn, _peer) = accept(builder);

    conn.send(&Bytes::from(vec![0; 65]), TransportKind::Stream)
        .await;

    assert_eq!(
        next(&mut errors).await,
        "oversized_payload: payload of 65 bytes exceeds maximum frame length 64"
    );
    assert!(!conn.is_connected());
    conn.close();
}

#[tokio::test]
async fn datagram_send_without_endpoint_is_dropped() {
    let (builder, _packets, mut errors) = recording(ConnectionBuilder::new());
    let (conn, _peer) = accept(builder);

    conn.send(&Bytes::from_static(b"udp"), TransportKind::Datagram)
        .await;

    assert!(conn.is_connected());
    assert!(errors.try_recv().is_err());
    conn.close();
}

#[tokio::test]
async fn reentrant_drain_is_skipped() {
    let nested = Arc::new(AtomicUsize::new(usize::MAX));
    let seen = Arc::clone(&nested);
    let (builder, mut packets, _errors) =
        recording(ConnectionBuilder::new().on_packet(move |_, conn: &Connection| {
            seen.store(conn.drain(), Ordering::SeqCst);
        }));
    let (conn, mut peer) = accept(builder);

    let mut bytes = framed(b"a");
    bytes.extend(framed(b"b"));
    peer.write_all(&bytes).await.expect("write");
    wait_for_buffered(&conn, bytes.len()).await;

    assert_eq!(conn.drain(), 2);
    assert_eq!(nested.load(Ordering::SeqCst), 0);
    assert_eq!(next(&mut packets).await, Bytes::from_static(b"a"));
    assert_eq!(next(&mut packets).await, Bytes::from_static(b"b"));
    conn.close();
}

#[rstest]
#[case::native(ByteOrder::native())]
#[case::reversed(ByteOrder::native().reversed())]
#[tokio::test]
async fn hosts_with_opposite_byte_orders_interoperate(#[case] left_order: ByteOrder) {
    let config = ConnectionConfig::default().background_processing(true);
    let (left_builder, mut left_packets, _le) = recording(
        ConnectionBuilder::new().config(config.host_byte_order(left_order)),
    );
    let (right_builder, mut right_packets, _re) = recording(
        ConnectionBuilder::new().config(config.host_byte_order(left_order.reversed())),
    );
    let (a, b) = duplex(1024);
    let left = left_builder.establish(a, None);
    let right = right_builder.accept_from(b, None);

    let payload = Bytes::from((0..=255_u8).collect::<Vec<_>>());
    left.send(&payload, TransportKind::Stream).await;
    right.send(&payload, TransportKind::Stream).await;

    assert_eq!(next(&mut right_packets).await, payload);
    assert_eq!(next(&mut left_packets).await, payload);
    left.close();
    right.close();
}

#[tokio::test]
async fn bincode_packets_round_trip() {
    let config = ConnectionConfig::default().background_processing(true);
    let (server_builder, mut packets, _errors) = recording(
        ConnectionBuilder::with_codec(BincodeCodec::<Move>::new()).config(config),
    );
    let (a, b) = duplex(1024);
    let client = ConnectionBuilder::with_codec(BincodeCodec::<Move>::new()).establish(a, None);
    let server = server_builder.accept_from(b, None);

    let sent = Move {
        entity: 7,
        x: 1.5,
        y: -2.0,
    };
    client.send(&sent, TransportKind::Stream).await;

    assert_eq!(next(&mut packets).await, sent);
    client.close();
    server.close();
}

#[tokio::test]
async fn failed_connect_raises_connect_error() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr")
    };
    let (tx, mut rx) = unbounded_channel();
    let conn = ConnectionBuilder::new()
        .on_connect_error(move |error, _| {
            let _ = tx.send(error.kind());
        })
        .dial(addr);

    conn.connect().await;

    assert_eq!(next(&mut rx).await, std::io::ErrorKind::ConnectionRefused);
    assert!(!conn.is_connected());
    assert!(!conn.is_closed(), "a failed connect leaves the connection open");
    conn.close();
}

#[tokio::test]
async fn dialled_connection_connects_and_receives() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (connected_tx, mut connected) = unbounded_channel();
    let config = ConnectionConfig::default().background_processing(true);
    let (builder, mut packets, _errors) = recording(
        ConnectionBuilder::new()
            .config(config)
            .on_connected(move |conn| {
                let _ = connected_tx.send(conn.peer_addr());
            }),
    );
    let conn = builder.dial(addr);
    assert!(!conn.is_connected());

    let (mut accepted, ()) = tokio::join!(
        async { listener.accept().await.expect("accept").0 },
        conn.connect()
    );

    assert_eq!(next(&mut connected).await, Some(addr));
    assert!(conn.is_connected());
    assert!(!conn.is_server());

    accepted
        .write_all(&framed(b"welcome"))
        .await
        .expect("write");
    assert_eq!(next(&mut packets).await, Bytes::from_static(b"welcome"));
    conn.close();
}

#[tokio::test]
#[traced_test]
async fn lifecycle_is_traced() {
    let (builder, _packets, mut errors) = recording(ConnectionBuilder::new());
    let (conn, peer) = accept(builder);
    drop(peer);
    assert_eq!(next(&mut errors).await, "peer_closed: stream closed by peer");
    conn.close();

    assert!(logs_contain("connection established"));
    assert!(logs_contain("peer disconnected"));
    assert!(logs_contain("connection closed"));
}

#[tokio::test]
#[traced_test]
async fn framing_errors_are_traced_as_warnings() {
    let (builder, _packets, mut errors) = recording(ConnectionBuilder::new().config(
        ConnectionConfig::default().background_processing(true),
    ));
    let (_conn, mut peer) = accept(builder);
    peer.write_all(&u32::MAX.to_le_bytes()).await.expect("write prefix");
    assert!(next(&mut errors).await.starts_with("framing:"));

    assert!(logs_contain("connection error"));
    assert!(logs_contain("framing"));
}

#[tokio::test]
async fn connection_without_handles_keeps_receiving() {
    let (builder, mut packets, _errors) = recording(
        ConnectionBuilder::new().config(ConnectionConfig::default().background_processing(true)),
    );
    let (conn, mut peer) = accept(builder);
    drop(conn);

    peer.write_all(&framed(b"still here")).await.expect("write frame");
    assert_eq!(next(&mut packets).await, Bytes::from_static(b"still here"));

    peer.write_all(&framed(b"and here")).await.expect("write frame");
    assert_eq!(next(&mut packets).await, Bytes::from_static(b"and here"));
}

#[tokio::test]
async fn background_drain_resumes_after_a_held_gate() {
    let config = ConnectionConfig::default()
        .background_processing(true)
        .max_process_iterations(1);
    let (builder, mut packets, _errors) = recording(ConnectionBuilder::new().config(config));
    let (conn, mut peer) = accept(builder);

    let gate = conn
        .inner
        .stream_buffer
        .try_begin_drain()
        .expect("gate is free");
    let burst: Vec<u8> = [b"a", b"b", b"c"].iter().flat_map(|p| framed(*p)).collect();
    peer.write_all(&burst).await.expect("write burst");
    wait_for_buffered(&conn, burst.len()).await;

    assert_eq!(gate.step().expect("step"), Step::Frame(Bytes::from_static(b"a")));
    drop(gate);

    assert_eq!(next(&mut packets).await, Bytes::from_static(b"b"));
    assert_eq!(next(&mut packets).await, Bytes::from_static(b"c"));
    conn.close();
}

/// Passes payloads through, but panics on `boom`.
#[derive(Debug, Default)]
struct FragileCodec;

impl PacketCodec for FragileCodec {
    type Packet = Bytes;

    fn encode(&self, packet: &Bytes) -> Result<Bytes, CodecError> { Ok(packet.clone()) }

    fn decode(&self, payload: Bytes) -> Result<Bytes, CodecError> {
        assert_ne!(&payload[..], b"boom", "decoder exploded");
        Ok(payload)
    }
}

#[tokio::test]
async fn panicking_codec_is_contained() {
    let (builder, _packets, mut errors) = recording(ConnectionBuilder::with_codec(FragileCodec));
    let (conn, mut peer) = accept(builder);
    peer.write_all(&framed(b"boom")).await.expect("write frame");
    wait_for_buffered(&conn, framed(b"boom").len()).await;

    assert_eq!(conn.drain(), 1);

    let error = next(&mut errors).await;
    assert!(
        error.starts_with("codec: stream codec panicked while decoding:"),
        "{error}"
    );
    assert!(error.contains("decoder exploded"), "{error}");
    assert!(!conn.is_connected());
    assert!(!conn.is_closed());
    conn.close();
}
