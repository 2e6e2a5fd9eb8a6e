#![cfg(feature = "metrics")]
//! Metrics and connection accounting.

use bytes::Bytes;
use framelink::{
    CONNECTIONS_ACTIVE,
    ConnectionBuilder,
    ConnectionConfig,
    ERRORS_TOTAL,
    FRAMES_PROCESSED,
    TransportKind,
    active_connection_count,
};
use framelink_testing::{
    EventRecorder,
    accept_duplex,
    counter_value,
    debugging_recorder_setup,
    frames,
    gauge_value,
    snapshot,
};
use serial_test::serial;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime")
}

fn background() -> ConnectionConfig { ConnectionConfig::default().background_processing(true) }

#[test]
#[serial]
fn frames_and_errors_are_counted() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        runtime().block_on(async {
            let events = EventRecorder::new();
            let (conn, mut peer) = accept_duplex(events.attach(ConnectionBuilder::new().config(background())));

            peer.write_all(&frames(&[b"one", b"two"]))
                .await
                .expect("write frames");
            events.wait_for_packets(2).await;

            conn.send(&Bytes::from_static(b"out"), TransportKind::Stream).await;
            let mut echoed = [0_u8; 7];
            peer.read_exact(&mut echoed).await.expect("read frame");

            peer.write_all(&u32::MAX.to_le_bytes()).await.expect("write prefix");
            assert_eq!(events.wait_for_errors(1).await, vec!["framing"]);
            conn.close();
        });
    });

    let metrics = snapshot(&snapshotter);
    assert_eq!(
        counter_value(&metrics, FRAMES_PROCESSED, ("direction", "inbound")),
        Some(2)
    );
    assert_eq!(
        counter_value(&metrics, FRAMES_PROCESSED, ("direction", "outbound")),
        Some(1)
    );
    assert_eq!(counter_value(&metrics, ERRORS_TOTAL, ("kind", "framing")), Some(1));
}

#[test]
#[serial]
fn connection_gauge_follows_lifecycle() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        runtime().block_on(async {
            let (first, _a) = accept_duplex(ConnectionBuilder::new());
            let (second, _b) = accept_duplex(ConnectionBuilder::new());
            let (third, _c) = accept_duplex(ConnectionBuilder::new());

            first.close();
            first.close();
            second.close();
            third.close();
        });
    });
    let metrics = snapshot(&snapshotter);
    assert_eq!(gauge_value(&metrics, CONNECTIONS_ACTIVE), Some(0.0));
}

#[test]
#[serial]
fn open_connections_stay_in_the_gauge() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        runtime().block_on(async {
            let (first, _a) = accept_duplex(ConnectionBuilder::new());
            let (second, _b) = accept_duplex(ConnectionBuilder::new());
            first.close();

            let metrics = snapshot(&snapshotter);
            assert_eq!(gauge_value(&metrics, CONNECTIONS_ACTIVE), Some(1.0));
            second.close();
        });
    });
}

#[tokio::test]
#[serial]
async fn active_count_tracks_open_connections() {
    let before = active_connection_count();
    let (a, _pa) = accept_duplex(ConnectionBuilder::new());
    let (b, _pb) = accept_duplex(ConnectionBuilder::new());
    let dialled = ConnectionBuilder::new().dial("127.0.0.1:9".parse().expect("address"));
    assert_eq!(active_connection_count(), before + 3);

    a.close();
    assert_eq!(active_connection_count(), before + 2);
    b.close();
    drop(dialled);
    assert_eq!(active_connection_count(), before);
}
