//! Test support for `framelink`.
//!
//! Helpers for building wire frames by hand, wiring connections to
//! in-memory duplex streams, recording the events a connection raises, and
//! capturing logs and metrics.
//!
//! ```rust
//! use framelink::connection::ConnectionBuilder;
//! use framelink_testing::{EventRecorder, accept_duplex, frame};
//! use tokio::io::AsyncWriteExt;
//!
//! # async fn example() {
//! let recorder = EventRecorder::new();
//! let builder = recorder.attach(ConnectionBuilder::new());
//! let (conn, mut peer) = accept_duplex(builder);
//! peer.write_all(&frame(b"ping")).await.unwrap();
//! # }
//! ```

pub mod duplex;
pub mod frames;
pub mod logging;
pub mod metrics;
pub mod recorder;

pub use duplex::{DUPLEX_CAPACITY, accept_duplex, connected_pair};
pub use frames::{frame, frame_with_order, frames, split_at};
pub use logging::{LoggerHandle, logger};
pub use metrics::{MetricEntry, counter_value, debugging_recorder_setup, gauge_value, snapshot};
pub use recorder::{EventRecorder, WAIT};
