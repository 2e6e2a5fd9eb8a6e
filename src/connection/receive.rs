//! Receive loops, read completion handling and draining.

use std::{
    io,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use bytes::Bytes;
use tokio::{io::AsyncReadExt, select};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{BoxedReader, Connection, ConnectionError, DatagramTransport};
use crate::{
    codec::PacketCodec,
    metrics::{self, Direction},
    panic::format_panic,
    reassembly::{Step, TransportKind},
};

/// What the receive loop does after a read completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum ReadOutcome {
    /// Issue the next read.
    Rearm,
    /// Stop reading from this transport.
    Stop,
}

/// Result of draining one transport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(super) struct Drained {
    pub frames: usize,
    /// The iteration bound was reached before the buffer ran dry.
    pub exhausted: bool,
}

impl<C: PacketCodec> Connection<C> {
    /// Deliver the frames currently buffered on every transport.
    ///
    /// Runs at most [`process_iterations`](super::ConnectionConfig::process_iterations)
    /// extraction steps per transport and raises one packet event per
    /// complete frame, in arrival order. Frames beyond the bound stay
    /// buffered for the next call. A drain already running on a transport,
    /// for example further up the stack of a packet subscriber, is left to
    /// finish on its own and that transport is skipped.
    ///
    /// Returns the number of packet events raised.
    pub fn drain(&self) -> usize {
        let stream = self.drain_transport(TransportKind::Stream);
        let datagram = self.drain_transport(TransportKind::Datagram);
        stream.frames + datagram.frames
    }

    pub(super) fn drain_transport(&self, kind: TransportKind) -> Drained {
        let inner = &self.inner;
        let Some(gate) = inner.buffer(kind).try_begin_drain() else {
            trace!(transport = %kind, "drain already in progress");
            // The other drain may stop at its own bound; report the buffer as
            // unfinished so a background drain comes back for the rest.
            return Drained {
                frames: 0,
                exhausted: true,
            };
        };
        let mut frames = 0;
        for _ in 0..inner.config.process_iterations() {
            if inner.is_closed() {
                return Drained {
                    frames,
                    exhausted: false,
                };
            }
            match gate.step() {
                Ok(Step::Exit) => {
                    return Drained {
                        frames,
                        exhausted: false,
                    };
                }
                Ok(Step::Progress) => {}
                Ok(Step::Frame(payload)) => {
                    frames += 1;
                    self.deliver(kind, payload);
                }
                Err(source) => {
                    drop(gate);
                    self.report_error(ConnectionError::Framing {
                        transport: kind,
                        source,
                    });
                    return Drained {
                        frames,
                        exhausted: false,
                    };
                }
            }
        }
        Drained {
            frames,
            exhausted: true,
        }
    }

    fn deliver(&self, kind: TransportKind, payload: Bytes) {
        let len = payload.len();
        let codec = &self.inner.codec;
        let decoded = match catch_unwind(AssertUnwindSafe(|| codec.decode(payload))) {
            Ok(decoded) => decoded,
            Err(panic) => {
                self.report_error(ConnectionError::CodecPanicked {
                    transport: kind,
                    message: format_panic(&*panic).to_string(),
                });
                return;
            }
        };
        match decoded {
            Ok(packet) => {
                debug!(transport = %kind, len, "packet ready");
                metrics::inc_frames(Direction::Inbound);
                let panics = self.inner.events.packet(&packet, self);
                self.report_panics(panics);
            }
            Err(error) => self.report_error(error.into()),
        }
    }

    /// Handle one completed read on `kind`.
    pub(super) fn complete_read(&self, kind: TransportKind, result: io::Result<&[u8]>) -> ReadOutcome {
        if self.inner.is_closed() {
            return ReadOutcome::Stop;
        }
        match result {
            Err(source) => {
                self.report_error(ConnectionError::Io {
                    transport: kind,
                    source,
                });
                ReadOutcome::Stop
            }
            Ok([]) => {
                self.report_error(ConnectionError::PeerClosed(kind));
                ReadOutcome::Stop
            }
            Ok(bytes) => {
                trace!(transport = %kind, len = bytes.len(), "read completed");
                self.inner.buffer(kind).append(bytes);
                ReadOutcome::Rearm
            }
        }
    }

    /// Append a completed read, drain if configured, and decide whether to
    /// read again.
    async fn after_read(&self, kind: TransportKind, result: io::Result<&[u8]>) -> bool {
        if self.complete_read(kind, result) == ReadOutcome::Stop {
            return false;
        }
        if self.background_processing() {
            // Yield between bounded drains so a burst cannot monopolise the
            // worker, but keep going until the buffer is dry.
            while self.drain_transport(kind).exhausted && self.inner.can_rearm() {
                tokio::task::yield_now().await;
            }
        }
        self.inner.can_rearm()
    }
}

pub(super) async fn stream_loop<C: PacketCodec>(
    conn: Connection<C>,
    mut reader: BoxedReader,
    shutdown: CancellationToken,
) {
    let mut buf = Vec::new();
    while conn.inner.can_rearm() {
        let size = conn.inner.stream_buffer.next_read_size(conn.inner.config.read_chunk());
        buf.resize(size, 0);
        let result = select! {
            biased;

            () = shutdown.cancelled() => break,
            res = reader.read(&mut buf[..size]) => res,
        };
        let read = result.map(|n| &buf[..n]);
        if !conn.after_read(TransportKind::Stream, read).await {
            break;
        }
    }
    trace!("stream receive loop stopped");
}

pub(super) async fn datagram_loop<C: PacketCodec>(
    conn: Connection<C>,
    socket: Arc<dyn DatagramTransport>,
    shutdown: CancellationToken,
) {
    let mut buf = vec![0_u8; conn.inner.config.datagram_buffer()];
    while conn.inner.can_rearm() {
        let result = select! {
            biased;

            () = shutdown.cancelled() => break,
            res = socket.recv(&mut buf) => res,
        };
        let read = result.map(|n| &buf[..n]);
        if !conn.after_read(TransportKind::Datagram, read).await {
            break;
        }
    }
    trace!("datagram receive loop stopped");
}
