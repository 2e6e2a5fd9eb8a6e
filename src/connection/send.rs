//! Outbound framing and writes.

use std::io;

use bytes::Bytes;
use tokio::{io::AsyncWriteExt, select};
use tracing::debug;

use super::{Connection, ConnectionError};
use crate::{
    codec::PacketCodec,
    frame::encode_frame,
    metrics::{self, Direction},
    reassembly::TransportKind,
};

impl<C: PacketCodec> Connection<C> {
    /// Encode `packet` and send it as one frame on `kind`.
    ///
    /// Does nothing if the connection is closed or not connected. Failures
    /// are reported through the connection error event.
    pub async fn send(&self, packet: &C::Packet, kind: TransportKind) {
        if !self.can_send(kind) {
            return;
        }
        match self.inner.codec.encode(packet) {
            Ok(payload) => self.send_raw(payload, kind).await,
            Err(error) => self.report_error(error.into()),
        }
    }

    /// Blocking form of [`send`](Self::send).
    ///
    /// Parks the calling thread until the write finishes. Call it only from
    /// threads that are not driving a Tokio runtime, such as a game loop
    /// thread next to a multi-threaded runtime.
    pub fn send_blocking(&self, packet: &C::Packet, kind: TransportKind) {
        futures::executor::block_on(self.send(packet, kind));
    }

    /// Send an already encoded payload as one frame on `kind`.
    pub async fn send_raw(&self, payload: Bytes, kind: TransportKind) {
        if !self.can_send(kind) {
            return;
        }
        let config = &self.inner.config;
        let max = config.frame_length_limit();
        let Ok(frame) = encode_frame(&payload, config.byte_order(), max) else {
            self.report_error(ConnectionError::OversizedPayload {
                size: payload.len(),
                max,
            });
            return;
        };
        let result = match kind {
            TransportKind::Stream => self.write_stream(&frame).await,
            TransportKind::Datagram => self.write_datagram(&frame).await,
        };
        match result {
            Ok(true) => {
                debug!(transport = %kind, len = payload.len(), "frame sent");
                metrics::inc_frames(Direction::Outbound);
            }
            Ok(false) => {}
            Err(source) => self.report_error(ConnectionError::Io {
                transport: kind,
                source,
            }),
        }
    }

    fn can_send(&self, kind: TransportKind) -> bool {
        if self.inner.is_closed() {
            return false;
        }
        if !self.inner.is_connected() {
            debug!(transport = %kind, "send on disconnected connection ignored");
            return false;
        }
        true
    }

    /// Returns `Ok(false)` when the stream is gone or the connection closed
    /// mid-write.
    async fn write_stream(&self, frame: &[u8]) -> io::Result<bool> {
        let inner = &self.inner;
        let mut slot = inner.writer.lock().await;
        if inner.is_closed() {
            slot.take();
            return Ok(false);
        }
        let Some(writer) = slot.as_mut() else {
            return Ok(false);
        };
        let written = select! {
            biased;

            () = inner.shutdown.cancelled() => None,
            res = async {
                writer.write_all(frame).await?;
                writer.flush().await
            } => Some(res),
        };
        match written {
            Some(result) => result.map(|()| true),
            None => {
                slot.take();
                Ok(false)
            }
        }
    }

    async fn write_datagram(&self, frame: &[u8]) -> io::Result<bool> {
        let Some(socket) = self.datagram_transport() else {
            debug!("no datagram transport attached; frame dropped");
            return Ok(false);
        };
        socket.send(frame).await?;
        Ok(true)
    }
}
