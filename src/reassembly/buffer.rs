//! Frame extraction state machine.

use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};

use super::policy::{FramingPolicy, Remainder, Shortfall, TransportKind};
use crate::{
    byte_order::ByteOrder,
    frame::{FramingError, LENGTH_PREFIX_SIZE, read_length_prefix},
};

/// Outcome of a single [`ReassemblyBuffer::step`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Nothing more can be extracted until further bytes arrive.
    Exit,
    /// Bytes moved into the pending frame but it is not complete yet.
    Progress,
    /// A frame completed; its payload is returned.
    Frame(Bytes),
}

/// A frame whose prefix has been parsed but whose payload is still filling.
#[derive(Debug)]
struct PendingFrame {
    payload_size: usize,
    payload: BytesMut,
}

impl PendingFrame {
    fn new(payload_size: usize) -> Self {
        Self {
            payload_size,
            payload: BytesMut::with_capacity(payload_size),
        }
    }

    fn remaining(&self) -> usize { self.payload_size - self.payload.len() }

    fn is_complete(&self) -> bool { self.payload.len() == self.payload_size }
}

/// In-progress frame boundary tracking for one direction of one transport.
///
/// Holds the bytes read but not yet consumed (`raw`) and at most one pending
/// frame. For datagram framing, appended datagrams queue up whole and are
/// moved into `raw` one at a time so their boundaries survive buffering.
///
/// Any [`FramingError`] poisons the buffer: the error is returned once, every
/// buffered byte is dropped, and later steps report [`Step::Exit`].
#[derive(Debug)]
pub struct ReassemblyBuffer {
    policy: FramingPolicy,
    host: ByteOrder,
    max_frame_length: usize,
    raw: BytesMut,
    datagrams: VecDeque<Bytes>,
    pending: Option<PendingFrame>,
    poisoned: bool,
}

impl ReassemblyBuffer {
    /// Create an empty buffer for `kind` with the given frame size limit.
    ///
    /// `host` is the byte order of the local machine, used when decoding the
    /// wire-order length prefix.
    #[must_use]
    pub fn new(kind: TransportKind, host: ByteOrder, max_frame_length: usize) -> Self {
        Self {
            policy: kind.policy(),
            host,
            max_frame_length,
            raw: BytesMut::new(),
            datagrams: VecDeque::new(),
            pending: None,
            poisoned: false,
        }
    }

    /// The framing policy in force.
    #[must_use]
    pub const fn policy(&self) -> FramingPolicy { self.policy }

    /// Append bytes produced by one completed read.
    ///
    /// For datagram framing `bytes` must be exactly one datagram. Empty reads
    /// and appends to a poisoned buffer are ignored.
    pub fn append(&mut self, bytes: &[u8]) {
        if bytes.is_empty() || self.poisoned {
            return;
        }
        if self.policy.preserves_boundaries() {
            self.datagrams.push_back(Bytes::copy_from_slice(bytes));
        } else {
            self.raw.extend_from_slice(bytes);
        }
    }

    /// Run one iteration of the extraction state machine.
    ///
    /// At most one frame is produced per call.
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] when the buffered bytes violate the wire
    /// format. The buffer is poisoned afterwards.
    pub fn step(&mut self) -> Result<Step, FramingError> {
        if self.poisoned {
            return Ok(Step::Exit);
        }
        if self.raw.is_empty()
            && self.pending.is_none()
            && let Some(datagram) = self.datagrams.pop_front()
        {
            self.raw.extend_from_slice(&datagram);
        }
        if self.raw.is_empty() {
            return Ok(Step::Exit);
        }

        if self.pending.is_none() {
            if self.raw.len() < LENGTH_PREFIX_SIZE {
                return match self.policy.shortfall() {
                    Shortfall::Wait => Ok(Step::Exit),
                    Shortfall::Reject => Err(self.poison(FramingError::IncompleteHeader {
                        have: self.raw.len(),
                        need: LENGTH_PREFIX_SIZE,
                    })),
                };
            }
            let mut prefix = [0_u8; LENGTH_PREFIX_SIZE];
            self.raw.copy_to_slice(&mut prefix);
            let payload_size = read_length_prefix(prefix, self.host);
            if payload_size > self.max_frame_length {
                return Err(self.poison(FramingError::OversizedFrame {
                    size: payload_size,
                    max: self.max_frame_length,
                }));
            }
            self.pending = Some(PendingFrame::new(payload_size));
        }

        let Some(pending) = self.pending.as_mut() else {
            return Ok(Step::Exit);
        };
        let take = pending.remaining().min(self.raw.len());
        pending.payload.extend_from_slice(&self.raw.split_to(take));

        if pending.is_complete() {
            let payload = self
                .pending
                .take()
                .map(|frame| frame.payload.freeze())
                .unwrap_or_default();
            if self.policy.remainder() == Remainder::Discard {
                self.raw.clear();
            }
            return Ok(Step::Frame(payload));
        }

        if self.policy.shortfall() == Shortfall::Reject {
            let declared = pending.payload_size;
            let available = pending.payload.len();
            return Err(self.poison(FramingError::TruncatedDatagram {
                declared,
                available,
            }));
        }
        Ok(Step::Progress)
    }

    /// Step until a frame completes or nothing more can be extracted.
    ///
    /// # Errors
    ///
    /// Propagates any [`FramingError`] raised by [`step`](Self::step).
    pub fn try_extract_frame(&mut self) -> Result<Option<Bytes>, FramingError> {
        loop {
            match self.step()? {
                Step::Exit => return Ok(None),
                Step::Progress => {}
                Step::Frame(payload) => return Ok(Some(payload)),
            }
        }
    }

    /// Size of the next read on this transport.
    ///
    /// While a stream frame is pending and fewer than `default_chunk` bytes
    /// are still missing, only the missing bytes are requested so the read
    /// stops at the frame boundary.
    #[must_use]
    pub fn next_read_size(&self, default_chunk: usize) -> usize {
        if !self.policy.allows_sized_reads() {
            return default_chunk;
        }
        match &self.pending {
            Some(pending) => match pending.remaining().saturating_sub(self.raw.len()) {
                0 => default_chunk,
                missing => missing.min(default_chunk),
            },
            None => default_chunk,
        }
    }

    /// Bytes buffered but not yet moved into a frame.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.raw.len() + self.datagrams.iter().map(Bytes::len).sum::<usize>()
    }

    /// Whether a frame prefix has been parsed and its payload is incomplete.
    #[must_use]
    pub fn has_pending_frame(&self) -> bool { self.pending.is_some() }

    /// Whether a framing error has stopped this buffer.
    #[must_use]
    pub const fn is_poisoned(&self) -> bool { self.poisoned }

    fn poison(&mut self, error: FramingError) -> FramingError {
        self.poisoned = true;
        self.raw.clear();
        self.datagrams.clear();
        self.pending = None;
        error
    }
}
