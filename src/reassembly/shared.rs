//! Mutex wrapper sharing one reassembly buffer between reads and drains.

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use super::{ReassemblyBuffer, Step};
use crate::frame::FramingError;

/// A [`ReassemblyBuffer`] guarded for concurrent use.
///
/// Two locks are involved, always taken in the same order:
///
/// 1. the drain gate, held for the whole of a drain so frames from one transport are handed out by
///    a single caller at a time and therefore in arrival order;
/// 2. the buffer lock, held only for one `append`, one `step` or one size query.
///
/// The read-completion path only ever takes the buffer lock, so a slow
/// subscriber running under the drain gate never stalls incoming reads.
#[derive(Debug)]
pub struct SharedReassembly {
    buffer: Mutex<ReassemblyBuffer>,
    drain_gate: Mutex<()>,
}

/// Proof that the caller holds the drain gate of a [`SharedReassembly`].
#[derive(Debug)]
pub struct DrainGuard<'a> {
    shared: &'a SharedReassembly,
    _gate: MutexGuard<'a, ()>,
}

impl SharedReassembly {
    /// Wrap `buffer` for shared use.
    #[must_use]
    pub fn new(buffer: ReassemblyBuffer) -> Self {
        Self {
            buffer: Mutex::new(buffer),
            drain_gate: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReassemblyBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append the bytes of one completed read.
    pub fn append(&self, bytes: &[u8]) { self.lock().append(bytes); }

    /// Size of the next read; see [`ReassemblyBuffer::next_read_size`].
    #[must_use]
    pub fn next_read_size(&self, default_chunk: usize) -> usize {
        self.lock().next_read_size(default_chunk)
    }

    /// Bytes buffered but not yet moved into a frame.
    #[must_use]
    pub fn buffered_len(&self) -> usize { self.lock().buffered_len() }

    /// Whether a frame is partially received.
    #[must_use]
    pub fn has_pending_frame(&self) -> bool { self.lock().has_pending_frame() }

    /// Whether a framing error has stopped this buffer.
    #[must_use]
    pub fn is_poisoned(&self) -> bool { self.lock().is_poisoned() }

    /// Extract the next complete frame, if any, in one atomic operation.
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] if the buffered bytes are malformed.
    pub fn try_extract_frame(&self) -> Result<Option<bytes::Bytes>, FramingError> {
        self.lock().try_extract_frame()
    }

    /// Try to become the single drainer of this buffer.
    ///
    /// Returns `None` when another drain is already in progress, including a
    /// drain further up the current call stack.
    #[must_use]
    pub fn try_begin_drain(&self) -> Option<DrainGuard<'_>> {
        let gate = match self.drain_gate.try_lock() {
            Ok(gate) => gate,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(DrainGuard {
            shared: self,
            _gate: gate,
        })
    }
}

impl DrainGuard<'_> {
    /// Run one step of the extraction state machine.
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] if the buffered bytes are malformed.
    pub fn step(&self) -> Result<Step, FramingError> { self.shared.lock().step() }
}
