//! Growable byte buffers behind one shared value type.
//!
//! [`DynamicBuffer`] wraps any [`BufferBackend`] and is what asynchronous
//! reads and writes operate on. Clones of a `DynamicBuffer` are handles to
//! the same buffer, so a buffer handed to an operation stays alive until the
//! operation is done with it, and the caller can keep a clone to look at the
//! result.
//!
//! Two backends are provided:
//!
//! - [`VecBuffer`]: one contiguous `Vec<u8>`.
//! - [`RingBuffer`]: a `VecDeque<u8>` whose bytes may wrap around; windows
//!   are made contiguous on access, and consuming from the front is cheap.
//!
//! Both report [`capacity`](BufferBackend::capacity) as the size their
//! storage has been extended to, capped at the maximum size, so the same
//! sequence of operations yields the same observations on either backend.
//!
//! ```
//! use polyio::buffer::{DynamicBuffer, RingBuffer};
//!
//! let buffer = DynamicBuffer::new(RingBuffer::with_max_size(8));
//! buffer.extend_from_slice(b"hello")?;
//!
//! let shared = buffer.clone();
//! shared.consume(2);
//!
//! assert_eq!(buffer.to_vec(), b"llo");
//! assert!(buffer.extend_from_slice(b"world!").is_err());
//! # Ok::<(), polyio::buffer::BufferError>(())
//! ```

use std::{any::TypeId, collections::VecDeque, fmt, ops::Range};

pub use polyio_internals::backend::{BufferBackend, BufferError, check_growth};
use polyio_internals::{RawBufferGuard, RawDynamicBuffer};

/// A shared handle to a growable byte buffer.
///
/// Every method locks the buffer for its own duration. Use
/// [`lock`](DynamicBuffer::lock) to perform several steps without other
/// handles observing the intermediate states.
#[derive(Clone)]
pub struct DynamicBuffer {
    raw: RawDynamicBuffer,
}

impl DynamicBuffer {
    /// Wraps `backend` in a new buffer.
    pub fn new<B: BufferBackend>(backend: B) -> Self {
        Self {
            raw: RawDynamicBuffer::new(backend),
        }
    }

    /// Locks the buffer, giving exclusive access until the guard is dropped.
    ///
    /// Locking a buffer that the same thread has already locked deadlocks.
    pub fn lock(&self) -> BufferGuard<'_> {
        BufferGuard {
            raw: self.raw.lock(),
        }
    }

    /// The number of readable bytes.
    pub fn size(&self) -> usize {
        self.lock().size()
    }

    /// The largest size the buffer may reach.
    pub fn max_size(&self) -> usize {
        self.lock().max_size()
    }

    /// The number of bytes the buffer can hold without reallocating.
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// The number of bytes that can still be added.
    pub fn remaining(&self) -> usize {
        let mut guard = self.lock();
        guard.max_size().saturating_sub(guard.size())
    }

    /// Moves up to `n` prepared bytes into the readable sequence.
    pub fn commit(&self, n: usize) {
        self.lock().commit(n)
    }

    /// Appends `n` zeroed bytes.
    pub fn grow(&self, n: usize) -> Result<(), BufferError> {
        self.lock().grow(n)
    }

    /// Removes up to `n` bytes from the end.
    pub fn shrink(&self, n: usize) {
        self.lock().shrink(n)
    }

    /// Removes up to `n` bytes from the front.
    pub fn consume(&self, n: usize) {
        self.lock().consume(n)
    }

    /// Appends `bytes`, or nothing if they do not fit.
    pub fn extend_from_slice(&self, bytes: &[u8]) -> Result<(), BufferError> {
        let mut guard = self.lock();
        guard.prepare(bytes.len())?.copy_from_slice(bytes);
        guard.commit(bytes.len());
        Ok(())
    }

    /// Copies readable bytes starting at `pos` into `out` and returns how
    /// many were copied.
    pub fn copy_to(&self, pos: usize, out: &mut [u8]) -> usize {
        let mut guard = self.lock();
        let window = guard.data(pos, out.len());
        out[..window.len()].copy_from_slice(window);
        window.len()
    }

    /// Copies all readable bytes into a new vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.lock().data(0, usize::MAX).to_vec()
    }

    /// Returns `true` if both handles refer to the same buffer.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.raw.ptr_eq(&other.raw)
    }

    /// The number of handles to this buffer.
    pub fn handle_count(&self) -> usize {
        self.raw.strong_count()
    }

    /// The [`TypeId`] of the backend.
    pub fn backend_type_id(&self) -> TypeId {
        self.raw.backend_type_id()
    }

    /// The type name of the backend, for diagnostics.
    pub fn backend_type_name(&self) -> &'static str {
        self.raw.backend_type_name()
    }

    /// Runs `f` on the backend if it is a `B`.
    pub fn with_backend<B, R>(&self, f: impl FnOnce(&mut B) -> R) -> Option<R>
    where
        B: BufferBackend,
    {
        let mut guard = self.lock();
        guard.downcast_mut::<B>().map(f)
    }

    /// Returns the backend if it is a `B` and this is the last handle.
    /// Otherwise the handle is returned unchanged.
    pub fn try_unwrap<B: BufferBackend>(self) -> Result<B, Self> {
        self.raw.try_unwrap::<B>().map_err(|raw| Self { raw })
    }
}

impl fmt::Debug for DynamicBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicBuffer")
            .field("backend", &self.backend_type_name())
            .field("handles", &self.handle_count())
            .finish()
    }
}

/// Exclusive access to a locked [`DynamicBuffer`].
pub struct BufferGuard<'a> {
    raw: RawBufferGuard<'a>,
}

impl BufferGuard<'_> {
    /// See [`BufferBackend::size`].
    pub fn size(&mut self) -> usize {
        self.raw.size()
    }

    /// See [`BufferBackend::max_size`].
    pub fn max_size(&mut self) -> usize {
        self.raw.max_size()
    }

    /// See [`BufferBackend::capacity`].
    pub fn capacity(&mut self) -> usize {
        self.raw.capacity()
    }

    /// See [`BufferBackend::data`].
    pub fn data(&mut self, pos: usize, n: usize) -> &[u8] {
        self.raw.data(pos, n)
    }

    /// See [`BufferBackend::data_mut`].
    pub fn data_mut(&mut self, pos: usize, n: usize) -> &mut [u8] {
        self.raw.data_mut(pos, n)
    }

    /// See [`BufferBackend::prepare`].
    pub fn prepare(&mut self, n: usize) -> Result<&mut [u8], BufferError> {
        self.raw.prepare(n)
    }

    /// See [`BufferBackend::commit`].
    pub fn commit(&mut self, n: usize) {
        self.raw.commit(n)
    }

    /// See [`BufferBackend::grow`].
    pub fn grow(&mut self, n: usize) -> Result<(), BufferError> {
        self.raw.grow(n)
    }

    /// See [`BufferBackend::shrink`].
    pub fn shrink(&mut self, n: usize) {
        self.raw.shrink(n)
    }

    /// See [`BufferBackend::consume`].
    pub fn consume(&mut self, n: usize) {
        self.raw.consume(n)
    }

    /// The backend, if it is a `B`.
    pub fn downcast_mut<B: BufferBackend>(&mut self) -> Option<&mut B> {
        self.raw.downcast_mut::<B>()
    }
}

/// The readable window `pos..pos + n` of a buffer holding `readable` bytes.
/// The error for storage that could not be extended to `len` bytes. Only the
/// bytes already allocated are reported as available.
fn out_of_storage(readable: usize, len: usize, capacity: usize) -> BufferError {
    BufferError::LengthExceeded {
        requested: len - readable,
        available: capacity - readable,
    }
}

fn window(readable: usize, pos: usize, n: usize) -> Range<usize> {
    let start = pos.min(readable);
    start..start + n.min(readable - start)
}

/// A contiguous buffer backed by a `Vec<u8>`.
///
/// Prepared bytes live in the vector after the readable bytes.
#[derive(Clone, Debug)]
pub struct VecBuffer {
    bytes: Vec<u8>,
    readable: usize,
    max_size: usize,
}

impl VecBuffer {
    /// An empty buffer without a size limit.
    pub fn new() -> Self {
        Self::with_max_size(usize::MAX)
    }

    /// An empty buffer that never holds more than `max_size` bytes.
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            bytes: Vec::new(),
            readable: 0,
            max_size,
        }
    }

    /// A buffer whose readable bytes are `bytes`.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            readable: bytes.len(),
            bytes,
            max_size: usize::MAX,
        }
    }

    /// The readable bytes.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.bytes.truncate(self.readable);
        self.bytes
    }

    /// Resizes the storage to `len` bytes, allocating exactly what is
    /// missing.
    fn resize(&mut self, len: usize) -> Result<(), BufferError> {
        self.bytes
            .try_reserve_exact(len.saturating_sub(self.bytes.len()))
            .map_err(|_| out_of_storage(self.readable, len, self.bytes.capacity()))?;
        self.bytes.resize(len, 0);
        Ok(())
    }
}

impl Default for VecBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferBackend for VecBuffer {
    fn size(&self) -> usize {
        self.readable
    }

    fn max_size(&self) -> usize {
        self.max_size
    }

    fn capacity(&self) -> usize {
        self.bytes.capacity().min(self.max_size)
    }

    fn data(&mut self, pos: usize, n: usize) -> &[u8] {
        &self.bytes[window(self.readable, pos, n)]
    }

    fn data_mut(&mut self, pos: usize, n: usize) -> &mut [u8] {
        let range = window(self.readable, pos, n);
        &mut self.bytes[range]
    }

    fn prepare(&mut self, n: usize) -> Result<&mut [u8], BufferError> {
        check_growth(self.readable, self.max_size, n)?;
        self.resize(self.readable + n)?;
        Ok(&mut self.bytes[self.readable..])
    }

    fn commit(&mut self, n: usize) {
        self.readable += n.min(self.bytes.len() - self.readable);
        self.bytes.truncate(self.readable);
    }

    fn grow(&mut self, n: usize) -> Result<(), BufferError> {
        check_growth(self.readable, self.max_size, n)?;
        self.bytes.truncate(self.readable);
        self.resize(self.readable + n)?;
        self.readable += n;
        Ok(())
    }

    fn shrink(&mut self, n: usize) {
        self.readable -= n.min(self.readable);
        self.bytes.truncate(self.readable);
    }

    fn consume(&mut self, n: usize) {
        let n = n.min(self.readable);
        self.bytes.drain(..n);
        self.readable -= n;
    }
}

/// A buffer backed by a `VecDeque<u8>`.
///
/// Consuming from the front does not move the remaining bytes. Windows that
/// wrap around the end of the ring are made contiguous when accessed.
#[derive(Clone, Debug)]
pub struct RingBuffer {
    bytes: VecDeque<u8>,
    readable: usize,
    max_size: usize,
}

impl RingBuffer {
    /// An empty buffer without a size limit.
    pub fn new() -> Self {
        Self::with_max_size(usize::MAX)
    }

    /// An empty buffer that never holds more than `max_size` bytes.
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            bytes: VecDeque::new(),
            readable: 0,
            max_size,
        }
    }

    /// The readable bytes.
    pub fn into_deque(mut self) -> VecDeque<u8> {
        self.bytes.truncate(self.readable);
        self.bytes
    }

    fn resize(&mut self, len: usize) -> Result<(), BufferError> {
        self.bytes
            .try_reserve_exact(len.saturating_sub(self.bytes.len()))
            .map_err(|_| out_of_storage(self.readable, len, self.bytes.capacity()))?;
        self.bytes.resize(len, 0);
        Ok(())
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferBackend for RingBuffer {
    fn size(&self) -> usize {
        self.readable
    }

    fn max_size(&self) -> usize {
        self.max_size
    }

    fn capacity(&self) -> usize {
        self.bytes.capacity().min(self.max_size)
    }

    fn data(&mut self, pos: usize, n: usize) -> &[u8] {
        let range = window(self.readable, pos, n);
        &self.bytes.make_contiguous()[range]
    }

    fn data_mut(&mut self, pos: usize, n: usize) -> &mut [u8] {
        let range = window(self.readable, pos, n);
        &mut self.bytes.make_contiguous()[range]
    }

    fn prepare(&mut self, n: usize) -> Result<&mut [u8], BufferError> {
        check_growth(self.readable, self.max_size, n)?;
        self.resize(self.readable + n)?;
        let readable = self.readable;
        Ok(&mut self.bytes.make_contiguous()[readable..])
    }

    fn commit(&mut self, n: usize) {
        self.readable += n.min(self.bytes.len() - self.readable);
        self.bytes.truncate(self.readable);
    }

    fn grow(&mut self, n: usize) -> Result<(), BufferError> {
        check_growth(self.readable, self.max_size, n)?;
        self.bytes.truncate(self.readable);
        self.resize(self.readable + n)?;
        self.readable += n;
        Ok(())
    }

    fn shrink(&mut self, n: usize) {
        self.readable -= n.min(self.readable);
        self.bytes.truncate(self.readable);
    }

    fn consume(&mut self, n: usize) {
        let n = n.min(self.readable);
        self.bytes.drain(..n);
        self.readable -= n;
    }
}
