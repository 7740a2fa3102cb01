//! Transfers built from repeated `read_some` / `write_some` calls, and their
//! offset-addressed counterparts over `read_some_at` / `write_some_at`.
//!
//! A [`CompletionCondition`] decides after every partial transfer whether to
//! continue and how many bytes to ask for next. Returning `0` ends the
//! transfer.
//!
//! The asynchronous variants keep a clone of the device handle and re-issue
//! the operation from inside their own completion until the condition is
//! satisfied, then complete the caller's token once with the total. The
//! positional variants advance the offset by the bytes moved so far.
//!
//! ```
//! use polyio::{capability::Closable, executor::RunQueue, io, pipe};
//!
//! let queue = RunQueue::new();
//! let (mut reader, mut writer) = pipe::connect(&queue.executor());
//!
//! io::write(&mut writer, b"hello world", io::transfer_all())?;
//! writer.close()?;
//!
//! let mut out = [0u8; 5];
//! assert_eq!(io::read(&mut reader, &mut out, io::transfer_exactly(5))?, 5);
//! assert_eq!(&out, b"hello");
//! # Ok::<(), polyio::error::Error>(())
//! ```

use crate::{
    buffer::DynamicBuffer,
    capability::{
        AsyncRandomAccessReadable, AsyncRandomAccessWritable, AsyncReadable, AsyncWritable,
        RandomAccessReadable, RandomAccessWritable, Readable, Writable,
    },
    cancel::CancellationSlot,
    continuation::{Continuation, ErasedContinuation},
    error::{Error, Status},
    executor::Executor,
    initiate::CompletionToken,
    memory::Allocator,
};

/// The largest number of bytes requested by a single step of the built-in
/// conditions.
pub const DEFAULT_MAX_TRANSFER: usize = 65536;

/// Decides how many more bytes a transfer should move.
pub trait CompletionCondition {
    /// Called before every step with the status of the previous step
    /// (`Ok(())` before the first) and the total transferred so far.
    /// Returns the maximum size of the next step, or `0` to stop.
    fn max_transfer(&mut self, status: &Status, transferred: usize) -> usize;
}

impl<F> CompletionCondition for F
where
    F: FnMut(&Status, usize) -> usize,
{
    fn max_transfer(&mut self, status: &Status, transferred: usize) -> usize {
        self(status, transferred)
    }
}

/// Transfers until the buffer is full or an error occurs.
#[derive(Copy, Clone, Debug, Default)]
pub struct TransferAll;

/// Transfers until an error occurs or at least the given number of bytes
/// were moved.
#[derive(Copy, Clone, Debug)]
pub struct TransferAtLeast(usize);

/// Transfers until an error occurs or exactly the given number of bytes
/// were moved.
#[derive(Copy, Clone, Debug)]
pub struct TransferExactly(usize);

/// See [`TransferAll`].
pub fn transfer_all() -> TransferAll {
    TransferAll
}

/// See [`TransferAtLeast`].
pub fn transfer_at_least(minimum: usize) -> TransferAtLeast {
    TransferAtLeast(minimum)
}

/// See [`TransferExactly`].
pub fn transfer_exactly(size: usize) -> TransferExactly {
    TransferExactly(size)
}

impl CompletionCondition for TransferAll {
    fn max_transfer(&mut self, status: &Status, _transferred: usize) -> usize {
        match status {
            Ok(()) => DEFAULT_MAX_TRANSFER,
            Err(_) => 0,
        }
    }
}

impl CompletionCondition for TransferAtLeast {
    fn max_transfer(&mut self, status: &Status, transferred: usize) -> usize {
        if status.is_err() || transferred >= self.0 {
            0
        } else {
            DEFAULT_MAX_TRANSFER
        }
    }
}

impl CompletionCondition for TransferExactly {
    fn max_transfer(&mut self, status: &Status, transferred: usize) -> usize {
        if status.is_err() {
            0
        } else {
            (self.0.saturating_sub(transferred)).min(DEFAULT_MAX_TRANSFER)
        }
    }
}

/// The failure of a blocking transfer.
///
/// Carries the number of bytes moved by the steps that succeeded, so the
/// caller knows how much of its slice is valid.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{error} after {transferred} bytes")]
pub struct TransferError {
    /// The error of the last step.
    #[source]
    pub error: Error,
    /// The number of bytes moved before the error.
    pub transferred: usize,
}

impl From<TransferError> for Error {
    fn from(error: TransferError) -> Self {
        error.error
    }
}

/// Runs blocking steps until `condition` stops or `len` bytes were moved.
///
/// `step` receives the number of bytes moved so far and the maximum size of
/// the step. A step moving nothing fails with `no_progress`.
fn transfer<C, F>(
    len: usize,
    mut condition: C,
    no_progress: Error,
    mut step: F,
) -> Result<usize, TransferError>
where
    C: CompletionCondition,
    F: FnMut(usize, usize) -> Result<usize, Error>,
{
    let mut transferred = 0;
    let mut status = Ok(());
    loop {
        let max = condition
            .max_transfer(&status, transferred)
            .min(len - transferred);
        if max == 0 {
            break;
        }
        status = match step(transferred, max) {
            Ok(0) => Err(no_progress.clone()),
            Ok(n) => {
                transferred += n.min(max);
                Ok(())
            }
            Err(error) => Err(error),
        };
    }
    status
        .map(|()| transferred)
        .map_err(|error| TransferError { error, transferred })
}

/// Reads into `buf` until `condition` is satisfied or `buf` is full.
///
/// Returns the total number of bytes read. On failure the error carries the
/// number of bytes read before it, which are left at the front of `buf`.
pub fn read<R, C>(device: &mut R, buf: &mut [u8], condition: C) -> Result<usize, TransferError>
where
    R: Readable + ?Sized,
    C: CompletionCondition,
{
    let len = buf.len();
    transfer(len, condition, Error::Eof, |at, max| {
        device.read_some(&mut buf[at..at + max])
    })
}

/// Writes from `buf` until `condition` is satisfied or all of `buf` was
/// written.
///
/// Returns the total number of bytes written. On failure the error carries
/// the number of bytes written before it.
pub fn write<W, C>(device: &mut W, buf: &[u8], condition: C) -> Result<usize, TransferError>
where
    W: Writable + ?Sized,
    C: CompletionCondition,
{
    transfer(buf.len(), condition, Error::Closed, |at, max| {
        device.write_some(&buf[at..at + max])
    })
}

/// Reads into `buf` from `offset` onwards until `condition` is satisfied or
/// `buf` is full.
///
/// Each step reads at the offset following the bytes already read. Reading
/// past the end of the device fails with [`Error::Eof`].
pub fn read_at<R, C>(
    device: &mut R,
    offset: u64,
    buf: &mut [u8],
    condition: C,
) -> Result<usize, TransferError>
where
    R: RandomAccessReadable + ?Sized,
    C: CompletionCondition,
{
    let len = buf.len();
    transfer(len, condition, Error::Eof, |at, max| {
        device.read_some_at(offset + at as u64, &mut buf[at..at + max])
    })
}

/// Writes `buf` to the device from `offset` onwards until `condition` is
/// satisfied or all of `buf` was written.
pub fn write_at<W, C>(
    device: &mut W,
    offset: u64,
    buf: &[u8],
    condition: C,
) -> Result<usize, TransferError>
where
    W: RandomAccessWritable + ?Sized,
    C: CompletionCondition,
{
    transfer(buf.len(), condition, Error::Closed, |at, max| {
        device.write_some_at(offset + at as u64, &buf[at..at + max])
    })
}

/// Reads into `buffer` until `condition` is satisfied or `buffer` reached
/// its maximum size, then completes `token` with the last status and the
/// total number of bytes read.
///
/// The operation keeps a clone of `device` until it completes.
pub fn async_read<D, C, T>(device: &D, buffer: DynamicBuffer, condition: C, token: T) -> T::Output
where
    D: AsyncReadable + Clone + Send + 'static,
    C: CompletionCondition + Send + 'static,
    T: CompletionToken<(Status, usize)>,
{
    let executor = device.executor();
    let device = device.clone();
    token.initiate(&executor, move |continuation| {
        Transfer {
            device,
            buffer,
            condition,
            transferred: 0,
            continuation,
            direction: Read,
        }
        .step(Ok(()), false)
    })
}

/// Writes from the front of `buffer` until `condition` is satisfied or
/// `buffer` is empty, then completes `token` with the last status and the
/// total number of bytes written.
///
/// Written bytes are consumed from `buffer`. The operation keeps a clone of
/// `device` until it completes.
pub fn async_write<D, C, T>(device: &D, buffer: DynamicBuffer, condition: C, token: T) -> T::Output
where
    D: AsyncWritable + Clone + Send + 'static,
    C: CompletionCondition + Send + 'static,
    T: CompletionToken<(Status, usize)>,
{
    let executor = device.executor();
    let device = device.clone();
    token.initiate(&executor, move |continuation| {
        Transfer {
            device,
            buffer,
            condition,
            transferred: 0,
            continuation,
            direction: Write,
        }
        .step(Ok(()), false)
    })
}

/// Reads into `buffer` from `offset` onwards until `condition` is satisfied
/// or `buffer` reached its maximum size, then completes `token` with the last
/// status and the total number of bytes read.
///
/// The operation keeps a clone of `device` until it completes.
pub fn async_read_at<D, C, T>(
    device: &D,
    offset: u64,
    buffer: DynamicBuffer,
    condition: C,
    token: T,
) -> T::Output
where
    D: AsyncRandomAccessReadable + Clone + Send + 'static,
    C: CompletionCondition + Send + 'static,
    T: CompletionToken<(Status, usize)>,
{
    let executor = device.executor();
    let device = device.clone();
    token.initiate(&executor, move |continuation| {
        Transfer {
            device,
            buffer,
            condition,
            transferred: 0,
            continuation,
            direction: ReadAt(offset),
        }
        .step(Ok(()), false)
    })
}

/// Writes from the front of `buffer` to the device from `offset` onwards
/// until `condition` is satisfied or `buffer` is empty, then completes
/// `token` with the last status and the total number of bytes written.
///
/// Written bytes are consumed from `buffer`.
pub fn async_write_at<D, C, T>(
    device: &D,
    offset: u64,
    buffer: DynamicBuffer,
    condition: C,
    token: T,
) -> T::Output
where
    D: AsyncRandomAccessWritable + Clone + Send + 'static,
    C: CompletionCondition + Send + 'static,
    T: CompletionToken<(Status, usize)>,
{
    let executor = device.executor();
    let device = device.clone();
    token.initiate(&executor, move |continuation| {
        Transfer {
            device,
            buffer,
            condition,
            transferred: 0,
            continuation,
            direction: WriteAt(offset),
        }
        .step(Ok(()), false)
    })
}

/// One direction of a composed transfer.
trait Direction<D>: Copy + Send + 'static {
    /// The number of bytes the next step may move at most.
    fn room(self, buffer: &DynamicBuffer) -> usize;

    /// Starts a step after `transferred` bytes were already moved.
    fn start(
        self,
        device: &mut D,
        transferred: usize,
        buffer: DynamicBuffer,
        max_len: usize,
        continuation: ErasedContinuation<(Status, usize)>,
    );
}

#[derive(Copy, Clone)]
struct Read;

#[derive(Copy, Clone)]
struct Write;

/// Reads starting at an offset.
#[derive(Copy, Clone)]
struct ReadAt(u64);

/// Writes starting at an offset.
#[derive(Copy, Clone)]
struct WriteAt(u64);

impl<D: AsyncReadable> Direction<D> for Read {
    fn room(self, buffer: &DynamicBuffer) -> usize {
        buffer.remaining()
    }

    fn start(
        self,
        device: &mut D,
        _transferred: usize,
        buffer: DynamicBuffer,
        max_len: usize,
        continuation: ErasedContinuation<(Status, usize)>,
    ) {
        device.async_read_some_erased(buffer, max_len, continuation)
    }
}

impl<D: AsyncWritable> Direction<D> for Write {
    fn room(self, buffer: &DynamicBuffer) -> usize {
        buffer.size()
    }

    fn start(
        self,
        device: &mut D,
        _transferred: usize,
        buffer: DynamicBuffer,
        max_len: usize,
        continuation: ErasedContinuation<(Status, usize)>,
    ) {
        device.async_write_some_erased(buffer, max_len, continuation)
    }
}

impl<D: AsyncRandomAccessReadable> Direction<D> for ReadAt {
    fn room(self, buffer: &DynamicBuffer) -> usize {
        buffer.remaining()
    }

    fn start(
        self,
        device: &mut D,
        transferred: usize,
        buffer: DynamicBuffer,
        max_len: usize,
        continuation: ErasedContinuation<(Status, usize)>,
    ) {
        let offset = self.0 + transferred as u64;
        device.async_read_some_at_erased(offset, buffer, max_len, continuation)
    }
}

impl<D: AsyncRandomAccessWritable> Direction<D> for WriteAt {
    fn room(self, buffer: &DynamicBuffer) -> usize {
        buffer.size()
    }

    fn start(
        self,
        device: &mut D,
        transferred: usize,
        buffer: DynamicBuffer,
        max_len: usize,
        continuation: ErasedContinuation<(Status, usize)>,
    ) {
        let offset = self.0 + transferred as u64;
        device.async_write_some_at_erased(offset, buffer, max_len, continuation)
    }
}

/// A composed transfer in progress. Completes itself as the continuation of
/// each step.
struct Transfer<D, C, X> {
    device: D,
    buffer: DynamicBuffer,
    condition: C,
    transferred: usize,
    continuation: ErasedContinuation<(Status, usize)>,
    direction: X,
}

impl<D, C, X> Transfer<D, C, X>
where
    D: Clone + Send + 'static,
    C: CompletionCondition + Send + 'static,
    X: Direction<D>,
    Self: Continuation<(Status, usize)>,
{
    /// Starts the next step, or completes the caller's continuation.
    ///
    /// Before the first step has started, completions are posted so that
    /// they never run on the initiating caller's stack.
    fn step(mut self, status: Status, started: bool) {
        let max = self
            .condition
            .max_transfer(&status, self.transferred)
            .min(self.direction.room(&self.buffer));

        if max == 0 {
            self.finish(status, started);
            return;
        }

        let direction = self.direction;
        let transferred = self.transferred;
        let mut device = self.device.clone();
        let buffer = self.buffer.clone();
        let fallback = self.continuation.executor().clone();
        match ErasedContinuation::try_new(self, &fallback) {
            Ok(next) => direction.start(&mut device, transferred, buffer, max, next),
            Err((error, this)) => this.finish(Err(error.into()), started),
        }
    }

    fn finish(self, status: Status, started: bool) {
        tracing::trace!(
            transferred = self.transferred,
            ok = status.is_ok(),
            "composed transfer finished"
        );
        let args = (status, self.transferred);
        if started {
            self.continuation.invoke(args);
        } else {
            self.continuation.post(args);
        }
    }
}

impl<D, C, X> Continuation<(Status, usize)> for Transfer<D, C, X>
where
    D: Clone + Send + 'static,
    C: CompletionCondition + Send + 'static,
    X: Direction<D>,
{
    fn complete(mut self, (status, n): (Status, usize)) {
        self.transferred += n;
        self.step(status, true)
    }

    fn allocator(&self) -> Allocator {
        self.continuation.allocator()
    }

    fn executor(&self) -> Option<Executor> {
        Some(self.continuation.executor().clone())
    }

    fn cancellation_slot(&self) -> Option<CancellationSlot> {
        self.continuation.cancellation_slot().cloned()
    }
}
