//! Single-responsibility device interfaces.
//!
//! Each trait in this module describes one thing a device can do: read,
//! write, close, cancel, wait. Devices implement the subset they support, and
//! callers program against a [capability set](crate::sets) combining the
//! traits they need, usually as a trait object.
//!
//! # Two layers
//!
//! Asynchronous operations are defined twice:
//!
//! - The object-safe trait method, suffixed `_erased`, takes an
//!   [`ErasedContinuation`] with a fixed completion signature. This is what
//!   devices implement.
//! - The extension trait method (for example
//!   [`AsyncReadableExt::async_read_some`]) accepts any
//!   [`CompletionToken`]. It erases the token with the device's
//!   [`executor`](ExecutionContextProvider::executor) as fallback and calls
//!   the erased method. This is what callers use.
//!
//! Every trait with an asynchronous method has [`ExecutionContextProvider`]
//! as a supertrait, so erasure always has a fallback executor.
//!
//! # Completion rules
//!
//! A device receiving an erased continuation must complete it exactly once,
//! and never from inside the `_erased` call itself: completions go through
//! the continuation's executor, for example with
//! [`ErasedContinuation::post`]. The first completion argument is always a
//! [`Status`]. If the continuation has a
//! [cancellation slot](ErasedContinuation::cancellation_slot), the device
//! should install a handler that completes the operation with
//! [`Error::Aborted`](crate::error::Error::Aborted).

use std::time::{Duration, Instant};

use crate::{
    buffer::DynamicBuffer,
    continuation::ErasedContinuation,
    error::{Error, Status},
    executor::Executor,
    initiate::CompletionToken,
};

/// Reports the executor a device is bound to.
pub trait ExecutionContextProvider {
    /// The executor completions of this device run on, unless the
    /// continuation has an executor of its own.
    fn executor(&self) -> Executor;
}

/// A device that can be closed.
pub trait Closable {
    /// Closes the device.
    ///
    /// Pending asynchronous operations complete with
    /// [`Error::Aborted`](crate::error::Error::Aborted).
    fn close(&mut self) -> Result<(), Error>;

    /// Returns `true` until the device is closed.
    fn is_open(&self) -> bool;
}

/// A device whose pending operations can be cancelled.
pub trait Cancellable {
    /// Completes all pending asynchronous operations with
    /// [`Error::Aborted`](crate::error::Error::Aborted).
    fn cancel(&mut self) -> Result<(), Error>;
}

/// Blocking reads.
pub trait Readable {
    /// Reads at least one byte into `buf`, blocking until data is available.
    ///
    /// Returns `Ok(0)` only if `buf` is empty. The end of the stream is
    /// reported as [`Error::Eof`].
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, Error>;
}

/// Blocking writes.
pub trait Writable {
    /// Writes at least one byte of `buf`, blocking until the device accepts
    /// data.
    ///
    /// Returns `Ok(0)` only if `buf` is empty.
    fn write_some(&mut self, buf: &[u8]) -> Result<usize, Error>;
}

/// Asynchronous reads.
pub trait AsyncReadable: ExecutionContextProvider {
    /// Starts reading at most `max_len` bytes and appending them to
    /// `buffer`.
    ///
    /// Completes with the status and the number of bytes appended.
    fn async_read_some_erased(
        &mut self,
        buffer: DynamicBuffer,
        max_len: usize,
        continuation: ErasedContinuation<(Status, usize)>,
    );
}

/// Asynchronous writes.
pub trait AsyncWritable: ExecutionContextProvider {
    /// Starts writing at most `max_len` bytes from the front of `buffer`.
    ///
    /// The written bytes are consumed from `buffer`. Completes with the
    /// status and the number of bytes written.
    fn async_write_some_erased(
        &mut self,
        buffer: DynamicBuffer,
        max_len: usize,
        continuation: ErasedContinuation<(Status, usize)>,
    );
}

/// Blocking offset-addressed reads.
pub trait RandomAccessReadable {
    /// Reads at least one byte at `offset` into `buf`.
    fn read_some_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, Error>;
}

/// Blocking offset-addressed writes.
pub trait RandomAccessWritable {
    /// Writes at least one byte of `buf` at `offset`.
    fn write_some_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize, Error>;
}

/// Asynchronous offset-addressed reads.
pub trait AsyncRandomAccessReadable: ExecutionContextProvider {
    /// Starts reading at most `max_len` bytes at `offset`, appending them to
    /// `buffer`.
    fn async_read_some_at_erased(
        &mut self,
        offset: u64,
        buffer: DynamicBuffer,
        max_len: usize,
        continuation: ErasedContinuation<(Status, usize)>,
    );
}

/// Asynchronous offset-addressed writes.
pub trait AsyncRandomAccessWritable: ExecutionContextProvider {
    /// Starts writing at most `max_len` bytes from the front of `buffer` at
    /// `offset`. The written bytes are consumed from `buffer`.
    fn async_write_some_at_erased(
        &mut self,
        offset: u64,
        buffer: DynamicBuffer,
        max_len: usize,
        continuation: ErasedContinuation<(Status, usize)>,
    );
}

/// The readiness condition of a wait.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum WaitType {
    /// Wait until the device is ready to read.
    Read,
    /// Wait until the device is ready to write.
    Write,
    /// Wait until the device has an error condition pending.
    Error,
}

/// Blocking readiness waits.
pub trait Waitable {
    /// Blocks until the device is ready for `wait_type`.
    fn wait(&mut self, wait_type: WaitType) -> Result<(), Error>;
}

/// Asynchronous readiness waits.
pub trait AsyncWaitable: ExecutionContextProvider {
    /// Starts waiting until the device is ready for `wait_type`.
    fn async_wait_erased(&mut self, wait_type: WaitType, continuation: ErasedContinuation<(Status,)>);
}

/// A timer with a blocking wait.
pub trait TimedWaitable {
    /// The time the timer expires at.
    fn expiry(&self) -> Instant;

    /// Sets the expiry time. Returns the number of pending waits that were
    /// cancelled.
    fn expires_at(&mut self, expiry: Instant) -> usize;

    /// Sets the expiry time relative to now. Returns the number of pending
    /// waits that were cancelled.
    fn expires_after(&mut self, duration: Duration) -> usize {
        self.expires_at(Instant::now() + duration)
    }

    /// Blocks until the timer expires.
    fn wait_expiry(&mut self) -> Result<(), Error>;
}

/// A timer with an asynchronous wait.
pub trait AsyncTimedWaitable: ExecutionContextProvider {
    /// Starts waiting until the timer expires.
    ///
    /// Waits cancelled by a change of the expiry time complete with
    /// [`Error::Aborted`](crate::error::Error::Aborted).
    fn async_wait_expiry_erased(&mut self, continuation: ErasedContinuation<(Status,)>);
}

/// A set of process signals that can be waited for.
pub trait AsyncSignalWaitable: ExecutionContextProvider {
    /// Adds `signal` to the set.
    fn add(&mut self, signal: i32) -> Result<(), Error>;

    /// Removes `signal` from the set.
    fn remove(&mut self, signal: i32) -> Result<(), Error>;

    /// Removes all signals from the set.
    fn clear(&mut self) -> Result<(), Error>;

    /// Starts waiting for a signal of the set. Completes with the number of
    /// the signal that was delivered.
    fn async_wait_signal_erased(&mut self, continuation: ErasedContinuation<(Status, i32)>);
}

/// Generic entry points for [`AsyncReadable`].
pub trait AsyncReadableExt: AsyncReadable {
    /// Reads at most `max_len` bytes into `buffer` and completes `token`
    /// with the status and the number of bytes read.
    ///
    /// # Examples
    ///
    /// ```
    /// use polyio::{
    ///     buffer::{DynamicBuffer, VecBuffer},
    ///     capability::{AsyncReadableExt, Writable},
    ///     error::Status,
    ///     executor::RunQueue,
    ///     pipe,
    /// };
    ///
    /// let queue = RunQueue::new();
    /// let (mut reader, mut writer) = pipe::connect(&queue.executor());
    /// writer.write_some(b"hello")?;
    ///
    /// let buffer = DynamicBuffer::new(VecBuffer::new());
    /// reader.async_read_some(buffer.clone(), 16, |status: Status, n: usize| {
    ///     assert_eq!((status, n), (Ok(()), 5));
    /// })?;
    ///
    /// queue.run();
    /// assert_eq!(buffer.to_vec(), b"hello");
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    fn async_read_some<T>(&mut self, buffer: DynamicBuffer, max_len: usize, token: T) -> T::Output
    where
        T: CompletionToken<(Status, usize)>,
    {
        let executor = self.executor();
        token.initiate(&executor, |continuation| {
            self.async_read_some_erased(buffer, max_len, continuation)
        })
    }
}

impl<T: AsyncReadable + ?Sized> AsyncReadableExt for T {}

/// Generic entry points for [`AsyncWritable`].
pub trait AsyncWritableExt: AsyncWritable {
    /// Writes bytes from the front of `buffer` and completes `token` with
    /// the status and the number of bytes written.
    fn async_write_some<T>(&mut self, buffer: DynamicBuffer, token: T) -> T::Output
    where
        T: CompletionToken<(Status, usize)>,
    {
        let executor = self.executor();
        token.initiate(&executor, |continuation| {
            self.async_write_some_erased(buffer, usize::MAX, continuation)
        })
    }
}

impl<T: AsyncWritable + ?Sized> AsyncWritableExt for T {}

/// Generic entry points for [`AsyncRandomAccessReadable`].
pub trait AsyncRandomAccessReadableExt: AsyncRandomAccessReadable {
    /// Reads at most `max_len` bytes at `offset` into `buffer`.
    fn async_read_some_at<T>(
        &mut self,
        offset: u64,
        buffer: DynamicBuffer,
        max_len: usize,
        token: T,
    ) -> T::Output
    where
        T: CompletionToken<(Status, usize)>,
    {
        let executor = self.executor();
        token.initiate(&executor, |continuation| {
            self.async_read_some_at_erased(offset, buffer, max_len, continuation)
        })
    }
}

impl<T: AsyncRandomAccessReadable + ?Sized> AsyncRandomAccessReadableExt for T {}

/// Generic entry points for [`AsyncRandomAccessWritable`].
pub trait AsyncRandomAccessWritableExt: AsyncRandomAccessWritable {
    /// Writes bytes from the front of `buffer` at `offset`.
    fn async_write_some_at<T>(&mut self, offset: u64, buffer: DynamicBuffer, token: T) -> T::Output
    where
        T: CompletionToken<(Status, usize)>,
    {
        let executor = self.executor();
        token.initiate(&executor, |continuation| {
            self.async_write_some_at_erased(offset, buffer, usize::MAX, continuation)
        })
    }
}

impl<T: AsyncRandomAccessWritable + ?Sized> AsyncRandomAccessWritableExt for T {}

/// Generic entry points for [`AsyncWaitable`].
pub trait AsyncWaitableExt: AsyncWaitable {
    /// Waits until the device is ready for `wait_type`.
    fn async_wait<T>(&mut self, wait_type: WaitType, token: T) -> T::Output
    where
        T: CompletionToken<(Status,)>,
    {
        let executor = self.executor();
        token.initiate(&executor, |continuation| {
            self.async_wait_erased(wait_type, continuation)
        })
    }
}

impl<T: AsyncWaitable + ?Sized> AsyncWaitableExt for T {}

/// Generic entry points for [`AsyncTimedWaitable`].
pub trait AsyncTimedWaitableExt: AsyncTimedWaitable {
    /// Waits until the timer expires.
    fn async_wait_expiry<T>(&mut self, token: T) -> T::Output
    where
        T: CompletionToken<(Status,)>,
    {
        let executor = self.executor();
        token.initiate(&executor, |continuation| {
            self.async_wait_expiry_erased(continuation)
        })
    }
}

impl<T: AsyncTimedWaitable + ?Sized> AsyncTimedWaitableExt for T {}

/// Generic entry points for [`AsyncSignalWaitable`].
pub trait AsyncSignalWaitableExt: AsyncSignalWaitable {
    /// Waits for a signal of the set.
    fn async_wait_signal<T>(&mut self, token: T) -> T::Output
    where
        T: CompletionToken<(Status, i32)>,
    {
        let executor = self.executor();
        token.initiate(&executor, |continuation| {
            self.async_wait_signal_erased(continuation)
        })
    }
}

impl<T: AsyncSignalWaitable + ?Sized> AsyncSignalWaitableExt for T {}
