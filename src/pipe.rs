//! An in-memory byte pipe.
//!
//! [`connect`] returns the two ends of a bounded pipe bound to an executor.
//! The read end implements [`ClosableReadStream`](crate::sets::ClosableReadStream)
//! and the write end [`ClosableWriteStream`](crate::sets::ClosableWriteStream),
//! blocking and asynchronously, so the pipe can stand in for a socket or a
//! serial port in tests and examples.
//!
//! Each end is a cloneable handle. The side is closed explicitly with
//! [`Closable::close`], or when its last handle is dropped.
//!
//! # Completion
//!
//! Asynchronous operations are queued in order and completed through
//! [`ErasedContinuation::post`], never from inside the initiating call.
//! Pending reads are served as data is written, and pending writes as data is
//! read.
//!
//! | Event                  | Pending reads                    | Pending writes    |
//! |------------------------|----------------------------------|-------------------|
//! | read end closed        | [`Error::Aborted`]               | [`Error::Closed`] |
//! | write end closed       | [`Error::Eof`] once data runs out | [`Error::Aborted`] |
//! | `cancel` on an end     | [`Error::Aborted`] (read end)    | [`Error::Aborted`] (write end) |
//! | slot emits             | [`Error::Aborted`]               | [`Error::Aborted`] |
//!
//! # Buffers
//!
//! A write copies the bytes it may send out of its buffer when it starts and
//! consumes the bytes actually sent just before it completes. A read appends
//! what it received just before it completes. Buffers are only locked
//! outside the pipe's own lock, but the thread starting an operation must not
//! hold a [`BufferGuard`](crate::buffer::BufferGuard) of the operation's
//! buffer.

use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak},
};

use crate::{
    buffer::DynamicBuffer,
    capability::{
        AsyncReadable, AsyncWritable, Cancellable, Closable, ExecutionContextProvider, Readable,
        Writable,
    },
    continuation::ErasedContinuation,
    error::{Error, Status},
    executor::Executor,
};

/// Bytes a pipe created by [`connect`] holds before writers have to wait.
pub const DEFAULT_CAPACITY: usize = 65536;

/// Creates a pipe holding up to [`DEFAULT_CAPACITY`] bytes.
pub fn connect(executor: &Executor) -> (ReadablePipe, WritablePipe) {
    connect_with_capacity(executor, DEFAULT_CAPACITY)
}

/// Creates a pipe holding up to `capacity` bytes, at least one.
pub fn connect_with_capacity(executor: &Executor, capacity: usize) -> (ReadablePipe, WritablePipe) {
    let shared = Arc::new(Shared {
        executor: executor.clone(),
        state: Mutex::new(PipeState {
            data: VecDeque::new(),
            capacity: capacity.max(1),
            reader_open: true,
            writer_open: true,
            reads: VecDeque::new(),
            writes: VecDeque::new(),
            next_id: 0,
        }),
        readable: Condvar::new(),
        writable: Condvar::new(),
    });
    tracing::debug!(capacity, "pipe connected");

    let reader = ReadablePipe {
        end: Arc::new(ReadEnd {
            shared: shared.clone(),
        }),
    };
    let writer = WritablePipe {
        end: Arc::new(WriteEnd { shared }),
    };
    (reader, writer)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Side {
    Read,
    Write,
}

/// A queued asynchronous operation.
///
/// The buffer is never touched while the pipe is locked: a write copies its
/// bytes into `bytes` when it starts, and a read collects into `bytes` what
/// it takes from the pipe.
struct Pending {
    id: u64,
    buffer: DynamicBuffer,
    limit: usize,
    bytes: Vec<u8>,
    continuation: ErasedContinuation<(Status, usize)>,
}

/// What has to happen to an operation's buffer before it is completed.
enum Effect {
    None,
    Append(DynamicBuffer, Vec<u8>),
    Consume(DynamicBuffer),
}

/// An operation ready to be completed once the pipe is unlocked.
struct Completion {
    continuation: ErasedContinuation<(Status, usize)>,
    status: Status,
    transferred: usize,
    effect: Effect,
}

impl Completion {
    fn post(self) {
        let args = match self.effect {
            Effect::None => (self.status, self.transferred),
            Effect::Append(buffer, bytes) => match buffer.extend_from_slice(&bytes) {
                Ok(()) => (self.status, self.transferred),
                Err(error) => {
                    tracing::warn!(
                        lost = bytes.len(),
                        "pipe read does not fit its buffer anymore"
                    );
                    (Err(error.into()), 0)
                }
            },
            Effect::Consume(buffer) => {
                buffer.consume(self.transferred);
                (self.status, self.transferred)
            }
        };
        self.continuation.post(args);
    }
}

struct PipeState {
    data: VecDeque<u8>,
    capacity: usize,
    reader_open: bool,
    writer_open: bool,
    reads: VecDeque<Pending>,
    writes: VecDeque<Pending>,
    next_id: u64,
}

impl PipeState {
    fn queue(&mut self, side: Side) -> &mut VecDeque<Pending> {
        match side {
            Side::Read => &mut self.reads,
            Side::Write => &mut self.writes,
        }
    }

    fn space(&self) -> usize {
        self.capacity - self.data.len()
    }

    /// Serves pending operations until none can make progress.
    fn pump(&mut self, done: &mut Vec<Completion>) {
        loop {
            let mut progressed = false;

            while let Some(read) = self.reads.front() {
                let outcome = if !self.data.is_empty() {
                    let n = read.limit.min(self.data.len());
                    Ok(self.data.drain(..n).collect::<Vec<u8>>())
                } else if !self.writer_open {
                    Err(Error::Eof)
                } else {
                    break;
                };

                if let Some(mut read) = self.reads.pop_front() {
                    match outcome {
                        Ok(bytes) => {
                            read.bytes = bytes;
                            settle_read(read, done);
                        }
                        Err(error) => settle(read, Err(error), done),
                    }
                }
                progressed = true;
            }

            while let Some(write) = self.writes.front() {
                let outcome = if !self.reader_open {
                    Err(Error::Closed)
                } else if self.space() > 0 {
                    let n = write.bytes.len().min(self.space());
                    self.data.extend(&write.bytes[..n]);
                    Ok(n)
                } else {
                    break;
                };

                if let Some(write) = self.writes.pop_front() {
                    match outcome {
                        Ok(n) => settle_write(write, n, done),
                        Err(error) => settle(write, Err(error), done),
                    }
                }
                progressed = true;
            }

            if !progressed {
                break;
            }
        }
    }

    /// Completes every operation queued on `side` with `error`.
    fn abort(&mut self, side: Side, error: Error, done: &mut Vec<Completion>) {
        for pending in self.queue(side).drain(..) {
            settle(pending, Err(error.clone()), done);
        }
    }
}

fn clear_slot(continuation: &ErasedContinuation<(Status, usize)>) {
    if let Some(slot) = continuation.cancellation_slot() {
        slot.clear();
    }
}

/// Completes `pending` without moving any bytes.
fn settle(pending: Pending, status: Status, done: &mut Vec<Completion>) {
    clear_slot(&pending.continuation);
    done.push(Completion {
        continuation: pending.continuation,
        status,
        transferred: 0,
        effect: Effect::None,
    });
}

fn settle_read(read: Pending, done: &mut Vec<Completion>) {
    clear_slot(&read.continuation);
    done.push(Completion {
        continuation: read.continuation,
        status: Ok(()),
        transferred: read.bytes.len(),
        effect: Effect::Append(read.buffer, read.bytes),
    });
}

fn settle_write(write: Pending, n: usize, done: &mut Vec<Completion>) {
    clear_slot(&write.continuation);
    done.push(Completion {
        continuation: write.continuation,
        status: Ok(()),
        transferred: n,
        effect: Effect::Consume(write.buffer),
    });
}

fn post_all(done: Vec<Completion>) {
    for completion in done {
        completion.post();
    }
}

struct Shared {
    executor: Executor,
    state: Mutex<PipeState>,
    readable: Condvar,
    writable: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PipeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.readable.notify_all();
        self.writable.notify_all();
    }

    /// Queues an asynchronous operation.
    ///
    /// The buffer is inspected here, before the pipe is locked, so it must
    /// not be locked by the calling thread.
    fn start(
        self: &Arc<Self>,
        side: Side,
        buffer: DynamicBuffer,
        max_len: usize,
        continuation: ErasedContinuation<(Status, usize)>,
    ) {
        let (limit, bytes) = match side {
            Side::Read => (max_len.min(buffer.remaining()), Vec::new()),
            Side::Write => {
                let mut bytes = vec![0; max_len.min(buffer.size())];
                let n = buffer.copy_to(0, &mut bytes);
                bytes.truncate(n);
                (n, bytes)
            }
        };
        let pending = Pending {
            id: 0,
            buffer,
            limit,
            bytes,
            continuation,
        };

        let mut done = Vec::new();
        {
            let mut state = self.lock();
            let open = match side {
                Side::Read => state.reader_open,
                Side::Write => state.writer_open,
            };

            if !open {
                settle(pending, Err(Error::Closed), &mut done);
            } else if limit == 0 {
                settle(pending, Ok(()), &mut done);
            } else {
                let id = state.next_id;
                state.next_id += 1;

                if let Some(slot) = pending.continuation.cancellation_slot() {
                    let shared = Arc::downgrade(self);
                    slot.assign(move |kind| {
                        tracing::debug!(?kind, ?side, id, "pipe operation cancelled");
                        cancel_one(&shared, side, id);
                    });
                }

                state.queue(side).push_back(Pending { id, ..pending });
                state.pump(&mut done);
            }
        }

        self.notify();
        post_all(done);
    }

    fn close(&self, side: Side) {
        let mut done = Vec::new();
        {
            let mut state = self.lock();
            match side {
                Side::Read if state.reader_open => {
                    state.reader_open = false;
                    state.data.clear();
                }
                Side::Write if state.writer_open => state.writer_open = false,
                _ => return,
            }
            state.abort(side, Error::Aborted, &mut done);
            state.pump(&mut done);
        }
        tracing::debug!(?side, "pipe end closed");

        self.notify();
        post_all(done);
    }

    fn cancel(&self, side: Side) {
        let mut done = Vec::new();
        self.lock().abort(side, Error::Aborted, &mut done);
        tracing::trace!(?side, count = done.len(), "pipe operations cancelled");
        post_all(done);
    }
}

fn cancel_one(shared: &Weak<Shared>, side: Side, id: u64) {
    let Some(shared) = shared.upgrade() else {
        return;
    };

    let pending = {
        let mut state = shared.lock();
        let queue = state.queue(side);
        queue
            .iter()
            .position(|pending| pending.id == id)
            .and_then(|index| queue.remove(index))
    };

    if let Some(pending) = pending {
        let mut done = Vec::new();
        settle(pending, Err(Error::Aborted), &mut done);
        post_all(done);
    }
}

struct ReadEnd {
    shared: Arc<Shared>,
}

impl Drop for ReadEnd {
    fn drop(&mut self) {
        self.shared.close(Side::Read);
    }
}

struct WriteEnd {
    shared: Arc<Shared>,
}

impl Drop for WriteEnd {
    fn drop(&mut self) {
        self.shared.close(Side::Write);
    }
}

/// The read end of a pipe.
#[derive(Clone)]
pub struct ReadablePipe {
    end: Arc<ReadEnd>,
}

/// The write end of a pipe.
#[derive(Clone)]
pub struct WritablePipe {
    end: Arc<WriteEnd>,
}

impl ExecutionContextProvider for ReadablePipe {
    fn executor(&self) -> Executor {
        self.end.shared.executor.clone()
    }
}

impl ExecutionContextProvider for WritablePipe {
    fn executor(&self) -> Executor {
        self.end.shared.executor.clone()
    }
}

impl Readable for ReadablePipe {
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let shared = &self.end.shared;
        let mut done = Vec::new();
        let mut state = shared.lock();
        let n = loop {
            if !state.reader_open {
                return Err(Error::Closed);
            }
            if buf.is_empty() {
                return Ok(0);
            }
            if !state.data.is_empty() {
                let n = buf.len().min(state.data.len());
                for (dst, src) in buf.iter_mut().zip(state.data.drain(..n)) {
                    *dst = src;
                }
                break n;
            }
            if !state.writer_open {
                return Err(Error::Eof);
            }
            state = shared
                .readable
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        };

        state.pump(&mut done);
        drop(state);
        shared.notify();
        post_all(done);
        Ok(n)
    }
}

impl Writable for WritablePipe {
    fn write_some(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let shared = &self.end.shared;
        let mut done = Vec::new();
        let mut state = shared.lock();
        let n = loop {
            if !state.writer_open || !state.reader_open {
                return Err(Error::Closed);
            }
            if buf.is_empty() {
                return Ok(0);
            }
            if state.space() > 0 {
                let n = buf.len().min(state.space());
                state.data.extend(&buf[..n]);
                break n;
            }
            state = shared
                .writable
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        };

        state.pump(&mut done);
        drop(state);
        shared.notify();
        post_all(done);
        Ok(n)
    }
}

impl AsyncReadable for ReadablePipe {
    fn async_read_some_erased(
        &mut self,
        buffer: DynamicBuffer,
        max_len: usize,
        continuation: ErasedContinuation<(Status, usize)>,
    ) {
        self.end
            .shared
            .start(Side::Read, buffer, max_len, continuation)
    }
}

impl AsyncWritable for WritablePipe {
    fn async_write_some_erased(
        &mut self,
        buffer: DynamicBuffer,
        max_len: usize,
        continuation: ErasedContinuation<(Status, usize)>,
    ) {
        self.end
            .shared
            .start(Side::Write, buffer, max_len, continuation)
    }
}

impl Closable for ReadablePipe {
    fn close(&mut self) -> Result<(), Error> {
        self.end.shared.close(Side::Read);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.end.shared.lock().reader_open
    }
}

impl Closable for WritablePipe {
    fn close(&mut self) -> Result<(), Error> {
        self.end.shared.close(Side::Write);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.end.shared.lock().writer_open
    }
}

impl Cancellable for ReadablePipe {
    fn cancel(&mut self) -> Result<(), Error> {
        self.end.shared.cancel(Side::Read);
        Ok(())
    }
}

impl Cancellable for WritablePipe {
    fn cancel(&mut self) -> Result<(), Error> {
        self.end.shared.cancel(Side::Write);
        Ok(())
    }
}

impl fmt::Debug for ReadablePipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.end.shared.lock();
        f.debug_struct("ReadablePipe")
            .field("open", &state.reader_open)
            .field("buffered", &state.data.len())
            .field("pending", &state.reads.len())
            .finish()
    }
}

impl fmt::Debug for WritablePipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.end.shared.lock();
        f.debug_struct("WritablePipe")
            .field("open", &state.writer_open)
            .field("buffered", &state.data.len())
            .field("pending", &state.writes.len())
            .finish()
    }
}
