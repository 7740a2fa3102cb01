//! Integration tests for the polyio crate.
//!
//! ## Continuation Tests
//! - `test_erased_continuation_explicit_arena`: allocation and deallocation
//!   happen on the bound resource, once each
//! - `test_erased_continuation_destroy_returns_memory`: destroying without
//!   invoking returns the box to the resource it came from
//! - `test_erased_continuation_queries_are_stable`: repeated queries before
//!   `invoke` return the same values
//! - `test_missing_slot_is_distinguishable`: no slot is reported as `None`
//!
//! ## Composition Tests
//! - `test_duplex_set_single_execution_context`: one executor reachable from
//!   a `dyn DuplexStream` and its upcasts
//! - `test_duplex_close_during_pending_write`: the pending write completes
//!   exactly once with a failure
//! - `test_duplex_write_completes_when_finished`
//! - `test_pipe_close_during_pending_write`: the same for the pipe
//!
//! ## Buffer Tests
//! - `test_backends_observe_identically`: the same grow/commit/consume
//!   sequence on both backends
//!
//! ## Composite Operation Tests
//! - `test_async_read_exactly_across_writes`
//! - `test_async_read_all_until_eof`
//! - `test_async_read_stops_at_full_buffer`
//! - `test_async_write_all_with_backpressure`
//! - `test_composed_read_cancelled_through_slot`
//! - `test_composed_read_uses_bound_arena`
//! - `test_composed_read_on_other_executor`: every step completes on the
//!   continuation's executor, not the device's
//!
//! ## Future Tests
//! - `test_future_read`
//! - `test_dropped_future_cancels_pipe_read`

use std::{
    alloc::Layout,
    pin::Pin,
    ptr::NonNull,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll, Waker},
};

use polyio::{
    buffer::{DynamicBuffer, RingBuffer, VecBuffer},
    cancel::{CancellationSignal, CancellationType},
    continuation::{ErasedContinuation, bind_allocator, bind_cancellation_slot, bind_executor},
    error::{Error, Status},
    executor::{Executor, RunQueue},
    io,
    memory::{AllocError, Allocator, GlobalResource, MemoryResource, SharedResource},
    pipe,
    prelude::*,
};

/// Counts allocations and deallocations.
#[derive(Default)]
struct Counting {
    allocations: AtomicUsize,
    deallocations: AtomicUsize,
}

impl Counting {
    fn counts(&self) -> (usize, usize) {
        (
            self.allocations.load(Ordering::SeqCst),
            self.deallocations.load(Ordering::SeqCst),
        )
    }
}

/// Shares a `Counting` between the test and the `SharedResource`.
struct Counted(Arc<Counting>);

// SAFETY: every block is obtained from and returned to `GlobalResource`
unsafe impl MemoryResource for Counted {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.0.allocations.fetch_add(1, Ordering::SeqCst);
        GlobalResource.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.0.deallocations.fetch_add(1, Ordering::SeqCst);
        // SAFETY: the block came from `GlobalResource` with this layout
        unsafe { GlobalResource.deallocate(ptr, layout) }
    }
}

fn counted() -> (Arc<Counting>, Allocator) {
    let counting = Arc::new(Counting::default());
    let allocator = Allocator::new(SharedResource::new(Counted(counting.clone())));
    (counting, allocator)
}

type Results = Arc<Mutex<Vec<(Status, usize)>>>;

fn recorder(results: &Results) -> impl FnOnce(Status, usize) + Send + 'static {
    let results = results.clone();
    move |status, n| results.lock().unwrap().push((status, n))
}

fn poll_once<F: Future + Unpin>(future: &mut F) -> Poll<F::Output> {
    let mut cx = Context::from_waker(Waker::noop());
    Pin::new(future).poll(&mut cx)
}

#[test]
fn test_erased_continuation_explicit_arena() {
    let queue = RunQueue::new();
    let (counting, allocator) = counted();
    let results = Results::default();

    let continuation = ErasedContinuation::new(
        bind_allocator(allocator.clone(), recorder(&results)),
        &queue.executor(),
    )
    .unwrap();

    assert_eq!(counting.counts(), (1, 0));
    assert_eq!(continuation.allocator(), allocator);
    assert!(results.lock().unwrap().is_empty());

    continuation.invoke((Ok(()), 42));

    assert_eq!(*results.lock().unwrap(), vec![(Ok(()), 42)]);
    assert_eq!(counting.counts(), (1, 1));
}

#[test]
fn test_erased_continuation_destroy_returns_memory() {
    let queue = RunQueue::new();
    let (counting, allocator) = counted();
    let results = Results::default();

    let continuation = ErasedContinuation::new(
        bind_allocator(allocator, recorder(&results)),
        &queue.executor(),
    )
    .unwrap();
    continuation.destroy();

    assert!(results.lock().unwrap().is_empty());
    assert_eq!(counting.counts(), (1, 1));
    assert_eq!(queue.run(), 0);
}

#[test]
fn test_erased_continuation_queries_are_stable() {
    let device = RunQueue::new();
    let preferred = RunQueue::new();
    let signal = CancellationSignal::new();
    let (_counting, allocator) = counted();

    let continuation = ErasedContinuation::<(Status,)>::new(
        bind_executor(
            preferred.executor(),
            bind_allocator(
                allocator.clone(),
                bind_cancellation_slot(signal.slot(), |_: Status| {}),
            ),
        ),
        &device.executor(),
    )
    .unwrap();

    for _ in 0..3 {
        assert_eq!(continuation.executor(), &preferred.executor());
        assert_ne!(continuation.executor(), &device.executor());
        assert_eq!(continuation.allocator(), allocator);
        assert_eq!(continuation.cancellation_slot(), Some(&signal.slot()));
    }
}

#[test]
fn test_missing_slot_is_distinguishable() {
    let queue = RunQueue::new();
    let signal = CancellationSignal::new();

    let without = ErasedContinuation::<()>::new(|| {}, &queue.executor()).unwrap();
    let with = ErasedContinuation::<()>::new(
        bind_cancellation_slot(signal.slot(), || {}),
        &queue.executor(),
    )
    .unwrap();

    assert_eq!(without.cancellation_slot(), None);
    assert!(with.cancellation_slot().is_some());
}

/// A duplex device whose asynchronous operations stay pending until the test
/// completes them or the device is closed.
#[derive(Clone)]
struct MockDuplex {
    executor: Executor,
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    open: bool,
    written: Vec<u8>,
    pending_read: Option<ErasedContinuation<(Status, usize)>>,
    pending_write: Option<(DynamicBuffer, ErasedContinuation<(Status, usize)>)>,
}

impl MockDuplex {
    fn new(executor: Executor) -> Self {
        Self {
            executor,
            state: Arc::new(Mutex::new(MockState {
                open: true,
                ..MockState::default()
            })),
        }
    }

    fn finish_write(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some((buffer, continuation)) = state.pending_write.take() {
            let bytes = buffer.to_vec();
            buffer.consume(bytes.len());
            state.written.extend_from_slice(&bytes);
            continuation.post((Ok(()), bytes.len()));
        }
    }

    fn abort_all(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(continuation) = state.pending_read.take() {
            continuation.post((Err(Error::Aborted), 0));
        }
        if let Some((_, continuation)) = state.pending_write.take() {
            continuation.post((Err(Error::Aborted), 0));
        }
    }
}

impl ExecutionContextProvider for MockDuplex {
    fn executor(&self) -> Executor {
        self.executor.clone()
    }
}

impl Readable for MockDuplex {
    fn read_some(&mut self, _buf: &mut [u8]) -> Result<usize, Error> {
        Err(Error::WouldBlock)
    }
}

impl Writable for MockDuplex {
    fn write_some(&mut self, buf: &[u8]) -> Result<usize, Error> {
        self.state.lock().unwrap().written.extend_from_slice(buf);
        Ok(buf.len())
    }
}

impl AsyncReadable for MockDuplex {
    fn async_read_some_erased(
        &mut self,
        _buffer: DynamicBuffer,
        _max_len: usize,
        continuation: ErasedContinuation<(Status, usize)>,
    ) {
        self.state.lock().unwrap().pending_read = Some(continuation);
    }
}

impl AsyncWritable for MockDuplex {
    fn async_write_some_erased(
        &mut self,
        buffer: DynamicBuffer,
        _max_len: usize,
        continuation: ErasedContinuation<(Status, usize)>,
    ) {
        let mut state = self.state.lock().unwrap();
        if state.open {
            state.pending_write = Some((buffer, continuation));
        } else {
            continuation.post((Err(Error::Closed), 0));
        }
    }
}

impl Closable for MockDuplex {
    fn close(&mut self) -> Result<(), Error> {
        self.state.lock().unwrap().open = false;
        self.abort_all();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }
}

impl Cancellable for MockDuplex {
    fn cancel(&mut self) -> Result<(), Error> {
        self.abort_all();
        Ok(())
    }
}

fn executor_of(stream: &dyn DuplexStream) -> Executor {
    stream.executor()
}

#[test]
fn test_duplex_set_single_execution_context() {
    let queue = RunQueue::new();
    let mut mock = MockDuplex::new(queue.executor());
    let stream: &mut dyn DuplexStream = &mut mock;

    assert_eq!(executor_of(stream), queue.executor());
    assert_eq!(stream.write_some(b"sync"), Ok(4));
    assert_eq!(stream.read_some(&mut [0; 4]), Err(Error::WouldBlock));

    let read_stream: &dyn ReadStream = &*stream;
    assert_eq!(read_stream.executor(), queue.executor());

    assert_eq!(mock.state.lock().unwrap().written, b"sync");
}

#[test]
fn test_duplex_close_during_pending_write() {
    let queue = RunQueue::new();
    let mut mock = MockDuplex::new(queue.executor());
    let results = Results::default();

    {
        let stream: &mut dyn DuplexStream = &mut mock;
        let buffer = DynamicBuffer::new(VecBuffer::from_vec(b"hello".to_vec()));
        stream.async_write_some(buffer, recorder(&results)).unwrap();
        assert_eq!(queue.run(), 0);

        stream.close().unwrap();
        assert!(!stream.is_open());
    }

    // Completing after the close finds nothing left to complete.
    mock.finish_write();
    queue.run();

    let results = results.lock().unwrap();
    assert_eq!(results.len(), 1);
    assert!(matches!(
        results[0],
        (Err(Error::Aborted | Error::Closed), 0)
    ));
}

#[test]
fn test_duplex_write_completes_when_finished() {
    let queue = RunQueue::new();
    let mut mock = MockDuplex::new(queue.executor());
    let results = Results::default();

    let buffer = DynamicBuffer::new(VecBuffer::from_vec(b"hello".to_vec()));
    mock.async_write_some(buffer.clone(), recorder(&results))
        .unwrap();
    mock.finish_write();
    queue.run();

    assert_eq!(*results.lock().unwrap(), vec![(Ok(()), 5)]);
    assert_eq!(buffer.size(), 0);
    assert_eq!(mock.state.lock().unwrap().written, b"hello");
}

#[test]
fn test_pipe_close_during_pending_write() {
    let queue = RunQueue::new();
    let (_reader, writer) = pipe::connect_with_capacity(&queue.executor(), 2);
    let mut stream: Box<dyn ClosableWriteStream> = Box::new(writer);
    let results = Results::default();

    let buffer = DynamicBuffer::new(VecBuffer::from_vec(b"hello".to_vec()));
    stream.async_write_some(buffer.clone(), recorder(&results)).unwrap();
    queue.run();
    assert_eq!(*results.lock().unwrap(), vec![(Ok(()), 2)]);

    stream.async_write_some(buffer, recorder(&results)).unwrap();
    assert_eq!(queue.run(), 0);

    stream.close().unwrap();
    queue.run();
    assert_eq!(
        *results.lock().unwrap(),
        vec![(Ok(()), 2), (Err(Error::Aborted), 0)]
    );
}

/// Runs the same sequence on a buffer and records what it observes.
fn observe(buffer: &DynamicBuffer) -> Vec<(usize, usize, Vec<u8>)> {
    let mut seen = Vec::new();
    let mut record = |buffer: &DynamicBuffer| {
        seen.push((buffer.size(), buffer.capacity(), buffer.to_vec()));
    };

    buffer.grow(16).unwrap();
    record(buffer);

    {
        let mut guard = buffer.lock();
        guard.data_mut(0, 16).copy_from_slice(b"0123456789abcdef");
        guard.prepare(8).unwrap().copy_from_slice(b"ghijklmn");
        guard.commit(5);
    }
    record(buffer);

    buffer.consume(10);
    record(buffer);

    buffer.extend_from_slice(&[b'x'; 40]).unwrap();
    record(buffer);

    assert!(buffer.grow(64).is_err());
    record(buffer);

    buffer.shrink(30);
    buffer.consume(3);
    record(buffer);

    let mut window = [0u8; 4];
    let n = buffer.copy_to(2, &mut window);
    seen.push((n, 0, window[..n].to_vec()));

    seen
}

#[test]
fn test_backends_observe_identically() {
    let contiguous = DynamicBuffer::new(VecBuffer::with_max_size(64));
    let segmented = DynamicBuffer::new(RingBuffer::with_max_size(64));

    let expected = observe(&contiguous);
    assert_eq!(observe(&segmented), expected);

    assert_eq!(expected[1].0, 21);
    assert_eq!(expected[1].2, b"0123456789abcdefghijk");
    assert_eq!(expected[2].2, b"abcdefghijk");
    assert_eq!(expected[3].0, 51);
    assert_eq!(expected[4].0, 51);
    assert_eq!(expected[5].2, b"defghijkxxxxxxxxxx");
    assert_eq!(expected[6].2, b"fghi");
}

#[test]
fn test_async_read_exactly_across_writes() {
    let queue = RunQueue::new();
    let (reader, mut writer) = pipe::connect(&queue.executor());
    let results = Results::default();
    let buffer = DynamicBuffer::new(VecBuffer::new());

    io::async_read(&reader, buffer.clone(), io::transfer_exactly(6), recorder(&results)).unwrap();

    writer.write_some(b"abc").unwrap();
    queue.run();
    assert!(results.lock().unwrap().is_empty());

    writer.write_some(b"defgh").unwrap();
    queue.run();
    assert_eq!(*results.lock().unwrap(), vec![(Ok(()), 6)]);
    assert_eq!(buffer.to_vec(), b"abcdef");

    let mut rest = [0u8; 2];
    let mut reader = reader;
    assert_eq!(reader.read_some(&mut rest), Ok(2));
    assert_eq!(&rest, b"gh");
}

#[test]
fn test_async_read_all_until_eof() {
    let queue = RunQueue::new();
    let (reader, mut writer) = pipe::connect(&queue.executor());
    let results = Results::default();
    let buffer = DynamicBuffer::new(RingBuffer::new());

    writer.write_some(b"hello").unwrap();
    drop(writer);

    io::async_read(&reader, buffer.clone(), io::transfer_all(), recorder(&results)).unwrap();
    queue.run();

    assert_eq!(*results.lock().unwrap(), vec![(Err(Error::Eof), 5)]);
    assert_eq!(buffer.to_vec(), b"hello");
}

#[test]
fn test_async_read_stops_at_full_buffer() {
    let queue = RunQueue::new();
    let (reader, mut writer) = pipe::connect(&queue.executor());
    let results = Results::default();
    let buffer = DynamicBuffer::new(VecBuffer::with_max_size(4));

    writer.write_some(b"abcdefgh").unwrap();
    io::async_read(&reader, buffer.clone(), io::transfer_all(), recorder(&results)).unwrap();
    queue.run();

    assert_eq!(*results.lock().unwrap(), vec![(Ok(()), 4)]);
    assert_eq!(buffer.to_vec(), b"abcd");
}

#[test]
fn test_async_write_all_with_backpressure() {
    let queue = RunQueue::new();
    let (mut reader, writer) = pipe::connect_with_capacity(&queue.executor(), 4);
    let results = Results::default();
    let buffer = DynamicBuffer::new(VecBuffer::from_vec(b"0123456789".to_vec()));
    let mut received = Vec::new();
    let mut chunk = [0u8; 16];

    io::async_write(&writer, buffer.clone(), io::transfer_all(), recorder(&results)).unwrap();

    for _ in 0..2 {
        queue.run();
        assert!(results.lock().unwrap().is_empty());
        let n = reader.read_some(&mut chunk).unwrap();
        received.extend_from_slice(&chunk[..n]);
    }

    queue.run();
    assert_eq!(*results.lock().unwrap(), vec![(Ok(()), 10)]);
    assert_eq!(buffer.size(), 0);

    let n = reader.read_some(&mut chunk).unwrap();
    received.extend_from_slice(&chunk[..n]);
    assert_eq!(received, b"0123456789");
}

#[test]
fn test_composed_read_cancelled_through_slot() {
    let queue = RunQueue::new();
    let (reader, mut writer) = pipe::connect(&queue.executor());
    let results = Results::default();
    let signal = CancellationSignal::new();
    let buffer = DynamicBuffer::new(VecBuffer::new());

    io::async_read(
        &reader,
        buffer.clone(),
        io::transfer_exactly(8),
        bind_cancellation_slot(signal.slot(), recorder(&results)),
    )
    .unwrap();

    writer.write_some(b"abc").unwrap();
    queue.run();
    assert!(signal.slot().has_handler());

    signal.emit(CancellationType::Partial);
    queue.run();

    assert_eq!(*results.lock().unwrap(), vec![(Err(Error::Aborted), 3)]);
    assert_eq!(buffer.to_vec(), b"abc");
}

#[test]
fn test_composed_read_uses_bound_arena() {
    let queue = RunQueue::new();
    let (reader, mut writer) = pipe::connect(&queue.executor());
    let (counting, allocator) = counted();
    let results = Results::default();

    io::async_read(
        &reader,
        DynamicBuffer::new(VecBuffer::new()),
        io::transfer_exactly(4),
        bind_allocator(allocator, recorder(&results)),
    )
    .unwrap();

    writer.write_some(b"ab").unwrap();
    queue.run();
    writer.write_some(b"cd").unwrap();
    queue.run();

    assert_eq!(*results.lock().unwrap(), vec![(Ok(()), 4)]);
    let (allocations, deallocations) = counting.counts();
    assert_eq!(allocations, 3);
    assert_eq!(deallocations, allocations);
}

#[test]
fn test_composed_read_on_other_executor() {
    let device = RunQueue::new();
    let caller = RunQueue::new();
    let (reader, mut writer) = pipe::connect(&device.executor());
    let results = Results::default();

    writer.write_some(b"data").unwrap();
    io::async_read(
        &reader,
        DynamicBuffer::new(VecBuffer::new()),
        io::transfer_exactly(4),
        bind_executor(caller.executor(), recorder(&results)),
    )
    .unwrap();

    assert_eq!(device.run(), 0);
    assert_eq!(caller.run(), 1);
    assert_eq!(*results.lock().unwrap(), vec![(Ok(()), 4)]);
}

#[test]
fn test_future_read() {
    let queue = RunQueue::new();
    let (mut reader, mut writer) = pipe::connect(&queue.executor());
    let buffer = DynamicBuffer::new(VecBuffer::new());

    let mut read = reader.async_read_some(buffer.clone(), 8, UseFuture).unwrap();
    assert!(poll_once(&mut read).is_pending());

    writer.write_some(b"later").unwrap();
    assert!(poll_once(&mut read).is_pending());

    queue.run();
    assert_eq!(poll_once(&mut read), Poll::Ready((Ok(()), 5)));
    assert_eq!(buffer.to_vec(), b"later");
}

#[test]
fn test_dropped_future_cancels_pipe_read() {
    let queue = RunQueue::new();
    let (mut reader, mut writer) = pipe::connect(&queue.executor());

    let read = reader
        .async_read_some(DynamicBuffer::new(VecBuffer::new()), 8, UseFuture)
        .unwrap();
    drop(read);
    assert_eq!(queue.run(), 1);

    writer.write_some(b"kept").unwrap();
    let mut out = [0u8; 8];
    assert_eq!(reader.read_some(&mut out), Ok(4));
    assert_eq!(&out[..4], b"kept");
}
