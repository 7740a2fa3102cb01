//! Commonly used items for convenient importing.
//!
//! The prelude re-exports the traits needed to call device operations and
//! the capability sets devices are usually handled through. Concrete types
//! such as buffers and executors are imported from their modules.
//!
//! ```
//! use polyio::{executor::RunQueue, pipe, prelude::*};
//!
//! let queue = RunQueue::new();
//! let (reader, writer) = pipe::connect(&queue.executor());
//!
//! let devices: [Box<dyn ExecutionContextProvider>; 2] = [Box::new(reader), Box::new(writer)];
//! assert!(devices.iter().all(|device| device.executor() == queue.executor()));
//! ```

pub use crate::{
    capability::{
        AsyncRandomAccessReadable, AsyncRandomAccessReadableExt, AsyncRandomAccessWritable,
        AsyncRandomAccessWritableExt, AsyncReadable, AsyncReadableExt, AsyncSignalWaitable,
        AsyncSignalWaitableExt, AsyncTimedWaitable, AsyncTimedWaitableExt, AsyncWaitable,
        AsyncWaitableExt, AsyncWritable, AsyncWritableExt, Cancellable, Closable,
        ExecutionContextProvider, RandomAccessReadable, RandomAccessWritable, Readable,
        TimedWaitable, Waitable, Writable,
    },
    capability_set,
    continuation::Continuation,
    initiate::{CompletionToken, UseFuture},
    sets::{
        ClosableReadStream, ClosableWriteStream, DuplexStream, RandomAccessDevice, ReadStream,
        SignalSet, WaitableDevice, WaitableTimer, WriteStream,
    },
};
