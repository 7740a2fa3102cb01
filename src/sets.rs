//! Device contracts composed from capabilities.
//!
//! A capability set is a trait whose supertraits are the capabilities it
//! combines, with a blanket implementation for every type that implements all
//! of them. A device never implements a set directly: implementing the
//! capabilities is enough.
//!
//! Capabilities shared by several members of a set, such as
//! [`ExecutionContextProvider`], exist once in the set. Calling
//! [`executor`](ExecutionContextProvider::executor) on a `dyn DuplexStream` is
//! unambiguous even though both [`AsyncReadable`] and [`AsyncWritable`]
//! require it.
//!
//! # Defining sets
//!
//! New sets are defined with [`capability_set!`](crate::capability_set):
//!
//! ```
//! use polyio::{
//!     capability::{AsyncReadable, Closable, ExecutionContextProvider},
//!     capability_set,
//! };
//!
//! capability_set! {
//!     /// A device that can only be read asynchronously and closed.
//!     pub trait AsyncSource: AsyncReadable, Closable;
//! }
//!
//! fn executor_of(source: &dyn AsyncSource) -> polyio::executor::Executor {
//!     source.executor()
//! }
//! ```

use crate::capability::{
    AsyncRandomAccessReadable, AsyncRandomAccessWritable, AsyncReadable, AsyncSignalWaitable,
    AsyncTimedWaitable, AsyncWaitable, AsyncWritable, Cancellable, Closable, RandomAccessReadable,
    RandomAccessWritable, Readable, TimedWaitable, Waitable, Writable,
};
#[cfg(doc)]
use crate::capability::ExecutionContextProvider;

/// Defines a trait combining capabilities, implemented for every type that
/// implements all of them.
///
/// The generated trait has the listed capabilities as supertraits and no
/// methods of its own. See the [module documentation](crate::sets).
#[macro_export]
macro_rules! capability_set {
    (
        $(#[$meta:meta])*
        $vis:vis trait $name:ident: $first:path $(, $rest:path)* $(,)?;
    ) => {
        $(#[$meta])*
        $vis trait $name: $first $(+ $rest)* {}

        impl<T: ?Sized + $first $(+ $rest)*> $name for T {}
    };
}

capability_set! {
    /// A stream that can be read, blocking or asynchronously.
    pub trait ReadStream: Readable, AsyncReadable;
}

capability_set! {
    /// A stream that can be written, blocking or asynchronously.
    pub trait WriteStream: Writable, AsyncWritable;
}

capability_set! {
    /// A [`ReadStream`] that can be closed and cancelled.
    pub trait ClosableReadStream: ReadStream, Closable, Cancellable;
}

capability_set! {
    /// A [`WriteStream`] that can be closed and cancelled.
    pub trait ClosableWriteStream: WriteStream, Closable, Cancellable;
}

capability_set! {
    /// A stream that can be read and written, closed and cancelled.
    pub trait DuplexStream: ReadStream, WriteStream, Closable, Cancellable;
}

capability_set! {
    /// A device addressed by offset, such as a file.
    pub trait RandomAccessDevice:
        RandomAccessReadable,
        AsyncRandomAccessReadable,
        RandomAccessWritable,
        AsyncRandomAccessWritable,
        Closable,
        Cancellable;
}

capability_set! {
    /// A device that reports readiness, such as a descriptor.
    pub trait WaitableDevice: Waitable, AsyncWaitable, Closable, Cancellable;
}

capability_set! {
    /// A timer.
    pub trait WaitableTimer: TimedWaitable, AsyncTimedWaitable, Cancellable;
}

capability_set! {
    /// A set of process signals.
    pub trait SignalSet: AsyncSignalWaitable, Cancellable;
}
