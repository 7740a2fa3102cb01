//! Failure classification delivered to completion continuations.
//!
//! Asynchronous operations never return errors from the initiating call.
//! Instead, the first argument every continuation receives is a [`Status`]:
//! `Ok(())` when the operation succeeded, or an [`Error`] describing why it
//! did not. Synchronous counterparts return `Result<T, Error>` directly.
//!
//! The only error reported synchronously by an initiating call is
//! [`AllocError`], when the continuation could not be boxed.
//!
//! ```
//! use polyio::error::{Error, Status};
//!
//! fn describe(status: &Status, transferred: usize) -> String {
//!     match status {
//!         Ok(()) => format!("moved {transferred} bytes"),
//!         Err(Error::Aborted) => "cancelled".to_owned(),
//!         Err(error) => format!("failed: {error}"),
//!     }
//! }
//!
//! assert_eq!(describe(&Ok(()), 5), "moved 5 bytes");
//! assert_eq!(describe(&Err(Error::Eof), 0), "failed: end of file");
//! ```

use std::io;

use polyio_internals::{backend::BufferError, memory::AllocError};

/// The failure indicator passed as the first argument to continuations.
///
/// `Ok(())` is the explicit "no failure" value.
pub type Status = Result<(), Error>;

/// Classification of an operation-level failure.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The operation was cancelled or the device was closed while the
    /// operation was pending.
    #[error("operation aborted")]
    Aborted,
    /// The device is closed.
    #[error("device closed")]
    Closed,
    /// The peer closed its end and no more data will arrive.
    #[error("end of file")]
    Eof,
    /// A timed wait expired before the awaited condition occurred.
    #[error("operation timed out")]
    TimedOut,
    /// A synchronous operation could not complete without blocking.
    #[error("operation would block")]
    WouldBlock,
    /// The device does not support the requested operation.
    #[error("operation not supported")]
    Unsupported,
    /// A buffer could not grow to hold the data.
    #[error(transparent)]
    Buffer(#[from] BufferError),
    /// A continuation could not be allocated.
    #[error(transparent)]
    Alloc(#[from] AllocError),
    /// Any other failure reported by the operating system.
    #[error("i/o error: {0}")]
    Io(io::ErrorKind),
}

impl Error {
    /// Returns `true` if this error reports cancellation.
    #[inline]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }

    /// Returns `true` if this error reports the end of a stream.
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::Eof)
    }
}

impl From<io::ErrorKind> for Error {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::UnexpectedEof => Error::Eof,
            io::ErrorKind::TimedOut => Error::TimedOut,
            io::ErrorKind::WouldBlock => Error::WouldBlock,
            io::ErrorKind::Unsupported => Error::Unsupported,
            io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected => Error::Closed,
            io::ErrorKind::Interrupted => Error::Aborted,
            other => Error::Io(other),
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        error.kind().into()
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        let kind = match &error {
            Error::Aborted => io::ErrorKind::Interrupted,
            Error::Closed => io::ErrorKind::BrokenPipe,
            Error::Eof => io::ErrorKind::UnexpectedEof,
            Error::TimedOut => io::ErrorKind::TimedOut,
            Error::WouldBlock => io::ErrorKind::WouldBlock,
            Error::Unsupported => io::ErrorKind::Unsupported,
            Error::Buffer(_) => io::ErrorKind::OutOfMemory,
            Error::Alloc(_) => io::ErrorKind::OutOfMemory,
            Error::Io(kind) => *kind,
        };
        io::Error::new(kind, error)
    }
}
