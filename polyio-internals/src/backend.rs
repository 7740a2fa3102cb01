//! The contract implemented by growable byte buffers.
//!
//! A [`BufferBackend`] stores a sequence of readable bytes and knows how to
//! make room for more. The model has two ways of adding bytes:
//!
//! - **prepare / commit**: [`prepare`](BufferBackend::prepare) exposes a
//!   writable region after the readable bytes, and
//!   [`commit`](BufferBackend::commit) moves a prefix of that region into the
//!   readable sequence. This suits protocols that do not know in advance how
//!   many bytes a read will produce.
//! - **grow**: [`grow`](BufferBackend::grow) extends the readable sequence
//!   directly with zeroed bytes that can then be overwritten through
//!   [`data_mut`](BufferBackend::data_mut).
//!
//! Bytes leave the buffer from the front through
//! [`consume`](BufferBackend::consume) or from the back through
//! [`shrink`](BufferBackend::shrink).

use core::fmt;

/// Errors reported by [`BufferBackend`] operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum BufferError {
    /// The operation would take the buffer past its maximum size.
    LengthExceeded {
        /// The number of bytes the operation asked for.
        requested: usize,
        /// The number of bytes that could still be added.
        available: usize,
    },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::LengthExceeded {
                requested,
                available,
            } => write!(
                f,
                "buffer length exceeded: requested {requested} bytes, {available} available"
            ),
        }
    }
}

impl core::error::Error for BufferError {}

/// A growable byte buffer.
///
/// Implementations never fail for out-of-range arguments on the removing
/// side: [`consume`](BufferBackend::consume), [`shrink`](BufferBackend::shrink)
/// and [`commit`](BufferBackend::commit) clamp to what is available, and
/// windows returned by [`data`](BufferBackend::data) are truncated to the
/// readable bytes.
///
/// The only failure is growth beyond [`max_size`](BufferBackend::max_size).
pub trait BufferBackend: Send + 'static {
    /// The number of readable bytes.
    fn size(&self) -> usize;

    /// The largest value [`size`](BufferBackend::size) may reach.
    fn max_size(&self) -> usize;

    /// The number of bytes the buffer can hold without reallocating, never
    /// more than [`max_size`](BufferBackend::max_size).
    fn capacity(&self) -> usize;

    /// Returns the readable bytes in `pos..pos + n`, truncated to
    /// [`size`](BufferBackend::size).
    ///
    /// This takes `&mut self` so that segmented buffers may make the window
    /// contiguous first.
    fn data(&mut self, pos: usize, n: usize) -> &[u8];

    /// Mutable version of [`data`](BufferBackend::data).
    fn data_mut(&mut self, pos: usize, n: usize) -> &mut [u8];

    /// Returns a writable region of exactly `n` bytes located after the
    /// readable bytes.
    ///
    /// The region is not readable until it is committed. Preparing again
    /// discards any uncommitted bytes of an earlier region.
    fn prepare(&mut self, n: usize) -> Result<&mut [u8], BufferError>;

    /// Moves up to `n` bytes from the start of the prepared region into the
    /// readable sequence. Uncommitted bytes are discarded.
    fn commit(&mut self, n: usize);

    /// Appends `n` zeroed bytes to the readable sequence.
    fn grow(&mut self, n: usize) -> Result<(), BufferError>;

    /// Removes up to `n` bytes from the end of the readable sequence.
    fn shrink(&mut self, n: usize);

    /// Removes up to `n` bytes from the start of the readable sequence.
    fn consume(&mut self, n: usize);
}

/// Checks that `n` more bytes fit into a buffer holding `size` bytes.
///
/// Helper for implementations of [`BufferBackend::prepare`] and
/// [`BufferBackend::grow`].
#[inline]
pub fn check_growth(size: usize, max_size: usize, n: usize) -> Result<(), BufferError> {
    let available = max_size.saturating_sub(size);
    if n > available {
        Err(BufferError::LengthExceeded {
            requested: n,
            available,
        })
    } else {
        Ok(())
    }
}
