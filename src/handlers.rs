//! Strategies for completing erased continuations.
//!
//! An [`ErasedContinuation`](crate::continuation::ErasedContinuation) stores a
//! value together with a handler type that knows how to call it. Values
//! erased with [`ErasedContinuation::new`] use [`Complete`], which forwards to
//! [`Continuation::complete`]. Values that are not continuations themselves
//! can be erased with
//! [`ErasedContinuation::new_custom`](crate::continuation::ErasedContinuation::new_custom)
//! and a handler of their own.
//!
//! [`ErasedContinuation::new`]: crate::continuation::ErasedContinuation::new

pub use polyio_internals::handlers::ContinuationHandler;

use crate::continuation::Continuation;

/// Handler that calls [`Continuation::complete`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Complete;

impl<K, Args> ContinuationHandler<K, Args> for Complete
where
    K: Continuation<Args>,
    Args: 'static,
{
    #[inline]
    fn invoke(continuation: K, args: Args) {
        continuation.complete(args)
    }
}
