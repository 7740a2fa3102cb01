//! Completion continuations and their erased form.
//!
//! A continuation is "what to do when an asynchronous operation completes":
//! a value that is called exactly once with the completion arguments. Any
//! closure of matching arity is a continuation:
//!
//! ```
//! use polyio::{continuation::Continuation, error::Status};
//!
//! fn complete_with<K: Continuation<(Status, usize)>>(continuation: K) {
//!     continuation.complete((Ok(()), 42));
//! }
//!
//! complete_with(|status: Status, transferred: usize| {
//!     assert_eq!(status, Ok(()));
//!     assert_eq!(transferred, 42);
//! });
//! ```
//!
//! Besides being callable, a continuation may express three associations:
//!
//! - the [`Allocator`] its erased box should be allocated from,
//! - the [`Executor`] it wants to run on,
//! - a [`CancellationSlot`] through which its operation can be cancelled.
//!
//! Closures have no associations of their own. They are attached with the
//! binders [`bind_executor`], [`bind_allocator`] and
//! [`bind_cancellation_slot`], which can be nested in any order.
//!
//! Devices never see the concrete continuation type. They receive an
//! [`ErasedContinuation`], which boxes the continuation together with its
//! resolved associations.

mod binders;
mod erased;

pub use self::{
    binders::{
        BindAllocator, BindCancellationSlot, BindExecutor, bind_allocator,
        bind_cancellation_slot, bind_executor,
    },
    erased::ErasedContinuation,
};
use crate::{cancel::CancellationSlot, executor::Executor, memory::Allocator};

/// A value called exactly once with the completion arguments `Args`.
///
/// `Args` is a tuple, for example `(Status, usize)` for a read or write.
///
/// # Implementing
///
/// Closures taking up to three arguments implement this trait
/// automatically. Implement it by hand to give a continuation associations
/// of its own:
///
/// ```
/// use polyio::{
///     continuation::Continuation,
///     error::Status,
///     executor::{Executor, RunQueue},
/// };
///
/// struct Report {
///     executor: Executor,
/// }
///
/// impl Continuation<(Status,)> for Report {
///     fn complete(self, (status,): (Status,)) {
///         println!("finished: {status:?}");
///     }
///
///     fn executor(&self) -> Option<Executor> {
///         Some(self.executor.clone())
///     }
/// }
///
/// let queue = RunQueue::new();
/// let report = Report { executor: queue.executor() };
/// assert_eq!(report.executor(), Some(queue.executor()));
/// ```
pub trait Continuation<Args>: Send + 'static {
    /// Runs the continuation with the completion arguments.
    fn complete(self, args: Args);

    /// The allocator the erased box of this continuation is taken from.
    ///
    /// Defaults to the process-wide default resource.
    fn allocator(&self) -> Allocator {
        Allocator::default()
    }

    /// The executor this continuation wants to be completed on, if any.
    fn executor(&self) -> Option<Executor> {
        None
    }

    /// The slot cancellation handlers for this continuation's operation are
    /// installed into, if any.
    fn cancellation_slot(&self) -> Option<CancellationSlot> {
        None
    }
}

macro_rules! impl_continuation_for_fn {
    ($($ty:ident $arg:ident),*) => {
        impl<F, $($ty,)*> Continuation<($($ty,)*)> for F
        where
            F: FnOnce($($ty),*) + Send + 'static,
        {
            #[inline]
            fn complete(self, ($($arg,)*): ($($ty,)*)) {
                self($($arg),*)
            }
        }
    };
}

impl_continuation_for_fn!();
impl_continuation_for_fn!(A a);
impl_continuation_for_fn!(A a, B b);
impl_continuation_for_fn!(A a, B b, C c);
