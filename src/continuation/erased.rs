use core::{any::TypeId, fmt};

use polyio_internals::{RawContinuation, RawContinuationRef};

use super::Continuation;
use crate::{
    cancel::CancellationSlot,
    executor::{Executor, Job},
    handlers::{Complete, ContinuationHandler},
    memory::{AllocError, Allocator, SharedResource},
};

/// Associations resolved when the continuation was erased.
struct Associations {
    executor: Executor,
    slot: Option<CancellationSlot>,
}

/// A boxed continuation of unknown type, completed with `Args`.
///
/// This is the single concrete continuation type that asynchronous device
/// methods accept. It owns exactly one continuation and is consumed by
/// [`invoke`](Self::invoke), so it can be completed at most once. Dropping
/// it without invoking destroys the continuation without calling it.
///
/// The box is allocated once, from the resource named by the continuation's
/// [`Allocator`], and returned to that same resource when the continuation is
/// invoked or destroyed. On invocation the box is freed *before* the
/// continuation runs, so a continuation may immediately start another
/// operation that allocates from the same resource.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use polyio::{
///     continuation::ErasedContinuation,
///     error::Status,
///     executor::RunQueue,
/// };
///
/// let queue = RunQueue::new();
/// let seen = Arc::new(Mutex::new(None));
///
/// let s = seen.clone();
/// let erased = ErasedContinuation::<(Status, usize)>::new(
///     move |status: Status, transferred: usize| {
///         *s.lock().unwrap() = Some((status, transferred));
///     },
///     &queue.executor(),
/// )?;
///
/// assert_eq!(erased.executor(), &queue.executor());
/// assert!(erased.cancellation_slot().is_none());
///
/// erased.invoke((Ok(()), 42));
/// assert_eq!(*seen.lock().unwrap(), Some((Ok(()), 42)));
/// # Ok::<(), polyio::memory::AllocError>(())
/// ```
pub struct ErasedContinuation<Args: 'static> {
    raw: Option<RawContinuation<Args, Associations>>,
}

// SAFETY: The box only ever holds a value of a type implementing
// `Continuation<Args>` (which requires `Send`) or a `Send` value passed to
// `new_custom`, next to `Associations` and the resource handle, which are both
// `Send`. No value of type `Args` is stored.
unsafe impl<Args: 'static> Send for ErasedContinuation<Args> {}

impl<Args: 'static> ErasedContinuation<Args> {
    /// Erases `continuation`.
    ///
    /// The executor of the erased continuation is the continuation's own
    /// executor, or `fallback` if it has none. The box is allocated from the
    /// continuation's allocator.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] if the resource could not provide memory for
    /// the box. The continuation is dropped without being called.
    pub fn new<K>(continuation: K, fallback: &Executor) -> Result<Self, AllocError>
    where
        K: Continuation<Args>,
    {
        Self::try_new(continuation, fallback).map_err(|(error, _)| error)
    }

    /// Like [`ErasedContinuation::new`], but hands the continuation back if
    /// the allocation fails, so that it can still be completed.
    ///
    /// Composed operations use this to report an allocation failure in a
    /// later step through the continuation instead of losing it.
    pub fn try_new<K>(continuation: K, fallback: &Executor) -> Result<Self, (AllocError, K)>
    where
        K: Continuation<Args>,
    {
        let executor = continuation
            .executor()
            .unwrap_or_else(|| fallback.clone());
        let slot = continuation.cancellation_slot();
        let allocator = continuation.allocator();

        Self::erase::<K, Complete>(continuation, executor, &allocator, slot)
    }

    /// Erases a value that is completed through the handler `H` instead of
    /// [`Continuation::complete`].
    ///
    /// The associations are given explicitly, since `value` need not be a
    /// [`Continuation`].
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] if the resource could not provide memory for
    /// the box.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Mutex;
    ///
    /// use polyio::{
    ///     continuation::ErasedContinuation,
    ///     executor::RunQueue,
    ///     handlers::ContinuationHandler,
    ///     memory::Allocator,
    /// };
    ///
    /// static LOG: Mutex<Vec<(&str, i32)>> = Mutex::new(Vec::new());
    ///
    /// struct Label(&'static str);
    /// struct Record;
    ///
    /// impl ContinuationHandler<Label, (i32,)> for Record {
    ///     fn invoke(label: Label, (signal,): (i32,)) {
    ///         LOG.lock().unwrap().push((label.0, signal));
    ///     }
    /// }
    ///
    /// let queue = RunQueue::new();
    /// let erased = ErasedContinuation::new_custom::<_, Record>(
    ///     Label("shutdown"),
    ///     queue.executor(),
    ///     &Allocator::default(),
    ///     None,
    /// )?;
    /// erased.invoke((15,));
    ///
    /// assert_eq!(*LOG.lock().unwrap(), vec![("shutdown", 15)]);
    /// # Ok::<(), polyio::memory::AllocError>(())
    /// ```
    pub fn new_custom<C, H>(
        value: C,
        executor: Executor,
        allocator: &Allocator,
        slot: Option<CancellationSlot>,
    ) -> Result<Self, AllocError>
    where
        C: Send + 'static,
        H: ContinuationHandler<C, Args>,
    {
        Self::erase::<C, H>(value, executor, allocator, slot).map_err(|(error, _)| error)
    }

    fn erase<C, H>(
        value: C,
        executor: Executor,
        allocator: &Allocator,
        slot: Option<CancellationSlot>,
    ) -> Result<Self, (AllocError, C)>
    where
        C: Send + 'static,
        H: ContinuationHandler<C, Args>,
    {
        let resource = allocator.resolve();
        let resource_addr = resource.addr();
        let associations = Associations { executor, slot };

        match RawContinuation::new_or_return::<C, H>(value, associations, resource) {
            Ok(raw) => {
                tracing::trace!(
                    continuation = core::any::type_name::<C>(),
                    resource = resource_addr,
                    "continuation erased"
                );
                Ok(Self { raw: Some(raw) })
            }
            Err((error, value, _)) => {
                tracing::debug!(
                    continuation = core::any::type_name::<C>(),
                    resource = resource_addr,
                    "continuation allocation failed"
                );
                Err((error, value))
            }
        }
    }

    fn raw(&self) -> RawContinuationRef<'_, Args, Associations> {
        match &self.raw {
            Some(raw) => raw.as_ref(),
            None => unreachable!("erased continuation used after it was consumed"),
        }
    }

    fn into_raw(mut self) -> RawContinuation<Args, Associations> {
        match self.raw.take() {
            Some(raw) => raw,
            None => unreachable!("erased continuation used after it was consumed"),
        }
    }

    /// Completes the operation: frees the box, then calls the continuation
    /// with `args`.
    pub fn invoke(self, args: Args) {
        let raw = self.into_raw();
        tracing::trace!(
            continuation = raw.as_ref().continuation_type_name(),
            "invoking continuation"
        );
        raw.invoke(args)
    }

    /// Destroys the continuation without calling it.
    ///
    /// Equivalent to dropping the value.
    pub fn destroy(self) {
        drop(self)
    }

    /// The executor the continuation is completed on.
    pub fn executor(&self) -> &Executor {
        &self.raw().meta().executor
    }

    /// The allocator the box was allocated from.
    ///
    /// This always names the resolved resource explicitly, even when the
    /// continuation deferred to the default resource.
    pub fn allocator(&self) -> Allocator {
        Allocator::new(self.resource().clone())
    }

    /// The resource the box was allocated from.
    pub fn resource(&self) -> &SharedResource {
        self.raw().resource()
    }

    /// The cancellation slot of the continuation, or `None` if it has none.
    pub fn cancellation_slot(&self) -> Option<&CancellationSlot> {
        self.raw().meta().slot.as_ref()
    }

    /// The [`TypeId`] of the boxed continuation.
    pub fn continuation_type_id(&self) -> TypeId {
        self.raw().continuation_type_id()
    }

    /// The type name of the boxed continuation, for diagnostics.
    pub fn continuation_type_name(&self) -> &'static str {
        self.raw().continuation_type_name()
    }
}

impl<Args: Send + 'static> ErasedContinuation<Args> {
    /// Invokes the continuation with `args` from a job posted to its
    /// executor.
    pub fn post(self, args: Args) {
        let executor = self.executor().clone();
        executor.post(Job::new(move || self.invoke(args)));
    }

    /// Invokes the continuation with `args` through its executor's
    /// [`dispatch`](Executor::dispatch), which runs it inline when already
    /// on that executor.
    pub fn dispatch(self, args: Args) {
        let executor = self.executor().clone();
        executor.dispatch(Job::new(move || self.invoke(args)));
    }

    /// Invokes the continuation with `args` from a job deferred to its
    /// executor.
    pub fn defer(self, args: Args) {
        let executor = self.executor().clone();
        executor.defer(Job::new(move || self.invoke(args)));
    }
}

impl<Args: 'static> Continuation<Args> for ErasedContinuation<Args> {
    fn complete(self, args: Args) {
        self.invoke(args)
    }

    fn allocator(&self) -> Allocator {
        ErasedContinuation::allocator(self)
    }

    fn executor(&self) -> Option<Executor> {
        Some(ErasedContinuation::executor(self).clone())
    }

    fn cancellation_slot(&self) -> Option<CancellationSlot> {
        ErasedContinuation::cancellation_slot(self).cloned()
    }
}

impl<Args: 'static> Drop for ErasedContinuation<Args> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            tracing::trace!(
                continuation = raw.as_ref().continuation_type_name(),
                "continuation destroyed without being invoked"
            );
        }
    }
}

impl<Args: 'static> fmt::Debug for ErasedContinuation<Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.raw {
            Some(raw) => {
                let raw = raw.as_ref();
                f.debug_struct("ErasedContinuation")
                    .field("continuation", &raw.continuation_type_name())
                    .field("executor", &raw.meta().executor)
                    .field("resource", raw.resource())
                    .field("slot", &raw.meta().slot)
                    .finish()
            }
            None => f.write_str("ErasedContinuation(<consumed>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        alloc::Layout,
        ptr::NonNull,
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use super::*;
    use crate::{
        cancel::CancellationSignal,
        continuation::{bind_allocator, bind_cancellation_slot, bind_executor},
        error::Status,
        executor::RunQueue,
        memory::{GlobalResource, MemoryResource},
    };

    /// Fails every allocation.
    struct Exhausted;

    // SAFETY: never hands out memory
    unsafe impl MemoryResource for Exhausted {
        fn allocate(&self, _layout: Layout) -> Result<NonNull<u8>, AllocError> {
            Err(AllocError)
        }

        unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
            unreachable!("nothing was allocated")
        }
    }

    #[test]
    fn test_erased_continuation_size() {
        assert_eq!(
            size_of::<ErasedContinuation<(Status, usize)>>(),
            size_of::<usize>()
        );
    }

    #[test]
    fn test_fallback_executor_used_without_preference() {
        let queue = RunQueue::new();
        let erased = ErasedContinuation::<(Status,)>::new(|_: Status| {}, &queue.executor()).unwrap();

        assert_eq!(erased.executor(), &queue.executor());
        assert!(erased.cancellation_slot().is_none());
    }

    #[test]
    fn test_own_executor_takes_precedence() {
        let device = RunQueue::new();
        let own = RunQueue::new();

        let erased = ErasedContinuation::<(Status,)>::new(
            bind_executor(own.executor(), |_: Status| {}),
            &device.executor(),
        )
        .unwrap();

        assert_eq!(erased.executor(), &own.executor());
        assert_ne!(erased.executor(), &device.executor());
    }

    #[test]
    fn test_queries_are_stable() {
        let queue = RunQueue::new();
        let signal = CancellationSignal::new();
        let arena = SharedResource::new(GlobalResource);

        let erased = ErasedContinuation::<(Status,)>::new(
            bind_cancellation_slot(
                signal.slot(),
                bind_allocator(Allocator::new(arena.clone()), |_: Status| {}),
            ),
            &queue.executor(),
        )
        .unwrap();

        for _ in 0..3 {
            assert_eq!(erased.executor(), &queue.executor());
            assert_eq!(erased.allocator(), Allocator::new(arena.clone()));
            assert_eq!(erased.cancellation_slot(), Some(&signal.slot()));
        }
    }

    #[test]
    fn test_allocation_failure_drops_continuation() {
        let queue = RunQueue::new();
        let marker = Arc::new(());

        let captured = marker.clone();
        let result = ErasedContinuation::<(Status,)>::new(
            bind_allocator(
                Allocator::new(SharedResource::new(Exhausted)),
                move |_: Status| drop(captured),
            ),
            &queue.executor(),
        );

        assert_eq!(result.err(), Some(AllocError));
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_try_new_returns_continuation() {
        let queue = RunQueue::new();
        let seen = Arc::new(Mutex::new(None));

        let s = seen.clone();
        let result = ErasedContinuation::<(Status,)>::try_new(
            bind_allocator(
                Allocator::new(SharedResource::new(Exhausted)),
                move |status: Status| *s.lock().unwrap() = Some(status),
            ),
            &queue.executor(),
        );

        let Err((error, continuation)) = result else {
            panic!("allocation should have been refused");
        };
        continuation.complete((Err(error.into()),));
        assert_eq!(
            *seen.lock().unwrap(),
            Some(Err(crate::error::Error::Alloc(AllocError)))
        );
    }

    #[test]
    fn test_post_runs_on_executor() {
        let queue = RunQueue::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let erased = ErasedContinuation::<(usize,)>::new(
            move |n: usize| {
                c.fetch_add(n, Ordering::SeqCst);
            },
            &queue.executor(),
        )
        .unwrap();

        erased.post((5,));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(queue.run(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_erased_continuation_nests() {
        let queue = RunQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        let inner = ErasedContinuation::<(u8,)>::new(
            move |value: u8| s.lock().unwrap().push(value),
            &queue.executor(),
        )
        .unwrap();
        let outer = ErasedContinuation::<(u8,)>::new(inner, &RunQueue::new().executor()).unwrap();

        assert_eq!(outer.executor(), &queue.executor());
        outer.invoke((9,));
        assert_eq!(*seen.lock().unwrap(), vec![9]);
    }

    #[test]
    fn test_send() {
        static_assertions::assert_impl_all!(ErasedContinuation<(Status, usize)>: Send);
        static_assertions::assert_not_impl_any!(ErasedContinuation<(Status, usize)>: Sync, Clone);
    }
}
