//! Wrappers that attach an association to a continuation.

use super::Continuation;
use crate::{cancel::CancellationSlot, executor::Executor, memory::Allocator};

/// A continuation with a preferred [`Executor`].
///
/// Created with [`bind_executor`]. The other associations of the wrapped
/// continuation are forwarded unchanged.
#[derive(Clone, Debug)]
pub struct BindExecutor<K> {
    executor: Executor,
    inner: K,
}

/// Attaches `executor` to `continuation`.
///
/// ```
/// use polyio::{
///     continuation::{Continuation, bind_executor},
///     executor::RunQueue,
/// };
///
/// let queue = RunQueue::new();
/// let bound = bind_executor(queue.executor(), |_: u32| {});
///
/// assert_eq!(Continuation::<(u32,)>::executor(&bound), Some(queue.executor()));
/// ```
pub fn bind_executor<K>(executor: Executor, continuation: K) -> BindExecutor<K> {
    BindExecutor {
        executor,
        inner: continuation,
    }
}

impl<K> BindExecutor<K> {
    /// The bound executor.
    pub fn bound_executor(&self) -> &Executor {
        &self.executor
    }

    /// The wrapped continuation.
    pub fn get_ref(&self) -> &K {
        &self.inner
    }

    /// Removes the binding.
    pub fn into_inner(self) -> K {
        self.inner
    }
}

impl<Args, K: Continuation<Args>> Continuation<Args> for BindExecutor<K> {
    #[inline]
    fn complete(self, args: Args) {
        self.inner.complete(args)
    }

    fn allocator(&self) -> Allocator {
        self.inner.allocator()
    }

    fn executor(&self) -> Option<Executor> {
        Some(self.executor.clone())
    }

    fn cancellation_slot(&self) -> Option<CancellationSlot> {
        self.inner.cancellation_slot()
    }
}

/// A continuation with a preferred [`Allocator`].
///
/// Created with [`bind_allocator`].
#[derive(Clone, Debug)]
pub struct BindAllocator<K> {
    allocator: Allocator,
    inner: K,
}

/// Attaches `allocator` to `continuation`.
pub fn bind_allocator<K>(allocator: Allocator, continuation: K) -> BindAllocator<K> {
    BindAllocator {
        allocator,
        inner: continuation,
    }
}

impl<K> BindAllocator<K> {
    /// The bound allocator.
    pub fn bound_allocator(&self) -> &Allocator {
        &self.allocator
    }

    /// The wrapped continuation.
    pub fn get_ref(&self) -> &K {
        &self.inner
    }

    /// Removes the binding.
    pub fn into_inner(self) -> K {
        self.inner
    }
}

impl<Args, K: Continuation<Args>> Continuation<Args> for BindAllocator<K> {
    #[inline]
    fn complete(self, args: Args) {
        self.inner.complete(args)
    }

    fn allocator(&self) -> Allocator {
        self.allocator.clone()
    }

    fn executor(&self) -> Option<Executor> {
        self.inner.executor()
    }

    fn cancellation_slot(&self) -> Option<CancellationSlot> {
        self.inner.cancellation_slot()
    }
}

/// A continuation with a [`CancellationSlot`].
///
/// Created with [`bind_cancellation_slot`].
#[derive(Clone, Debug)]
pub struct BindCancellationSlot<K> {
    slot: CancellationSlot,
    inner: K,
}

/// Attaches `slot` to `continuation`.
///
/// The device performing the operation installs its cancellation handler
/// into `slot`; emitting the matching
/// [`CancellationSignal`](crate::cancel::CancellationSignal) then cancels
/// the operation.
pub fn bind_cancellation_slot<K>(
    slot: CancellationSlot,
    continuation: K,
) -> BindCancellationSlot<K> {
    BindCancellationSlot {
        slot,
        inner: continuation,
    }
}

impl<K> BindCancellationSlot<K> {
    /// The bound slot.
    pub fn bound_slot(&self) -> &CancellationSlot {
        &self.slot
    }

    /// The wrapped continuation.
    pub fn get_ref(&self) -> &K {
        &self.inner
    }

    /// Removes the binding.
    pub fn into_inner(self) -> K {
        self.inner
    }
}

impl<Args, K: Continuation<Args>> Continuation<Args> for BindCancellationSlot<K> {
    #[inline]
    fn complete(self, args: Args) {
        self.inner.complete(args)
    }

    fn allocator(&self) -> Allocator {
        self.inner.allocator()
    }

    fn executor(&self) -> Option<Executor> {
        self.inner.executor()
    }

    fn cancellation_slot(&self) -> Option<CancellationSlot> {
        Some(self.slot.clone())
    }
}
