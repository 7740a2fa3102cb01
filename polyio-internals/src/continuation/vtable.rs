//! Vtable for type-erased continuation operations.
//!
//! This module contains the [`ContinuationVtable`] which enables invoking and
//! destroying continuations when their concrete type `C` and handler type `H`
//! have been erased. The vtable stores function pointers that dispatch to the
//! correct typed implementations.
//!
//! This module encapsulates the fields of [`ContinuationVtable`] so they
//! cannot be accessed directly. This visibility restriction guarantees the
//! safety invariant: **the vtable's type parameters must match the actual
//! continuation type and handler stored in the `ContinuationData`**.
//!
//! # Safety Invariant
//!
//! This invariant is maintained because vtables are created as `&'static`
//! references via [`ContinuationVtable::new`], which pairs the function
//! pointers with specific types `C` and `H` at compile time.

use core::{alloc::Layout, any::TypeId, ptr::NonNull};

use crate::{
    continuation::data::ContinuationData, handlers::ContinuationHandler, util::Erased,
};

/// Vtable for type-erased continuation operations.
///
/// # Safety
///
/// The following safety invariants are guaranteed to be upheld as long as this
/// struct exists:
///
/// * The fields `invoke` and `destroy` point to the functions defined below
/// * The concrete pointers are all instantiated with the same continuation
///   type `C` and handler type `H` that were used to create this
///   `ContinuationVtable`.
pub(crate) struct ContinuationVtable<Args: 'static, M: 'static> {
    /// Gets the [`TypeId`] of the continuation type that was used to create
    /// this [`ContinuationVtable`].
    type_id: fn() -> TypeId,
    /// Gets the [`core::any::type_name`] of the continuation type that was used
    /// to create this [`ContinuationVtable`].
    type_name: fn() -> &'static str,
    /// Gets the [`TypeId`] of the handler that was used to create this
    /// [`ContinuationVtable`].
    handler_type_id: fn() -> TypeId,
    /// Moves the continuation out of its box, frees the box and calls the
    /// continuation.
    invoke: unsafe fn(NonNull<ContinuationData<Args, M, Erased>>, Args),
    /// Drops the continuation without calling it and frees the box.
    destroy: unsafe fn(NonNull<ContinuationData<Args, M, Erased>>),
}

impl<Args: 'static, M: 'static> ContinuationVtable<Args, M> {
    /// Creates a new [`ContinuationVtable`] for the continuation type `C` and
    /// the handler type `H`.
    pub(super) const fn new<C: 'static, H: ContinuationHandler<C, Args>>() -> &'static Self {
        const {
            &Self {
                type_id: TypeId::of::<C>,
                type_name: core::any::type_name::<C>,
                handler_type_id: TypeId::of::<H>,
                invoke: invoke::<Args, M, C, H>,
                destroy: destroy::<Args, M, C>,
            }
        }
    }

    /// Gets the [`TypeId`] of the continuation type that was used to create
    /// this [`ContinuationVtable`].
    #[inline]
    pub(super) fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    /// Gets the [`core::any::type_name`] of the continuation type that was
    /// used to create this [`ContinuationVtable`].
    #[inline]
    pub(super) fn type_name(&self) -> &'static str {
        (self.type_name)()
    }

    /// Gets the [`TypeId`] of the handler that was used to create this
    /// [`ContinuationVtable`].
    #[inline]
    pub(super) fn handler_type_id(&self) -> TypeId {
        (self.handler_type_id)()
    }

    /// Invokes the continuation stored behind `ptr` with `args`.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The pointer was allocated by [`RawContinuation::new`] from the
    ///    resource stored inside the [`ContinuationData`].
    /// 2. This [`ContinuationVtable`] must be a vtable for the continuation
    ///    type stored in the [`ContinuationData`].
    /// 3. The pointer is not used after calling this method.
    ///
    /// [`RawContinuation::new`]: crate::RawContinuation::new
    #[inline]
    pub(super) unsafe fn invoke(&self, ptr: NonNull<ContinuationData<Args, M, Erased>>, args: Args) {
        // SAFETY: We know that `self.invoke` points to the function
        // `invoke::<Args, M, C, H>` below. That function's safety requirements
        // are upheld:
        // 1. Guaranteed by the caller
        // 2. Guaranteed by the caller
        // 3. Guaranteed by the caller
        unsafe {
            // @add-unsafe-context: invoke
            (self.invoke)(ptr, args);
        }
    }

    /// Destroys the continuation stored behind `ptr` without invoking it.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The pointer was allocated by [`RawContinuation::new`] from the
    ///    resource stored inside the [`ContinuationData`].
    /// 2. This [`ContinuationVtable`] must be a vtable for the continuation
    ///    type stored in the [`ContinuationData`].
    /// 3. The pointer is not used after calling this method.
    ///
    /// [`RawContinuation::new`]: crate::RawContinuation::new
    #[inline]
    pub(super) unsafe fn destroy(&self, ptr: NonNull<ContinuationData<Args, M, Erased>>) {
        // SAFETY: We know that `self.destroy` points to the function
        // `destroy::<Args, M, C>` below. That function's safety requirements
        // are upheld:
        // 1. Guaranteed by the caller
        // 2. Guaranteed by the caller
        // 3. Guaranteed by the caller
        unsafe {
            // @add-unsafe-context: destroy
            (self.destroy)(ptr);
        }
    }
}

/// Moves the [`ContinuationData<Args, M, C>`] out of its box and returns the
/// memory to the resource the box came from.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. The pointer was allocated by [`RawContinuation::new`] from the resource
///    stored inside the [`ContinuationData`].
/// 2. The type `C` matches the actual continuation type stored in the
///    [`ContinuationData`].
/// 3. The pointer is not used after calling this function.
///
/// [`RawContinuation::new`]: crate::RawContinuation::new
unsafe fn take<Args: 'static, M: 'static, C: 'static>(
    ptr: NonNull<ContinuationData<Args, M, Erased>>,
) -> ContinuationData<Args, M, C> {
    let ptr: NonNull<ContinuationData<Args, M, C>> = ptr.cast();

    // SAFETY:
    // 1. The pointer is valid, aligned and points to an initialized
    //    `ContinuationData<Args, M, C>` (guaranteed by the caller)
    // 2. The value is moved out exactly once, as the pointer is not used again
    let data = unsafe {
        // @add-unsafe-context: ContinuationData
        ptr.as_ptr().read()
    };

    let layout = Layout::new::<ContinuationData<Args, M, C>>();
    // SAFETY:
    // 1. The block was allocated from `data.resource` (guaranteed by the
    //    caller), and the handle we read keeps that resource alive
    // 2. `RawContinuation::new` allocated with exactly this layout
    // 3. The contents were moved out above and the block is not used again
    unsafe {
        // @add-unsafe-context: MemoryResource
        data.resource.as_resource().deallocate(ptr.cast::<u8>(), layout);
    }

    data
}

/// Frees the box and then calls the continuation using its handler.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. The pointer was allocated by [`RawContinuation::new`] from the resource
///    stored inside the [`ContinuationData`].
/// 2. The type `C` matches the actual continuation type stored in the
///    [`ContinuationData`].
/// 3. The pointer is not used after calling this function.
///
/// [`RawContinuation::new`]: crate::RawContinuation::new
unsafe fn invoke<Args: 'static, M: 'static, C: 'static, H: ContinuationHandler<C, Args>>(
    ptr: NonNull<ContinuationData<Args, M, Erased>>,
    args: Args,
) {
    // SAFETY:
    // 1. Guaranteed by the caller
    // 2. Guaranteed by the caller
    // 3. Guaranteed by the caller
    let data = unsafe { take::<Args, M, C>(ptr) };
    let ContinuationData {
        vtable: _,
        resource,
        meta,
        continuation,
    } = data;

    // The header is fully released before user code runs.
    core::mem::drop(meta);
    core::mem::drop(resource);

    H::invoke(continuation, args);
}

/// Frees the box and drops the continuation without calling it.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. The pointer was allocated by [`RawContinuation::new`] from the resource
///    stored inside the [`ContinuationData`].
/// 2. The type `C` matches the actual continuation type stored in the
///    [`ContinuationData`].
/// 3. The pointer is not used after calling this function.
///
/// [`RawContinuation::new`]: crate::RawContinuation::new
unsafe fn destroy<Args: 'static, M: 'static, C: 'static>(
    ptr: NonNull<ContinuationData<Args, M, Erased>>,
) {
    // SAFETY:
    // 1. Guaranteed by the caller
    // 2. Guaranteed by the caller
    // 3. Guaranteed by the caller
    let data = unsafe { take::<Args, M, C>(ptr) };
    core::mem::drop(data);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Forward;

    impl<F: FnOnce(u8) + 'static> ContinuationHandler<F, (u8,)> for Forward {
        fn invoke(continuation: F, (value,): (u8,)) {
            continuation(value)
        }
    }

    #[test]
    fn test_continuation_vtable_eq() {
        let vtable1 = ContinuationVtable::<(u8,), ()>::new::<fn(u8), Forward>();
        let vtable2 = ContinuationVtable::<(u8,), ()>::new::<fn(u8), Forward>();

        assert!(core::ptr::eq(vtable1, vtable2));
    }

    #[test]
    fn test_continuation_type_id() {
        let vtable = ContinuationVtable::<(u8,), u32>::new::<fn(u8), Forward>();
        assert_eq!(vtable.type_id(), TypeId::of::<fn(u8)>());
        assert_eq!(vtable.handler_type_id(), TypeId::of::<Forward>());
        assert_eq!(vtable.type_name(), core::any::type_name::<fn(u8)>());
    }
}
