//! Type-erased continuation pointer types.
//!
//! This module encapsulates the `ptr` field of [`RawContinuation`] and
//! [`RawContinuationRef`], ensuring it is only visible within this module.
//! This visibility restriction guarantees the safety invariant: **the pointer
//! always points to a block allocated from the resource stored in its own
//! header, holding an initialized `ContinuationData<Args, M, C>`**.
//!
//! # Safety Invariant
//!
//! Since the `ptr` field can only be set via [`RawContinuation::new`] and
//! cannot be modified afterward, the pointer provenance remains valid
//! throughout the value's lifetime. The box is released exactly once: either
//! by [`RawContinuation::invoke`], which consumes the value, or by the `Drop`
//! implementation.
//!
//! # Type Erasure
//!
//! The concrete continuation type `C` is erased by casting to
//! `ContinuationData<Args, M, Erased>`. The completion arguments `Args` and
//! the metadata type `M` stay visible, so a box can only be invoked with the
//! argument tuple it was created for.

use core::{alloc::Layout, any::TypeId, marker::PhantomData, ptr::NonNull};

use crate::{
    continuation::data::ContinuationData,
    handlers::ContinuationHandler,
    memory::{AllocError, SharedResource},
    util::Erased,
};

/// An owned pointer to a [`ContinuationData`] that is guaranteed to point to
/// an initialized instance of a [`ContinuationData<Args, M, C>`] for some
/// specific `C`, though we do not know which actual `C` it is.
///
/// However, the pointer is allowed to transition into a non-initialized state
/// inside [`RawContinuation::invoke`] and the `Drop` implementation.
///
/// The value is neither [`Send`] nor [`Sync`]. Wrappers that only ever store
/// sendable continuations and metadata may implement those traits themselves.
#[repr(transparent)]
pub struct RawContinuation<Args: 'static, M: 'static> {
    /// Pointer to the inner continuation data
    ///
    /// # Safety
    ///
    /// The following safety invariants are guaranteed to be upheld as long as
    /// this struct exists:
    ///
    /// 1. The pointer was allocated by the resource stored in the header of
    ///    the pointee, using `Layout::new::<ContinuationData<Args, M, C>>()`.
    /// 2. The pointer will point to the same `ContinuationData<Args, M, C>`
    ///    for the entire lifetime of this object.
    /// 3. The pointee is properly initialized for the entire lifetime of this
    ///    object, except during the execution of `invoke` and `Drop`.
    ptr: NonNull<ContinuationData<Args, M, Erased>>,
}

impl<Args: 'static, M: 'static> RawContinuation<Args, M> {
    /// Moves `continuation` and `meta` into a block allocated from
    /// `resource`.
    ///
    /// The resource is the only one that will ever see the block, both for
    /// allocation and for deallocation. If the allocation fails, the
    /// continuation, the metadata and the resource handle are dropped before
    /// the error is returned.
    #[inline]
    pub fn new<C, H>(
        continuation: C,
        meta: M,
        resource: SharedResource,
    ) -> Result<Self, AllocError>
    where
        C: 'static,
        H: ContinuationHandler<C, Args>,
    {
        Self::new_or_return::<C, H>(continuation, meta, resource).map_err(|(error, _, _)| error)
    }

    /// Like [`RawContinuation::new`], but hands the continuation and the
    /// metadata back to the caller if the allocation fails.
    #[inline]
    pub fn new_or_return<C, H>(
        continuation: C,
        meta: M,
        resource: SharedResource,
    ) -> Result<Self, (AllocError, C, M)>
    where
        C: 'static,
        H: ContinuationHandler<C, Args>,
    {
        let layout = Layout::new::<ContinuationData<Args, M, C>>();
        let block = match resource.as_resource().allocate(layout) {
            Ok(block) => block,
            Err(error) => return Err((error, continuation, meta)),
        };
        let ptr: NonNull<ContinuationData<Args, M, C>> = block.cast();
        debug_assert!(ptr.as_ptr().is_aligned());

        let data = ContinuationData::new::<H>(continuation, meta, resource);
        // SAFETY: The block is valid for writes of `layout.size()` bytes and
        // aligned to `layout.align()`, which is guaranteed by the contract of
        // `MemoryResource`.
        unsafe {
            // @add-unsafe-context: ContinuationData
            ptr.as_ptr().write(data);
        }

        Ok(Self {
            ptr: ptr.cast::<ContinuationData<Args, M, Erased>>(),
        })
    }

    /// Returns a reference to the [`ContinuationData`] instance.
    #[inline]
    pub fn as_ref(&self) -> RawContinuationRef<'_, Args, M> {
        RawContinuationRef {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }

    /// Frees the box and calls the continuation with `args`.
    ///
    /// The memory is returned to its resource before the continuation runs.
    #[inline]
    pub fn invoke(self, args: Args) {
        let vtable = self.as_ref().vtable();
        let ptr = self.ptr;
        core::mem::forget(self);

        // SAFETY:
        // 1. The pointer was allocated from the resource in its header
        //    (guaranteed by `RawContinuation::new`)
        // 2. The vtable returned by `self.as_ref().vtable()` is guaranteed to
        //    match the data in the `ContinuationData`.
        // 3. `self` was forgotten above, so the pointer is not used again.
        unsafe {
            // @add-unsafe-context: ContinuationData
            vtable.invoke(ptr, args);
        }
    }
}

impl<Args: 'static, M: 'static> core::ops::Drop for RawContinuation<Args, M> {
    #[inline]
    fn drop(&mut self) {
        let vtable = self.as_ref().vtable();

        // SAFETY:
        // 1. The pointer was allocated from the resource in its header
        //    (guaranteed by `RawContinuation::new`)
        // 2. The vtable returned by `self.as_ref().vtable()` is guaranteed to
        //    match the data in the `ContinuationData`.
        // 3. The pointer is initialized and has not been previously freed as
        //    guaranteed by the invariants on this type. We are in the drop
        //    function, so the pointer is not used afterwards.
        unsafe {
            // @add-unsafe-context: ContinuationData
            vtable.destroy(self.ptr);
        }
    }
}

/// A lifetime-bound pointer to a [`ContinuationData`] that is guaranteed to
/// point to an initialized instance of a [`ContinuationData<Args, M, C>`] for
/// some specific `C`, though we do not know which actual `C` it is.
#[repr(transparent)]
pub struct RawContinuationRef<'a, Args: 'static, M: 'static> {
    /// Pointer to the inner continuation data
    ///
    /// # Safety
    ///
    /// The following safety invariants are guaranteed to be upheld as long as
    /// this struct exists:
    ///
    /// 1. The pointer points to an initialized `ContinuationData<Args, M, C>`
    ///    for some `C`, owned by a live [`RawContinuation`].
    /// 2. The pointer will point to the same `ContinuationData<Args, M, C>`
    ///    for the entire lifetime of this object.
    ptr: NonNull<ContinuationData<Args, M, Erased>>,

    /// Marker to tell the compiler that we should
    /// behave the same as a `&'a ContinuationData<Args, M, Erased>`
    _marker: PhantomData<&'a ContinuationData<Args, M, Erased>>,
}

impl<Args: 'static, M: 'static> Clone for RawContinuationRef<'_, Args, M> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<Args: 'static, M: 'static> Copy for RawContinuationRef<'_, Args, M> {}

impl<'a, Args: 'static, M: 'static> RawContinuationRef<'a, Args, M> {
    /// Returns a raw pointer to the [`ContinuationData`] instance.
    #[inline]
    pub(super) fn as_ptr(self) -> *const ContinuationData<Args, M, Erased> {
        self.ptr.as_ptr()
    }

    /// Returns the [`TypeId`] of the continuation.
    #[inline]
    pub fn continuation_type_id(self) -> TypeId {
        self.vtable().type_id()
    }

    /// Returns the [`core::any::type_name`] of the continuation.
    #[inline]
    pub fn continuation_type_name(self) -> &'static str {
        self.vtable().type_name()
    }

    /// Returns the [`TypeId`] of the handler the continuation is invoked with.
    #[inline]
    pub fn handler_type_id(self) -> TypeId {
        self.vtable().handler_type_id()
    }
}
