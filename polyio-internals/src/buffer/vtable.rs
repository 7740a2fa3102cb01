//! Vtable for type-erased buffer operations.
//!
//! This module contains the [`BufferVtable`] which enables calling
//! [`BufferBackend`] methods when the concrete backend type `B` has been
//! erased.
//!
//! This module encapsulates the fields of [`BufferVtable`] so they cannot be
//! accessed directly. This visibility restriction guarantees the safety
//! invariant: **the vtable's type parameter must match the actual backend type
//! stored in the `BufferData`**.
//!
//! # Safety Invariant
//!
//! This invariant is maintained because vtables are created as `&'static`
//! references via [`BufferVtable::new`], which pairs the function pointers
//! with a specific type `B` at compile time.

use core::{any::TypeId, ptr::NonNull};

use crate::{
    backend::{BufferBackend, BufferError},
    buffer::{
        data::BufferData,
        raw::{RawBufferGuard, RawDynamicBuffer},
    },
    util::Erased,
};

/// Vtable for type-erased buffer operations.
///
/// # Safety
///
/// The following safety invariants are guaranteed to be upheld as long as this
/// struct exists:
///
/// * All function pointer fields point to the functions defined below
/// * The concrete pointers are all instantiated with the same backend type `B`
///   that was used to create this `BufferVtable`.
pub(crate) struct BufferVtable {
    /// Gets the [`TypeId`] of the backend type that was used to create this
    /// [`BufferVtable`].
    type_id: fn() -> TypeId,
    /// Gets the [`core::any::type_name`] of the backend type that was used to
    /// create this [`BufferVtable`].
    type_name: fn() -> &'static str,
    /// Method to drop the [`triomphe::Arc<BufferData<B>>`] instance pointed to
    /// by this pointer.
    drop: unsafe fn(NonNull<BufferData<Erased>>),
    /// Clones the `triomphe::Arc<BufferData<B>>` pointed to by this pointer.
    clone_arc: unsafe fn(NonNull<BufferData<Erased>>) -> RawDynamicBuffer,
    /// Gets the strong count of the [`triomphe::Arc<BufferData<B>>`] pointed
    /// to by this pointer.
    strong_count: unsafe fn(NonNull<BufferData<Erased>>) -> usize,
    /// Calls [`BufferBackend::size`].
    size: unsafe fn(&mut RawBufferGuard<'_>) -> usize,
    /// Calls [`BufferBackend::max_size`].
    max_size: unsafe fn(&mut RawBufferGuard<'_>) -> usize,
    /// Calls [`BufferBackend::capacity`].
    capacity: unsafe fn(&mut RawBufferGuard<'_>) -> usize,
    /// Calls [`BufferBackend::data`].
    data: for<'a> unsafe fn(&'a mut RawBufferGuard<'_>, usize, usize) -> &'a [u8],
    /// Calls [`BufferBackend::data_mut`].
    data_mut: for<'a> unsafe fn(&'a mut RawBufferGuard<'_>, usize, usize) -> &'a mut [u8],
    /// Calls [`BufferBackend::prepare`].
    prepare:
        for<'a> unsafe fn(&'a mut RawBufferGuard<'_>, usize) -> Result<&'a mut [u8], BufferError>,
    /// Calls [`BufferBackend::commit`].
    commit: unsafe fn(&mut RawBufferGuard<'_>, usize),
    /// Calls [`BufferBackend::grow`].
    grow: unsafe fn(&mut RawBufferGuard<'_>, usize) -> Result<(), BufferError>,
    /// Calls [`BufferBackend::shrink`].
    shrink: unsafe fn(&mut RawBufferGuard<'_>, usize),
    /// Calls [`BufferBackend::consume`].
    consume: unsafe fn(&mut RawBufferGuard<'_>, usize),
}

impl BufferVtable {
    /// Creates a new [`BufferVtable`] for the backend type `B`.
    pub(super) const fn new<B: BufferBackend>() -> &'static Self {
        const {
            &Self {
                type_id: TypeId::of::<B>,
                type_name: core::any::type_name::<B>,
                drop: drop::<B>,
                clone_arc: clone_arc::<B>,
                strong_count: strong_count::<B>,
                size: size::<B>,
                max_size: max_size::<B>,
                capacity: capacity::<B>,
                data: data::<B>,
                data_mut: data_mut::<B>,
                prepare: prepare::<B>,
                commit: commit::<B>,
                grow: grow::<B>,
                shrink: shrink::<B>,
                consume: consume::<B>,
            }
        }
    }

    /// Gets the [`TypeId`] of the backend type that was used to create this
    /// [`BufferVtable`].
    #[inline]
    pub(super) fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    /// Gets the [`core::any::type_name`] of the backend type that was used to
    /// create this [`BufferVtable`].
    #[inline]
    pub(super) fn type_name(&self) -> &'static str {
        (self.type_name)()
    }

    /// Drops the `triomphe::Arc<BufferData<B>>` instance pointed to by this
    /// pointer.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The pointer comes from a [`triomphe::Arc<BufferData<B>>`] turned into
    ///    a pointer via [`triomphe::Arc::into_raw`]
    /// 2. This [`BufferVtable`] must be a vtable for the backend type stored in
    ///    the [`BufferData`].
    /// 3. The pointer is not used after calling this method.
    #[inline]
    pub(super) unsafe fn drop(&self, ptr: NonNull<BufferData<Erased>>) {
        // SAFETY: We know that `self.drop` points to the function `drop::<B>`
        // below. That function's safety requirements are upheld:
        // 1. Guaranteed by the caller
        // 2. Guaranteed by the caller
        // 3. Guaranteed by the caller
        unsafe {
            // @add-unsafe-context: drop
            (self.drop)(ptr);
        }
    }

    /// Clones the [`triomphe::Arc<BufferData<B>>`] pointed to by this pointer.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The pointer comes from a [`triomphe::Arc<BufferData<B>>`] turned into
    ///    a pointer via [`triomphe::Arc::into_raw`]
    /// 2. This [`BufferVtable`] must be a vtable for the backend type stored in
    ///    the [`BufferData`].
    #[inline]
    pub(super) unsafe fn clone_arc(&self, ptr: NonNull<BufferData<Erased>>) -> RawDynamicBuffer {
        // SAFETY: We know that `self.clone_arc` points to the function
        // `clone_arc::<B>` below. That function's safety requirements are
        // upheld:
        // 1. Guaranteed by the caller
        // 2. Guaranteed by the caller
        unsafe {
            // @add-unsafe-context: clone_arc
            (self.clone_arc)(ptr)
        }
    }

    /// Gets the strong count of the [`triomphe::Arc<BufferData<B>>`] pointed
    /// to by this pointer.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The pointer comes from [`triomphe::Arc<BufferData<B>>`] via
    ///    [`triomphe::Arc::into_raw`]
    /// 2. This [`BufferVtable`] must be a vtable for the backend type stored in
    ///    the [`BufferData`].
    #[inline]
    pub(super) unsafe fn strong_count(&self, ptr: NonNull<BufferData<Erased>>) -> usize {
        // SAFETY: We know that `self.strong_count` points to the function
        // `strong_count::<B>` below. That function's safety requirements are
        // upheld:
        // 1. Guaranteed by the caller
        // 2. Guaranteed by the caller
        unsafe {
            // @add-unsafe-context: strong_count
            (self.strong_count)(ptr)
        }
    }

    /// Calls [`BufferBackend::size`] on the locked backend.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. This [`BufferVtable`] must be a vtable for the backend type stored in
    ///    the [`BufferData`] locked by `guard`.
    #[inline]
    pub(super) unsafe fn size(&self, guard: &mut RawBufferGuard<'_>) -> usize {
        // SAFETY: We know that `self.size` points to the function `size::<B>`
        // below. That function's safety requirements are upheld:
        // 1. Guaranteed by the caller
        unsafe { (self.size)(guard) }
    }

    /// Calls [`BufferBackend::max_size`] on the locked backend.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. This [`BufferVtable`] must be a vtable for the backend type stored in
    ///    the [`BufferData`] locked by `guard`.
    #[inline]
    pub(super) unsafe fn max_size(&self, guard: &mut RawBufferGuard<'_>) -> usize {
        // SAFETY: We know that `self.max_size` points to the function
        // `max_size::<B>` below. That function's safety requirements are
        // upheld:
        // 1. Guaranteed by the caller
        unsafe { (self.max_size)(guard) }
    }

    /// Calls [`BufferBackend::capacity`] on the locked backend.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. This [`BufferVtable`] must be a vtable for the backend type stored in
    ///    the [`BufferData`] locked by `guard`.
    #[inline]
    pub(super) unsafe fn capacity(&self, guard: &mut RawBufferGuard<'_>) -> usize {
        // SAFETY: We know that `self.capacity` points to the function
        // `capacity::<B>` below. That function's safety requirements are
        // upheld:
        // 1. Guaranteed by the caller
        unsafe { (self.capacity)(guard) }
    }

    /// Calls [`BufferBackend::data`] on the locked backend.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. This [`BufferVtable`] must be a vtable for the backend type stored in
    ///    the [`BufferData`] locked by `guard`.
    #[inline]
    pub(super) unsafe fn data<'a>(
        &self,
        guard: &'a mut RawBufferGuard<'_>,
        pos: usize,
        n: usize,
    ) -> &'a [u8] {
        // SAFETY: We know that `self.data` points to the function `data::<B>`
        // below. That function's safety requirements are upheld:
        // 1. Guaranteed by the caller
        unsafe { (self.data)(guard, pos, n) }
    }

    /// Calls [`BufferBackend::data_mut`] on the locked backend.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. This [`BufferVtable`] must be a vtable for the backend type stored in
    ///    the [`BufferData`] locked by `guard`.
    #[inline]
    pub(super) unsafe fn data_mut<'a>(
        &self,
        guard: &'a mut RawBufferGuard<'_>,
        pos: usize,
        n: usize,
    ) -> &'a mut [u8] {
        // SAFETY: We know that `self.data_mut` points to the function
        // `data_mut::<B>` below. That function's safety requirements are
        // upheld:
        // 1. Guaranteed by the caller
        unsafe { (self.data_mut)(guard, pos, n) }
    }

    /// Calls [`BufferBackend::prepare`] on the locked backend.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. This [`BufferVtable`] must be a vtable for the backend type stored in
    ///    the [`BufferData`] locked by `guard`.
    #[inline]
    pub(super) unsafe fn prepare<'a>(
        &self,
        guard: &'a mut RawBufferGuard<'_>,
        n: usize,
    ) -> Result<&'a mut [u8], BufferError> {
        // SAFETY: We know that `self.prepare` points to the function
        // `prepare::<B>` below. That function's safety requirements are
        // upheld:
        // 1. Guaranteed by the caller
        unsafe { (self.prepare)(guard, n) }
    }

    /// Calls [`BufferBackend::commit`] on the locked backend.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. This [`BufferVtable`] must be a vtable for the backend type stored in
    ///    the [`BufferData`] locked by `guard`.
    #[inline]
    pub(super) unsafe fn commit(&self, guard: &mut RawBufferGuard<'_>, n: usize) {
        // SAFETY: We know that `self.commit` points to the function
        // `commit::<B>` below. That function's safety requirements are upheld:
        // 1. Guaranteed by the caller
        unsafe { (self.commit)(guard, n) }
    }

    /// Calls [`BufferBackend::grow`] on the locked backend.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. This [`BufferVtable`] must be a vtable for the backend type stored in
    ///    the [`BufferData`] locked by `guard`.
    #[inline]
    pub(super) unsafe fn grow(
        &self,
        guard: &mut RawBufferGuard<'_>,
        n: usize,
    ) -> Result<(), BufferError> {
        // SAFETY: We know that `self.grow` points to the function `grow::<B>`
        // below. That function's safety requirements are upheld:
        // 1. Guaranteed by the caller
        unsafe { (self.grow)(guard, n) }
    }

    /// Calls [`BufferBackend::shrink`] on the locked backend.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. This [`BufferVtable`] must be a vtable for the backend type stored in
    ///    the [`BufferData`] locked by `guard`.
    #[inline]
    pub(super) unsafe fn shrink(&self, guard: &mut RawBufferGuard<'_>, n: usize) {
        // SAFETY: We know that `self.shrink` points to the function
        // `shrink::<B>` below. That function's safety requirements are upheld:
        // 1. Guaranteed by the caller
        unsafe { (self.shrink)(guard, n) }
    }

    /// Calls [`BufferBackend::consume`] on the locked backend.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. This [`BufferVtable`] must be a vtable for the backend type stored in
    ///    the [`BufferData`] locked by `guard`.
    #[inline]
    pub(super) unsafe fn consume(&self, guard: &mut RawBufferGuard<'_>, n: usize) {
        // SAFETY: We know that `self.consume` points to the function
        // `consume::<B>` below. That function's safety requirements are
        // upheld:
        // 1. Guaranteed by the caller
        unsafe { (self.consume)(guard, n) }
    }
}

/// Drops the [`triomphe::Arc<BufferData<B>>`] instance pointed to by this
/// pointer.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. The pointer comes from [`triomphe::Arc<BufferData<B>>`] via
///    [`triomphe::Arc::into_raw`]
/// 2. The backend type `B` matches the actual backend type stored in the
///    [`BufferData`]
/// 3. The pointer is not used after calling this method.
unsafe fn drop<B: BufferBackend>(ptr: NonNull<BufferData<Erased>>) {
    let ptr: *const BufferData<B> = ptr.cast::<BufferData<B>>().as_ptr();
    // SAFETY:
    // 1. The pointer has the correct type and came from `Arc::into_raw`
    //    (guaranteed by caller)
    // 2. After `from_raw`, the pointer is consumed and not accessed again
    let arc = unsafe {
        // @add-unsafe-context: BufferData
        triomphe::Arc::from_raw(ptr)
    };
    core::mem::drop(arc);
}

/// Clones the [`triomphe::Arc<BufferData<B>>`] pointed to by this pointer.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. The pointer comes from a [`triomphe::Arc<BufferData<B>>`] turned into a
///    pointer via [`triomphe::Arc::into_raw`]
/// 2. The backend type `B` matches the actual backend type stored in the
///    [`BufferData`]
unsafe fn clone_arc<B: BufferBackend>(ptr: NonNull<BufferData<Erased>>) -> RawDynamicBuffer {
    let ptr: *const BufferData<B> = ptr.cast::<BufferData<B>>().as_ptr();

    // SAFETY: The pointer is valid and came from `Arc::into_raw` with the
    // correct type (guaranteed by the caller), which fulfills the requirements
    // for `ArcBorrow::from_ptr`.
    let arc_borrow = unsafe {
        // @add-unsafe-context: BufferData
        triomphe::ArcBorrow::from_ptr(ptr)
    };

    RawDynamicBuffer::from_arc(arc_borrow.clone_arc())
}

/// Gets the strong count of the [`triomphe::Arc<BufferData<B>>`] pointed to
/// by this pointer.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. The pointer comes from [`triomphe::Arc<BufferData<B>>`] via
///    [`triomphe::Arc::into_raw`]
/// 2. The backend type `B` matches the actual backend type stored in the
///    [`BufferData`]
unsafe fn strong_count<B: BufferBackend>(ptr: NonNull<BufferData<Erased>>) -> usize {
    let ptr: *const BufferData<B> = ptr.cast::<BufferData<B>>().as_ptr();

    // SAFETY: The pointer is valid and came from `Arc::into_raw` with the
    // correct type (guaranteed by the caller), which fulfills the requirements
    // for `ArcBorrow::from_ptr`.
    let arc_borrow = unsafe {
        // @add-unsafe-context: BufferData
        triomphe::ArcBorrow::from_ptr(ptr)
    };

    triomphe::ArcBorrow::strong_count(&arc_borrow)
}

/// Forwards to [`BufferBackend::size`].
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. The type `B` matches the actual backend type stored in the
///    [`BufferData`]
unsafe fn size<B: BufferBackend>(guard: &mut RawBufferGuard<'_>) -> usize {
    // SAFETY:
    // 1. Guaranteed by the caller
    let backend: &mut B = unsafe { guard.backend_mut::<B>() };
    backend.size()
}

/// Forwards to [`BufferBackend::max_size`].
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. The type `B` matches the actual backend type stored in the
///    [`BufferData`]
unsafe fn max_size<B: BufferBackend>(guard: &mut RawBufferGuard<'_>) -> usize {
    // SAFETY:
    // 1. Guaranteed by the caller
    let backend: &mut B = unsafe { guard.backend_mut::<B>() };
    backend.max_size()
}

/// Forwards to [`BufferBackend::capacity`].
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. The type `B` matches the actual backend type stored in the
///    [`BufferData`]
unsafe fn capacity<B: BufferBackend>(guard: &mut RawBufferGuard<'_>) -> usize {
    // SAFETY:
    // 1. Guaranteed by the caller
    let backend: &mut B = unsafe { guard.backend_mut::<B>() };
    backend.capacity()
}

/// Forwards to [`BufferBackend::data`].
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. The type `B` matches the actual backend type stored in the
///    [`BufferData`]
unsafe fn data<'a, B: BufferBackend>(
    guard: &'a mut RawBufferGuard<'_>,
    pos: usize,
    n: usize,
) -> &'a [u8] {
    // SAFETY:
    // 1. Guaranteed by the caller
    let backend: &mut B = unsafe { guard.backend_mut::<B>() };
    backend.data(pos, n)
}

/// Forwards to [`BufferBackend::data_mut`].
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. The type `B` matches the actual backend type stored in the
///    [`BufferData`]
unsafe fn data_mut<'a, B: BufferBackend>(
    guard: &'a mut RawBufferGuard<'_>,
    pos: usize,
    n: usize,
) -> &'a mut [u8] {
    // SAFETY:
    // 1. Guaranteed by the caller
    let backend: &mut B = unsafe { guard.backend_mut::<B>() };
    backend.data_mut(pos, n)
}

/// Forwards to [`BufferBackend::prepare`].
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. The type `B` matches the actual backend type stored in the
///    [`BufferData`]
unsafe fn prepare<'a, B: BufferBackend>(
    guard: &'a mut RawBufferGuard<'_>,
    n: usize,
) -> Result<&'a mut [u8], BufferError> {
    // SAFETY:
    // 1. Guaranteed by the caller
    let backend: &mut B = unsafe { guard.backend_mut::<B>() };
    backend.prepare(n)
}

/// Forwards to [`BufferBackend::commit`].
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. The type `B` matches the actual backend type stored in the
///    [`BufferData`]
unsafe fn commit<B: BufferBackend>(guard: &mut RawBufferGuard<'_>, n: usize) {
    // SAFETY:
    // 1. Guaranteed by the caller
    let backend: &mut B = unsafe { guard.backend_mut::<B>() };
    backend.commit(n)
}

/// Forwards to [`BufferBackend::grow`].
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. The type `B` matches the actual backend type stored in the
///    [`BufferData`]
unsafe fn grow<B: BufferBackend>(guard: &mut RawBufferGuard<'_>, n: usize) -> Result<(), BufferError> {
    // SAFETY:
    // 1. Guaranteed by the caller
    let backend: &mut B = unsafe { guard.backend_mut::<B>() };
    backend.grow(n)
}

/// Forwards to [`BufferBackend::shrink`].
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. The type `B` matches the actual backend type stored in the
///    [`BufferData`]
unsafe fn shrink<B: BufferBackend>(guard: &mut RawBufferGuard<'_>, n: usize) {
    // SAFETY:
    // 1. Guaranteed by the caller
    let backend: &mut B = unsafe { guard.backend_mut::<B>() };
    backend.shrink(n)
}

/// Forwards to [`BufferBackend::consume`].
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. The type `B` matches the actual backend type stored in the
///    [`BufferData`]
unsafe fn consume<B: BufferBackend>(guard: &mut RawBufferGuard<'_>, n: usize) {
    // SAFETY:
    // 1. Guaranteed by the caller
    let backend: &mut B = unsafe { guard.backend_mut::<B>() };
    backend.consume(n)
}
