//! This module encapsulates the fields of the [`BufferData`]. Since this is
//! the only place they are visible, this means that the type of the
//! [`BufferVtable`] is guaranteed to always be in sync with the type of the
//! actual backend, and that the backend is only ever reached through the lock
//! stored next to it. This follows from the fact that they are in sync when
//! created and that the API offers no way to change the vtable after creation.

use core::cell::UnsafeCell;

use spin::Mutex;

use crate::{
    backend::BufferBackend,
    buffer::{
        raw::{RawBufferGuard, RawDynamicBuffer},
        vtable::BufferVtable,
    },
    util::Erased,
};

/// Type-erased buffer state with vtable-based dispatch.
///
/// This struct uses `#[repr(C)]` to enable safe field access in type-erased
/// contexts, allowing access to the vtable and the lock even when the concrete
/// backend type `B` is unknown.
#[repr(C)]
pub(crate) struct BufferData<B: 'static> {
    /// The Vtable of this buffer
    vtable: &'static BufferVtable,
    /// Serializes every access to `backend`
    lock: Mutex<()>,
    /// The actual backend
    backend: UnsafeCell<B>,
}

impl<B: BufferBackend> BufferData<B> {
    /// Creates a new [`BufferData`] wrapping `backend`.
    #[inline]
    pub(super) fn new(backend: B) -> Self {
        Self {
            vtable: BufferVtable::new::<B>(),
            lock: Mutex::new(()),
            backend: UnsafeCell::new(backend),
        }
    }

    /// Unwraps the backend.
    #[inline]
    pub(super) fn into_backend(self) -> B {
        self.backend.into_inner()
    }
}

impl RawDynamicBuffer {
    /// Returns a reference to the [`BufferVtable`] of the [`BufferData`]
    /// instance.
    #[inline]
    pub(super) fn vtable(&self) -> &'static BufferVtable {
        let ptr = self.as_ptr();
        // SAFETY: We don't know the actual inner backend type, but we do know
        // that it points to an instance of `BufferData<B>` for some specific
        // `B`. Since `BufferData` is `#[repr(C)]`, the first two fields have
        // the same offset for every `B`.
        //
        // We need to take care to avoid creating an actual reference to the
        // `BufferData` itself though, as that would still be undefined
        // behavior since we don't have the right type.
        let vtable_ptr: *const &'static BufferVtable = unsafe { &raw const (*ptr).vtable };

        // SAFETY: Dereferencing the pointer and getting out the `&'static
        // BufferVtable` is valid for the same reasons
        unsafe { *vtable_ptr }
    }

    /// Returns a reference to the lock guarding the backend.
    #[inline]
    pub(super) fn lock_ref(&self) -> &Mutex<()> {
        let ptr = self.as_ptr();
        // SAFETY: Same reasoning as in `vtable`: the lock precedes the backend
        // and its type does not depend on `B`.
        let lock_ptr: *const Mutex<()> = unsafe { &raw const (*ptr).lock };

        // SAFETY: The `Arc` keeps the field initialized for as long as `self`
        // is alive, and the lock is only ever accessed through shared
        // references.
        unsafe { &*lock_ptr }
    }
}

impl RawBufferGuard<'_> {
    /// Returns a reference to the [`BufferVtable`] of the locked buffer.
    #[inline]
    pub(super) fn vtable(&self) -> &'static BufferVtable {
        let ptr = self.as_ptr();
        // SAFETY: Same reasoning as in `RawDynamicBuffer::vtable`.
        let vtable_ptr: *const &'static BufferVtable = unsafe { &raw const (*ptr).vtable };

        // SAFETY: Dereferencing the pointer and getting out the `&'static
        // BufferVtable` is valid for the same reasons
        unsafe { *vtable_ptr }
    }

    /// Returns a mutable reference to the backend.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The type `B` matches the actual backend type stored in the
    ///    [`BufferData`].
    #[inline]
    pub(super) unsafe fn backend_mut<B: 'static>(&mut self) -> &mut B {
        let ptr: *const BufferData<B> = self.as_ptr().cast::<BufferData<B>>();
        // SAFETY: The pointer is valid and points to a `BufferData<B>`
        // (guaranteed by the caller).
        let cell: *const UnsafeCell<B> = unsafe { &raw const (*ptr).backend };
        let backend: *mut B = UnsafeCell::raw_get(cell);

        // SAFETY: The guard holds the lock of this buffer, so no other
        // reference to the backend exists. The returned reference borrows the
        // guard mutably, so it ends before the lock is released.
        unsafe { &mut *backend }
    }
}
