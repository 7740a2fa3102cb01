//! Type-erased buffer pointer types.
//!
//! This module encapsulates the `ptr` field of [`RawDynamicBuffer`] and
//! [`RawBufferGuard`], ensuring it is only visible within this module. This
//! visibility restriction guarantees the safety invariant: **the pointer always
//! comes from `Arc<BufferData<B>>`**.
//!
//! # Safety Invariant
//!
//! Since the `ptr` field can only be set via [`RawDynamicBuffer::new`] or
//! [`RawDynamicBuffer::from_arc`] (which create it from `Arc::into_raw`), and
//! cannot be modified afterward, the pointer provenance remains valid
//! throughout the value's lifetime.
//!
//! # Allocation Strategy
//!
//! Buffers use `triomphe::Arc` for storage. Cloning a [`RawDynamicBuffer`]
//! produces another handle to the same backend, and every access to the
//! backend goes through a [`RawBufferGuard`] holding the per-buffer lock.

use core::{any::TypeId, mem::ManuallyDrop, ptr::NonNull};

use spin::MutexGuard;

use crate::{
    backend::{BufferBackend, BufferError},
    buffer::data::BufferData,
    util::Erased,
};

/// A pointer to a [`BufferData`] that is guaranteed to point to an
/// initialized instance of a [`BufferData<B>`] for some specific `B`, though
/// we do not know which actual `B` it is.
///
/// However, the pointer is allowed to transition into a non-initialized state
/// inside the [`RawDynamicBuffer::drop`] method.
///
/// The pointer is guaranteed to have been created using
/// [`triomphe::Arc::into_raw`].
#[repr(transparent)]
pub struct RawDynamicBuffer {
    /// Pointer to the inner buffer data
    ///
    /// # Safety
    ///
    /// The following safety invariants are guaranteed to be upheld as long as
    /// this struct exists:
    ///
    /// 1. The pointer must have been created from a
    ///    `triomphe::Arc<BufferData<B>>` for some `B` using
    ///    `triomphe::Arc::into_raw`.
    /// 2. The pointer will point to the same `BufferData<B>` for the entire
    ///    lifetime of this object.
    ptr: NonNull<BufferData<Erased>>,
}

// SAFETY: Every backend is `Send`, the reference count is atomic and all
// access to the backend is serialized by the lock stored in `BufferData`.
unsafe impl Send for RawDynamicBuffer {}

// SAFETY: Shared references only give access to the lock, the reference count
// and the vtable, all of which are safe to use from several threads at once.
unsafe impl Sync for RawDynamicBuffer {}

impl RawDynamicBuffer {
    /// Creates a new [`RawDynamicBuffer`] from a
    /// [`triomphe::Arc<BufferData<B>>`].
    #[inline]
    pub(super) fn from_arc<B: BufferBackend>(data: triomphe::Arc<BufferData<B>>) -> Self {
        let ptr: *const BufferData<B> = triomphe::Arc::into_raw(data);
        let ptr: *mut BufferData<Erased> = ptr.cast::<BufferData<Erased>>().cast_mut();

        // SAFETY:
        // 1. Triomphe guarantees that `Arc::into_raw` returns a non-null pointer.
        let ptr: NonNull<BufferData<Erased>> = unsafe { NonNull::new_unchecked(ptr) };

        Self { ptr }
    }

    /// Moves `backend` into a new shared buffer with a strong count of 1.
    #[inline]
    pub fn new<B: BufferBackend>(backend: B) -> Self {
        Self::from_arc(triomphe::Arc::new(BufferData::new(backend)))
    }

    /// Returns a raw pointer to the [`BufferData`] instance.
    #[inline]
    pub(super) fn as_ptr(&self) -> *const BufferData<Erased> {
        self.ptr.as_ptr()
    }

    /// Returns the [`TypeId`] of the backend.
    #[inline]
    pub fn backend_type_id(&self) -> TypeId {
        self.vtable().type_id()
    }

    /// Returns the [`core::any::type_name`] of the backend.
    #[inline]
    pub fn backend_type_name(&self) -> &'static str {
        self.vtable().type_name()
    }

    /// Returns the number of handles sharing this buffer.
    #[inline]
    pub fn strong_count(&self) -> usize {
        let vtable = self.vtable();
        // SAFETY:
        // 1. The pointer comes from `Arc::into_raw` (guaranteed by the
        //    invariants of `RawDynamicBuffer`)
        // 2. The vtable matches the data in the `BufferData`
        unsafe { vtable.strong_count(self.ptr) }
    }

    /// Returns `true` if both handles share the same backend.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }

    /// Locks the buffer and returns a guard giving exclusive access to the
    /// backend.
    #[inline]
    pub fn lock(&self) -> RawBufferGuard<'_> {
        RawBufferGuard {
            ptr: self.ptr,
            _guard: self.lock_ref().lock(),
        }
    }

    /// Returns the backend if it has type `B` and this is the only handle
    /// to it. Otherwise the handle is returned unchanged.
    pub fn try_unwrap<B: BufferBackend>(self) -> Result<B, Self> {
        if self.backend_type_id() != TypeId::of::<B>() {
            return Err(self);
        }

        let this = ManuallyDrop::new(self);
        let ptr: *const BufferData<B> = this.ptr.cast::<BufferData<B>>().as_ptr();
        // SAFETY:
        // 1. The pointer came from `Arc::into_raw` for a `BufferData<B>`, as
        //    the type id was checked above
        // 2. `this` is never dropped, so ownership of the count moves into the
        //    reconstructed `Arc`
        let arc = unsafe {
            // @add-unsafe-context: BufferData
            triomphe::Arc::from_raw(ptr)
        };

        match triomphe::Arc::try_unwrap(arc) {
            Ok(data) => Ok(data.into_backend()),
            Err(arc) => Err(Self::from_arc(arc)),
        }
    }
}

impl Clone for RawDynamicBuffer {
    #[inline]
    fn clone(&self) -> Self {
        let vtable = self.vtable();
        // SAFETY:
        // 1. The pointer comes from `Arc::into_raw` (guaranteed by the
        //    invariants of `RawDynamicBuffer`)
        // 2. The vtable matches the data in the `BufferData`
        unsafe { vtable.clone_arc(self.ptr) }
    }
}

impl core::ops::Drop for RawDynamicBuffer {
    #[inline]
    fn drop(&mut self) {
        let vtable = self.vtable();

        // SAFETY:
        // 1. The pointer comes from `Arc::into_raw` (guaranteed by
        //    `RawDynamicBuffer::from_arc`)
        // 2. The vtable returned by `self.vtable()` is guaranteed to match the
        //    data in the `BufferData`.
        // 3. The pointer is not used after this call (we're in the drop
        //    function)
        unsafe {
            // @add-unsafe-context: BufferData
            vtable.drop(self.ptr);
        }
    }
}

/// Exclusive access to the backend of a locked [`RawDynamicBuffer`].
///
/// The lock is released when the guard is dropped.
pub struct RawBufferGuard<'a> {
    /// Pointer to the inner buffer data
    ///
    /// # Safety
    ///
    /// The following safety invariants are guaranteed to be upheld as long as
    /// this struct exists:
    ///
    /// 1. The pointer points to an initialized `BufferData<B>` for some `B`,
    ///    kept alive by a [`RawDynamicBuffer`] that outlives `'a`.
    /// 2. The lock of that `BufferData` is held by `_guard`.
    ptr: NonNull<BufferData<Erased>>,

    /// The held lock
    _guard: MutexGuard<'a, ()>,
}

impl RawBufferGuard<'_> {
    /// Returns a raw pointer to the [`BufferData`] instance.
    #[inline]
    pub(super) fn as_ptr(&self) -> *const BufferData<Erased> {
        self.ptr.as_ptr()
    }

    /// Calls [`BufferBackend::size`].
    #[inline]
    pub fn size(&mut self) -> usize {
        let vtable = self.vtable();
        // SAFETY:
        // 1. The vtable matches the data in the `BufferData`
        unsafe { vtable.size(self) }
    }

    /// Calls [`BufferBackend::max_size`].
    #[inline]
    pub fn max_size(&mut self) -> usize {
        let vtable = self.vtable();
        // SAFETY:
        // 1. The vtable matches the data in the `BufferData`
        unsafe { vtable.max_size(self) }
    }

    /// Calls [`BufferBackend::capacity`].
    #[inline]
    pub fn capacity(&mut self) -> usize {
        let vtable = self.vtable();
        // SAFETY:
        // 1. The vtable matches the data in the `BufferData`
        unsafe { vtable.capacity(self) }
    }

    /// Calls [`BufferBackend::data`].
    #[inline]
    pub fn data(&mut self, pos: usize, n: usize) -> &[u8] {
        let vtable = self.vtable();
        // SAFETY:
        // 1. The vtable matches the data in the `BufferData`
        unsafe { vtable.data(self, pos, n) }
    }

    /// Calls [`BufferBackend::data_mut`].
    #[inline]
    pub fn data_mut(&mut self, pos: usize, n: usize) -> &mut [u8] {
        let vtable = self.vtable();
        // SAFETY:
        // 1. The vtable matches the data in the `BufferData`
        unsafe { vtable.data_mut(self, pos, n) }
    }

    /// Calls [`BufferBackend::prepare`].
    #[inline]
    pub fn prepare(&mut self, n: usize) -> Result<&mut [u8], BufferError> {
        let vtable = self.vtable();
        // SAFETY:
        // 1. The vtable matches the data in the `BufferData`
        unsafe { vtable.prepare(self, n) }
    }

    /// Calls [`BufferBackend::commit`].
    #[inline]
    pub fn commit(&mut self, n: usize) {
        let vtable = self.vtable();
        // SAFETY:
        // 1. The vtable matches the data in the `BufferData`
        unsafe { vtable.commit(self, n) }
    }

    /// Calls [`BufferBackend::grow`].
    #[inline]
    pub fn grow(&mut self, n: usize) -> Result<(), BufferError> {
        let vtable = self.vtable();
        // SAFETY:
        // 1. The vtable matches the data in the `BufferData`
        unsafe { vtable.grow(self, n) }
    }

    /// Calls [`BufferBackend::shrink`].
    #[inline]
    pub fn shrink(&mut self, n: usize) {
        let vtable = self.vtable();
        // SAFETY:
        // 1. The vtable matches the data in the `BufferData`
        unsafe { vtable.shrink(self, n) }
    }

    /// Calls [`BufferBackend::consume`].
    #[inline]
    pub fn consume(&mut self, n: usize) {
        let vtable = self.vtable();
        // SAFETY:
        // 1. The vtable matches the data in the `BufferData`
        unsafe { vtable.consume(self, n) }
    }

    /// Returns the backend if it has type `B`.
    #[inline]
    pub fn downcast_mut<B: BufferBackend>(&mut self) -> Option<&mut B> {
        if self.vtable().type_id() != TypeId::of::<B>() {
            return None;
        }

        // SAFETY:
        // 1. The type id was checked above
        Some(unsafe { self.backend_mut::<B>() })
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::backend::check_growth;

    /// Minimal contiguous backend.
    struct Bytes {
        readable: usize,
        bytes: Vec<u8>,
        max: usize,
    }

    impl Bytes {
        fn new(max: usize) -> Self {
            Self {
                readable: 0,
                bytes: Vec::new(),
                max,
            }
        }
    }

    impl BufferBackend for Bytes {
        fn size(&self) -> usize {
            self.readable
        }

        fn max_size(&self) -> usize {
            self.max
        }

        fn capacity(&self) -> usize {
            self.bytes.capacity().min(self.max)
        }

        fn data(&mut self, pos: usize, n: usize) -> &[u8] {
            let start = pos.min(self.readable);
            let end = start + n.min(self.readable - start);
            &self.bytes[start..end]
        }

        fn data_mut(&mut self, pos: usize, n: usize) -> &mut [u8] {
            let start = pos.min(self.readable);
            let end = start + n.min(self.readable - start);
            &mut self.bytes[start..end]
        }

        fn prepare(&mut self, n: usize) -> Result<&mut [u8], BufferError> {
            check_growth(self.readable, self.max, n)?;
            self.bytes.resize(self.readable + n, 0);
            Ok(&mut self.bytes[self.readable..])
        }

        fn commit(&mut self, n: usize) {
            self.readable += n.min(self.bytes.len() - self.readable);
            self.bytes.truncate(self.readable);
        }

        fn grow(&mut self, n: usize) -> Result<(), BufferError> {
            check_growth(self.readable, self.max, n)?;
            self.readable += n;
            self.bytes.resize(self.readable, 0);
            Ok(())
        }

        fn shrink(&mut self, n: usize) {
            self.readable -= n.min(self.readable);
            self.bytes.truncate(self.readable);
        }

        fn consume(&mut self, n: usize) {
            let n = n.min(self.readable);
            self.bytes.drain(..n);
            self.readable -= n;
        }
    }

    /// A backend that never holds anything.
    struct Empty;

    impl BufferBackend for Empty {
        fn size(&self) -> usize {
            0
        }

        fn max_size(&self) -> usize {
            0
        }

        fn capacity(&self) -> usize {
            0
        }

        fn data(&mut self, _pos: usize, _n: usize) -> &[u8] {
            &[]
        }

        fn data_mut(&mut self, _pos: usize, _n: usize) -> &mut [u8] {
            &mut []
        }

        fn prepare(&mut self, n: usize) -> Result<&mut [u8], BufferError> {
            check_growth(0, 0, n)?;
            Ok(&mut [])
        }

        fn commit(&mut self, _n: usize) {}

        fn grow(&mut self, n: usize) -> Result<(), BufferError> {
            check_growth(0, 0, n)
        }

        fn shrink(&mut self, _n: usize) {}

        fn consume(&mut self, _n: usize) {}
    }

    #[test]
    fn test_raw_buffer_shared_state() {
        let buffer = RawDynamicBuffer::new(Bytes::new(16));
        let other = buffer.clone();

        buffer.lock().prepare(4).unwrap().copy_from_slice(b"abcd");
        buffer.lock().commit(3);

        let mut guard = other.lock();
        assert_eq!(guard.size(), 3);
        assert_eq!(guard.data(0, 16), b"abc");
        guard.consume(1);
        assert_eq!(guard.data(0, 16), b"bc");
        drop(guard);

        assert_eq!(buffer.lock().size(), 2);
    }

    #[test]
    fn test_raw_buffer_max_size() {
        let buffer = RawDynamicBuffer::new(Bytes::new(4));
        let mut guard = buffer.lock();

        guard.grow(3).unwrap();
        assert_eq!(
            guard.grow(2),
            Err(BufferError::LengthExceeded {
                requested: 2,
                available: 1
            })
        );
        assert_eq!(guard.size(), 3);
        assert_eq!(guard.max_size(), 4);
    }

    #[test]
    fn test_raw_buffer_downcast() {
        let buffer = RawDynamicBuffer::new(Bytes::new(8));
        assert_eq!(buffer.backend_type_id(), TypeId::of::<Bytes>());

        let mut guard = buffer.lock();
        guard.grow(2).unwrap();
        assert_eq!(guard.downcast_mut::<Bytes>().map(|b| b.readable), Some(2));
        assert!(guard.downcast_mut::<Empty>().is_none());
    }

    #[test]
    fn test_raw_buffer_try_unwrap() {
        let buffer = RawDynamicBuffer::new(Bytes::new(8));
        buffer.lock().grow(5).unwrap();

        let other = buffer.clone();
        let buffer = match buffer.try_unwrap::<Bytes>() {
            Ok(_) => panic!("buffer is shared"),
            Err(buffer) => buffer,
        };
        drop(other);

        let buffer = match buffer.try_unwrap::<Empty>() {
            Ok(_) => panic!("wrong backend type"),
            Err(buffer) => buffer,
        };

        let bytes = buffer.try_unwrap::<Bytes>().ok().unwrap();
        assert_eq!(bytes.readable, 5);
    }

    #[test]
    fn test_send_sync() {
        static_assertions::assert_impl_all!(RawDynamicBuffer: Send, Sync);
        static_assertions::assert_not_impl_any!(RawBufferGuard<'static>: Send);
    }
}
