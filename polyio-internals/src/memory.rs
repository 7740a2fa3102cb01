//! Memory resources that erased continuations are allocated from.
//!
//! A [`MemoryResource`] is the arena a continuation prefers for the one-time
//! allocation that boxing it requires. Resources are shared through
//! [`SharedResource`], a reference-counted handle whose identity is the
//! identity of the resource: two handles compare equal only when they point to
//! the same resource instance.

use core::{alloc::Layout, fmt, ptr::NonNull};

use triomphe::Arc;
use unsize::CoerceUnsize;

/// Error returned when a [`MemoryResource`] cannot satisfy an allocation
/// request.
///
/// This is the only checked failure of boxing a continuation. It is reported
/// synchronously to whoever asked for the continuation to be erased.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct AllocError;

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("memory allocation failed")
    }
}

impl core::error::Error for AllocError {}

/// A pluggable allocation strategy.
///
/// Implementations must be usable from any thread: a continuation may be
/// allocated on the thread that initiates an operation and freed on the
/// thread that completes it.
///
/// # Safety
///
/// Implementors must ensure that every pointer returned by
/// [`allocate`](MemoryResource::allocate) is aligned to the requested
/// alignment and valid for reads and writes of the requested size, and that
/// the block is not handed out again before it was passed to
/// [`deallocate`](MemoryResource::deallocate).
///
/// # Examples
///
/// ```
/// use core::{alloc::Layout, ptr::NonNull};
///
/// use polyio_internals::memory::{AllocError, GlobalResource, MemoryResource};
///
/// /// A resource that refuses every request above a size limit.
/// struct Limited(usize);
///
/// // SAFETY: every block is obtained from `GlobalResource`
/// unsafe impl MemoryResource for Limited {
///     fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
///         if layout.size() > self.0 {
///             return Err(AllocError);
///         }
///         GlobalResource.allocate(layout)
///     }
///
///     unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
///         // SAFETY: every pointer handed out came from `GlobalResource`
///         unsafe { GlobalResource.deallocate(ptr, layout) }
///     }
/// }
/// ```
pub unsafe trait MemoryResource: Send + Sync + 'static {
    /// Allocates a block of memory fitting `layout`.
    ///
    /// The returned pointer is aligned to `layout.align()` and valid for
    /// `layout.size()` bytes until it is passed back to
    /// [`deallocate`](MemoryResource::deallocate).
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Returns a block of memory to the resource.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` was returned by [`allocate`](MemoryResource::allocate) on this
    ///    same resource instance.
    /// 2. `layout` is the layout that was used for that allocation.
    /// 3. The block has not already been deallocated, and is not used after
    ///    this call.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The resource backed by the global allocator.
///
/// This is the arena used whenever a continuation does not express a
/// preference of its own and no other default has been installed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct GlobalResource;

// SAFETY: Non-empty blocks come straight from the global allocator, which
// upholds the same contract. Zero-sized blocks are never read or written.
unsafe impl MemoryResource for GlobalResource {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            let dangling = core::ptr::without_provenance_mut::<u8>(layout.align());
            return NonNull::new(dangling).ok_or(AllocError);
        }

        // SAFETY: The layout has a non-zero size, which is the only
        // requirement of `alloc::alloc::alloc`.
        let ptr = unsafe { alloc::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        // SAFETY:
        // 1. The pointer was returned by `alloc::alloc::alloc` in `allocate`
        //    (guaranteed by the caller).
        // 2. The layout matches the one used for the allocation (guaranteed by
        //    the caller).
        unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

/// A shared, type-erased handle to a [`MemoryResource`].
///
/// Cloning the handle is cheap and keeps the resource alive. The resource is
/// kept alive by every continuation allocated from it, so a resource is never
/// destroyed while memory handed out by it is still in use.
#[derive(Clone)]
pub struct SharedResource(Arc<dyn MemoryResource>);

impl SharedResource {
    /// Wraps `resource` in a new shared handle.
    pub fn new<R: MemoryResource>(resource: R) -> Self {
        let resource: Arc<R> = Arc::new(resource);
        Self(resource.unsize(unsize::Coercion!(to dyn MemoryResource)))
    }

    /// Returns the resource this handle points to.
    #[inline]
    pub fn as_resource(&self) -> &dyn MemoryResource {
        &*self.0
    }

    /// Returns `true` if both handles point to the same resource instance.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        core::ptr::addr_eq(&*self.0, &*other.0)
    }

    /// Returns the address of the resource, for diagnostics.
    #[inline]
    pub fn addr(&self) -> usize {
        (&*self.0 as *const dyn MemoryResource).cast::<()>() as usize
    }
}

impl PartialEq for SharedResource {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for SharedResource {}

impl fmt::Debug for SharedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedResource({:#x})", self.addr())
    }
}
