//! This module encapsulates the fields of the [`ContinuationData`]. They are
//! only visible inside the `continuation` module, where the vtable needs them
//! to move the continuation out of the box. This means that the type of the
//! [`ContinuationVtable`] is guaranteed to always be in sync with the type of
//! the actual continuation, and the stored resource is guaranteed to be the
//! resource the box was allocated from. This follows from the fact that they
//! are in sync when created and that the API offers no way to change either
//! after creation.

use crate::{
    continuation::{raw::RawContinuationRef, vtable::ContinuationVtable},
    handlers::ContinuationHandler,
    memory::SharedResource,
};

/// Type-erased continuation box with vtable-based dispatch.
///
/// This struct uses `#[repr(C)]` to enable safe field access in type-erased
/// contexts, allowing access to the vtable, the resource and the metadata even
/// when the concrete continuation type `C` is unknown. The continuation is the
/// last field, so the offsets of all other fields do not depend on `C`.
#[repr(C)]
pub(crate) struct ContinuationData<Args: 'static, M: 'static, C: 'static> {
    /// The Vtable of this continuation
    pub(super) vtable: &'static ContinuationVtable<Args, M>,
    /// The resource the memory of this box was allocated from
    pub(super) resource: SharedResource,
    /// Metadata resolved when the continuation was erased
    pub(super) meta: M,
    /// The actual continuation
    pub(super) continuation: C,
}

impl<Args: 'static, M: 'static, C: 'static> ContinuationData<Args, M, C> {
    /// Creates a new [`ContinuationData`] with the specified handler,
    /// continuation, metadata and resource.
    ///
    /// This method creates the vtable for type-erased dispatch and pairs it
    /// with the continuation.
    #[inline]
    pub(super) fn new<H: ContinuationHandler<C, Args>>(
        continuation: C,
        meta: M,
        resource: SharedResource,
    ) -> Self {
        Self {
            vtable: ContinuationVtable::new::<C, H>(),
            resource,
            meta,
            continuation,
        }
    }
}

impl<'a, Args: 'static, M: 'static> RawContinuationRef<'a, Args, M> {
    /// Returns a reference to the [`ContinuationVtable`] of the
    /// [`ContinuationData`] instance.
    #[inline]
    pub(super) fn vtable(self) -> &'static ContinuationVtable<Args, M> {
        let ptr = self.as_ptr();
        // SAFETY: We don't know the actual inner continuation type, but we do
        // know that it points to an instance of `ContinuationData<Args, M, C>`
        // for some specific `C`. Since `ContinuationData` is `#[repr(C)]` and the
        // continuation is its last field, it is safe to create pointers to the
        // fields before it.
        //
        // We need to take care to avoid creating an actual reference to the
        // `ContinuationData` itself though, as that would still be undefined
        // behavior since we don't have the right type.
        let vtable_ptr: *const &'static ContinuationVtable<Args, M> =
            unsafe { &raw const (*ptr).vtable };

        // SAFETY: Dereferencing the pointer and getting out the `&'static
        // ContinuationVtable` is valid for the same reasons
        unsafe { *vtable_ptr }
    }

    /// Returns a reference to the [`SharedResource`] the box was allocated
    /// from.
    #[inline]
    pub fn resource(self) -> &'a SharedResource {
        let ptr = self.as_ptr();
        // SAFETY: Same reasoning as in `vtable`: the field precedes the
        // continuation and its type does not depend on `C`.
        let resource_ptr: *const SharedResource = unsafe { &raw const (*ptr).resource };

        // SAFETY: The field is initialized for as long as the box is alive,
        // which is at least `'a` by the invariants of `RawContinuationRef`.
        unsafe { &*resource_ptr }
    }

    /// Returns a reference to the metadata stored next to the continuation.
    #[inline]
    pub fn meta(self) -> &'a M {
        let ptr = self.as_ptr();
        // SAFETY: Same reasoning as in `vtable`: the field precedes the
        // continuation and its type does not depend on `C`.
        let meta_ptr: *const M = unsafe { &raw const (*ptr).meta };

        // SAFETY: The field is initialized for as long as the box is alive,
        // which is at least `'a` by the invariants of `RawContinuationRef`.
        unsafe { &*meta_ptr }
    }
}
