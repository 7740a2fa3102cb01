//! Allocation preferences of continuations.
//!
//! Every continuation can say which [`MemoryResource`] its erased box should
//! be allocated from by returning an [`Allocator`] from
//! [`Continuation::allocator`](crate::continuation::Continuation::allocator).
//! An [`Allocator`] without an explicit resource falls back to the
//! process-wide default resource, which is the global allocator unless
//! replaced with [`set_default_resource`].
//!
//! ```
//! use polyio::memory::{Allocator, GlobalResource, SharedResource};
//!
//! let arena = SharedResource::new(GlobalResource);
//! let allocator = Allocator::new(arena.clone());
//!
//! assert!(!allocator.is_default());
//! assert_eq!(allocator.resolve(), arena);
//! assert!(Allocator::default().is_default());
//! ```

pub use polyio_internals::memory::{AllocError, GlobalResource, MemoryResource, SharedResource};

/// The resource installed with [`set_default_resource`], if any.
static DEFAULT_RESOURCE: spin::RwLock<Option<SharedResource>> = spin::RwLock::new(None);

/// The lazily created handle to [`GlobalResource`].
static GLOBAL: spin::Once<SharedResource> = spin::Once::new();

/// Returns the shared handle to the global allocator.
///
/// Every call returns a handle to the same instance.
pub fn global_resource() -> SharedResource {
    GLOBAL
        .call_once(|| SharedResource::new(GlobalResource))
        .clone()
}

/// Returns the resource used by continuations without an explicit
/// preference.
pub fn default_resource() -> SharedResource {
    DEFAULT_RESOURCE
        .read()
        .clone()
        .unwrap_or_else(global_resource)
}

/// Replaces the process-wide default resource and returns the previous one.
///
/// Passing `None` restores the global allocator. Continuations that were
/// already erased keep using the resource they were allocated from.
pub fn set_default_resource(resource: Option<SharedResource>) -> Option<SharedResource> {
    tracing::debug!(
        resource = ?resource.as_ref().map(SharedResource::addr),
        "replacing default memory resource"
    );
    core::mem::replace(&mut *DEFAULT_RESOURCE.write(), resource)
}

/// The allocation preference of a continuation.
///
/// Two allocators compare equal when they name the same resource instance, or
/// when both defer to the default resource.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Allocator {
    resource: Option<SharedResource>,
}

impl Allocator {
    /// An allocator that allocates from `resource`.
    pub fn new(resource: SharedResource) -> Self {
        Self {
            resource: Some(resource),
        }
    }

    /// The explicit resource, or `None` when the default resource is used.
    pub fn resource(&self) -> Option<&SharedResource> {
        self.resource.as_ref()
    }

    /// Returns `true` if this allocator defers to the default resource.
    pub fn is_default(&self) -> bool {
        self.resource.is_none()
    }

    /// The resource allocations are taken from right now.
    pub fn resolve(&self) -> SharedResource {
        match &self.resource {
            Some(resource) => resource.clone(),
            None => default_resource(),
        }
    }
}

impl From<SharedResource> for Allocator {
    fn from(resource: SharedResource) -> Self {
        Self::new(resource)
    }
}
