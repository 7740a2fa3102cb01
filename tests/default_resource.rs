//! Tests that replace the process-wide default memory resource.
//!
//! These live in their own binary since the default resource is global
//! state. The tests take `LOCK` so they do not observe each other's
//! resources.
//!
//! - `test_scenario_default_arena_only`: a continuation without an arena
//!   preference, bound to an executor, is allocated from the default
//!   resource and from nothing else
//! - `test_erased_keep_their_resource`: replacing the default does not
//!   affect continuations that were already erased
//! - `test_restore_global_default`

use std::{
    alloc::Layout,
    ptr::NonNull,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use polyio::{
    continuation::{ErasedContinuation, bind_allocator, bind_executor},
    error::Status,
    executor::RunQueue,
    memory::{
        AllocError, Allocator, GlobalResource, MemoryResource, SharedResource, default_resource,
        global_resource, set_default_resource,
    },
};

static LOCK: Mutex<()> = Mutex::new(());

#[derive(Default)]
struct Counting {
    allocations: AtomicUsize,
    deallocations: AtomicUsize,
}

struct Counted(Arc<Counting>);

// SAFETY: every block is obtained from and returned to `GlobalResource`
unsafe impl MemoryResource for Counted {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.0.allocations.fetch_add(1, Ordering::SeqCst);
        GlobalResource.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.0.deallocations.fetch_add(1, Ordering::SeqCst);
        // SAFETY: the block came from `GlobalResource` with this layout
        unsafe { GlobalResource.deallocate(ptr, layout) }
    }
}

fn counted() -> (Arc<Counting>, SharedResource) {
    let counting = Arc::new(Counting::default());
    let resource = SharedResource::new(Counted(counting.clone()));
    (counting, resource)
}

fn counts(counting: &Counting) -> (usize, usize) {
    (
        counting.allocations.load(Ordering::SeqCst),
        counting.deallocations.load(Ordering::SeqCst),
    )
}

#[test]
fn test_scenario_default_arena_only() {
    let _lock = LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let (default_counting, default) = counted();
    let (other_counting, other) = counted();
    let previous = set_default_resource(Some(default.clone()));

    let queue = RunQueue::new();
    let calls = Arc::new(Mutex::new(Vec::new()));

    let c = calls.clone();
    let continuation = ErasedContinuation::new(
        bind_executor(queue.executor(), move |status: Status, n: usize| {
            c.lock().unwrap().push((status, n))
        }),
        &RunQueue::new().executor(),
    )
    .unwrap();

    assert_eq!(continuation.executor(), &queue.executor());
    assert_eq!(continuation.resource(), &default);
    assert!(calls.lock().unwrap().is_empty());

    continuation.invoke((Ok(()), 42));

    assert_eq!(*calls.lock().unwrap(), vec![(Ok(()), 42)]);
    assert_eq!(counts(&default_counting), (1, 1));
    assert_eq!(counts(&other_counting), (0, 0));
    drop(other);

    set_default_resource(previous);
}

#[test]
fn test_erased_keep_their_resource() {
    let _lock = LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let (first_counting, first) = counted();
    let (second_counting, second) = counted();
    let queue = RunQueue::new();

    let previous = set_default_resource(Some(first.clone()));
    let erased = ErasedContinuation::<()>::new(|| {}, &queue.executor()).unwrap();

    set_default_resource(Some(second.clone()));
    let later = ErasedContinuation::<()>::new(|| {}, &queue.executor()).unwrap();
    let explicit = ErasedContinuation::<()>::new(
        bind_allocator(Allocator::new(first.clone()), || {}),
        &queue.executor(),
    )
    .unwrap();

    assert_eq!(erased.resource(), &first);
    assert_eq!(later.resource(), &second);
    assert_eq!(explicit.resource(), &first);

    erased.destroy();
    later.invoke(());
    explicit.invoke(());

    assert_eq!(counts(&first_counting), (2, 2));
    assert_eq!(counts(&second_counting), (1, 1));

    set_default_resource(previous);
}

#[test]
fn test_restore_global_default() {
    let _lock = LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let (_counting, resource) = counted();

    let previous = set_default_resource(Some(resource.clone()));
    assert_eq!(default_resource(), resource);
    assert!(!Allocator::default().resolve().ptr_eq(&global_resource()));

    assert_eq!(set_default_resource(None), Some(resource));
    assert_eq!(default_resource(), global_resource());

    set_default_resource(previous);
}
