#![no_std]
#![forbid(
    missing_docs,
    clippy::alloc_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::std_instead_of_core,
    clippy::missing_safety_doc,
    clippy::missing_docs_in_private_items,
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
#![allow(rustdoc::private_intra_doc_links)]
//! Internal implementation crate for [`polyio`].
//!
//! # Overview
//!
//! This crate contains the low-level, type-erased data structures and unsafe
//! operations that power the [`polyio`] library. It provides the
//! foundation for turning arbitrary completion continuations and growable
//! byte buffers into single concrete types with vtable-based dispatch.
//!
//! **This crate is an implementation detail.** No semantic versioning guarantees
//! are provided. Users should depend on the [`polyio`] crate, not this one.
//!
//! # Architecture
//!
//! The crate is organized around two erased object kinds:
//!
//! - **[`continuation`]**: One-shot, self-destroying continuation boxes
//!   - [`RawContinuation`]: Owned box allocated from a [`MemoryResource`]
//!   - [`RawContinuationRef`]: Borrowed view used for the association queries
//!   - [`ContinuationData`]: `#[repr(C)]` header enabling field access on erased types
//!   - [`ContinuationVtable`]: Function pointers for invoke and destroy
//!
//! - **[`buffer`]**: Shared, growable byte buffers
//!   - [`RawDynamicBuffer`]: Reference-counted pointer backed by [`triomphe::Arc`]
//!   - [`RawBufferGuard`]: Exclusive access to the backend while locked
//!   - [`BufferData`]: `#[repr(C)]` header with the vtable and the lock
//!   - [`BufferVtable`]: Function pointers forwarding to a [`BufferBackend`]
//!
//! - **[`memory`]**: The arena contract continuation boxes are allocated from
//! - **[`handlers`]**: Dispatch strategies used when an erased continuation
//!   is invoked
//! - **[`backend`]**: The contract growable-buffer implementations fulfil
//!
//! # Safety Strategy
//!
//! When a `ContinuationData<Args, M, MyClosure>` is erased to
//! `ContinuationData<Args, M, Erased>`, the vtable function pointers stored in
//! the header must still match the concrete type stored in memory, and the
//! memory must be returned to the exact resource it was taken from.
//!
//! This crate maintains safety through:
//!
//! - **Module-based encapsulation**: Safety-critical types keep fields
//!   module-private, making invariants locally verifiable within a single file
//! - **`#[repr(C)]` layout**: Enables safe field projection on type-erased
//!   pointers without constructing invalid references
//! - **Resource pinning**: The resource used for allocation is stored next to
//!   the vtable and is the only resource ever used for deallocation
//! - **Consuming operations**: Invocation takes the raw continuation by value,
//!   so a box can never be invoked twice or queried after it was freed
//!
//! [`polyio`]: https://docs.rs/polyio/latest/polyio/
//! [`ContinuationData`]: continuation::data::ContinuationData
//! [`ContinuationVtable`]: continuation::vtable::ContinuationVtable
//! [`BufferData`]: buffer::data::BufferData
//! [`BufferVtable`]: buffer::vtable::BufferVtable
//! [`MemoryResource`]: memory::MemoryResource
//! [`BufferBackend`]: backend::BufferBackend

extern crate alloc;

pub mod backend;
mod buffer;
mod continuation;
pub mod handlers;
pub mod memory;
mod util;

pub use buffer::{RawBufferGuard, RawDynamicBuffer};
pub use continuation::{RawContinuation, RawContinuationRef};
