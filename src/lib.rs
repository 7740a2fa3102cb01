#![deny(
    missing_docs,
    clippy::missing_safety_doc,
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::as_ptr_cast_mut,
    clippy::ptr_as_ptr,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
// Make docs.rs generate better docs
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Runtime-polymorphic interfaces for asynchronous I/O objects.
//!
//! ## Overview
//!
//! Asynchronous I/O code is usually generic over its completion callbacks,
//! which makes it hard to put a socket, a pipe and a serial port behind one
//! trait object. polyio solves this with two pieces:
//!
//! - **Erased continuations.** Any completion callback is boxed into an
//!   [`ErasedContinuation<Args>`], one concrete type per completion
//!   signature, which still remembers where it wants to run, which arena its
//!   box came from and how its operation can be cancelled.
//! - **Capability interfaces.** Devices implement small, object-safe traits
//!   ([`Readable`], [`AsyncReadable`], [`Closable`], ...) taking erased
//!   continuations. Callers combine them into
//!   [capability sets](crate::sets) and program against `dyn` sets.
//!
//! Generic entry points such as
//! [`async_read_some`](capability::AsyncReadableExt::async_read_some)
//! accept any [completion token](initiate::CompletionToken) and erase it
//! before calling the device, so a single device implementation serves
//! closures, bound continuations and futures alike.
//!
//! ## Quick Example
//!
//! ```
//! use polyio::{
//!     buffer::{DynamicBuffer, VecBuffer},
//!     error::Status,
//!     executor::RunQueue,
//!     pipe,
//!     prelude::*,
//! };
//!
//! fn forward(source: &mut dyn ClosableReadStream, buffer: DynamicBuffer) {
//!     source
//!         .async_read_some(buffer, 1024, |status: Status, n: usize| {
//!             println!("read {n} bytes: {status:?}");
//!         })
//!         .expect("out of memory");
//! }
//!
//! let queue = RunQueue::new();
//! let (mut reader, mut writer) = pipe::connect(&queue.executor());
//! let buffer = DynamicBuffer::new(VecBuffer::new());
//!
//! forward(&mut reader, buffer.clone());
//! writer.write_some(b"hello")?;
//!
//! // Completions only run when the executor is driven.
//! queue.run();
//! assert_eq!(buffer.to_vec(), b"hello");
//! # Ok::<(), polyio::error::Error>(())
//! ```
//!
//! ## Core Concepts
//!
//! **Continuations** ([`continuation`]) are called exactly once with the
//! completion arguments, the first of which is always a
//! [`Status`](error::Status). They may carry three associations, attached
//! with binders:
//!
//! - an [`Executor`](executor::Executor) to be completed on
//!   ([`bind_executor`](continuation::bind_executor)),
//! - an [`Allocator`](memory::Allocator) their erased box is taken from
//!   ([`bind_allocator`](continuation::bind_allocator)),
//! - a [`CancellationSlot`](cancel::CancellationSlot) the operation installs
//!   its cancellation handler into
//!   ([`bind_cancellation_slot`](continuation::bind_cancellation_slot)).
//!
//! Erasure resolves the associations once. A continuation without an
//! executor of its own is completed on the device's executor.
//!
//! **Executors** ([`executor`]) run completions. polyio brings no runtime;
//! [`RunQueue`](executor::RunQueue) is a minimal single-threaded one for
//! tests and small programs.
//!
//! **Buffers** ([`buffer`]) are shared handles to growable byte storage, so
//! an asynchronous operation can keep its buffer alive without borrowing
//! from the caller.
//!
//! **Composite operations** ([`io`]) build complete transfers out of
//! `read_some`/`write_some` steps.
//!
//! ## Logging
//!
//! polyio emits [`tracing`] events at `trace` and `debug` level: when
//! continuations are erased, invoked or dropped without being invoked, when
//! allocation fails, when cancellation is emitted and when jobs run. The
//! `polyio-tracing` crate carries spans across the asynchronous boundary.
//!
//! [`ErasedContinuation<Args>`]: continuation::ErasedContinuation
//! [`Readable`]: capability::Readable
//! [`AsyncReadable`]: capability::AsyncReadable
//! [`Closable`]: capability::Closable

pub mod buffer;
pub mod cancel;
pub mod capability;
pub mod continuation;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod initiate;
pub mod io;
pub mod memory;
pub mod pipe;
pub mod prelude;
pub mod sets;
