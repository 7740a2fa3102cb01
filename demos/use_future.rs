//! Awaits device operations as futures with [`UseFuture`].
//!
//! polyio does not ship an async runtime. Completions run on an executor, so
//! this example polls the futures by hand and runs the [`RunQueue`] between
//! polls until they resolve.
//!
//! It also shows that dropping a pending [`Operation`] cancels it: the
//! pipe forgets the read and the data stays available to the next reader.
//!
//! # Running this Example
//!
//! ```bash
//! cargo run --example use_future
//! ```

use std::{
    pin::Pin,
    task::{Context, Poll, Waker},
};

use polyio::{
    buffer::{DynamicBuffer, VecBuffer},
    executor::RunQueue,
    initiate::Operation,
    pipe,
    prelude::*,
};

/// Polls `operation`, running one queued job between polls, until it
/// resolves.
fn drive<Args: Send + 'static>(queue: &RunQueue, mut operation: Operation<Args>) -> Args {
    let mut cx = Context::from_waker(Waker::noop());
    loop {
        if let Poll::Ready(args) = Pin::new(&mut operation).poll(&mut cx) {
            return args;
        }
        if !queue.run_one() {
            panic!("operation is waiting for something that never happens");
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let queue = RunQueue::new();
    let (mut reader, mut writer) = pipe::connect(&queue.executor());

    // Example 1: a read that resolves once data was written
    let buffer = DynamicBuffer::new(VecBuffer::new());
    let read = reader.async_read_some(buffer.clone(), 64, UseFuture)?;
    writer.write_some(b"first")?;
    let (status, n) = drive(&queue, read);
    println!("read resolved with {status:?}, {n} bytes: {:?}", buffer.to_vec());

    // Example 2: dropping a pending read cancels it
    let abandoned = reader.async_read_some(DynamicBuffer::new(VecBuffer::new()), 64, UseFuture)?;
    drop(abandoned);
    println!("cancelled read completions: {}", queue.run());

    writer.write_some(b"second")?;
    let mut out = [0u8; 16];
    let n = reader.read_some(&mut out)?;
    println!("blocking read after cancellation: {:?}", &out[..n]);

    // Example 3: a write future
    let outgoing = DynamicBuffer::new(VecBuffer::from_vec(b"third".to_vec()));
    let write = writer.async_write_some(outgoing, UseFuture)?;
    let (status, n) = drive(&queue, write);
    println!("write resolved with {status:?}, {n} bytes");

    Ok(())
}
