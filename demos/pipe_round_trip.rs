//! Moves a message through a small in-memory pipe with the composed
//! operations.
//!
//! The writer pushes the whole message with [`io::async_write`] while the
//! reader collects it with [`io::async_read`]. The pipe only holds eight
//! bytes, so both operations take several steps, each one re-issued from the
//! completion of the previous one. When the write is done the writer closes
//! its end, which ends the read with [`Error::Eof`].
//!
//! # Running this Example
//!
//! ```bash
//! cargo run --example pipe_round_trip
//! ```
//!
//! Raise the subscriber's level to `TRACE` to see every step of both
//! transfers.

use std::sync::{Arc, Mutex};

use polyio::{
    buffer::{DynamicBuffer, RingBuffer, VecBuffer},
    error::{Error, Status},
    executor::RunQueue,
    io, pipe,
    prelude::*,
};

const MESSAGE: &[u8] = b"continuations all the way down";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let queue = RunQueue::new();
    let (reader, writer) = pipe::connect_with_capacity(&queue.executor(), 8);

    let outgoing = DynamicBuffer::new(VecBuffer::from_vec(MESSAGE.to_vec()));
    let mut closing = writer.clone();
    io::async_write(
        &writer,
        outgoing,
        io::transfer_all(),
        move |status: Status, written: usize| {
            println!("write finished: {status:?}, {written} bytes");
            if let Err(error) = closing.close() {
                println!("close failed: {error}");
            }
        },
    )?;
    drop(writer);

    let incoming = DynamicBuffer::new(RingBuffer::new());
    let result = Arc::new(Mutex::new(None));
    let r = result.clone();
    io::async_read(
        &reader,
        incoming.clone(),
        io::transfer_all(),
        move |status: Status, read: usize| {
            *r.lock().unwrap_or_else(|e| e.into_inner()) = Some((status, read));
        },
    )?;

    let jobs = queue.run();
    println!("ran {jobs} completions");

    let result = result.lock().unwrap_or_else(|e| e.into_inner()).take();
    match result {
        Some((Err(Error::Eof), read)) => {
            println!(
                "read {read} bytes before end of file: {:?}",
                String::from_utf8_lossy(&incoming.to_vec())
            );
            assert_eq!(incoming.to_vec(), MESSAGE);
        }
        other => println!("unexpected read result: {other:?}"),
    }

    Ok(())
}
