//! Module containing the one-shot continuation box

mod data;
mod raw;
mod vtable;

pub use self::raw::{RawContinuation, RawContinuationRef};
