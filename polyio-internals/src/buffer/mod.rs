//! Module containing the shared, growable byte buffer

mod data;
mod raw;
mod vtable;

pub use self::raw::{RawBufferGuard, RawDynamicBuffer};
