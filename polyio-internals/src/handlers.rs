//! Dispatch strategies for erased continuations.
//!
//! A [`RawContinuation`](crate::RawContinuation) stores a continuation value of
//! some type `C` together with a handler type `H`. When the erased box is
//! invoked, the vtable moves the value out of the box, frees the box, and
//! then hands the value and the completion arguments to `H::invoke`.
//!
//! Splitting the value from the strategy keeps this crate independent of the
//! continuation traits defined by the [`polyio`] crate: the handler is the
//! only place that knows how to call a `C`.
//!
//! [`polyio`]: https://docs.rs/polyio/latest/polyio/

/// Trait for defining how an erased continuation of type `C` is called with
/// the completion arguments `Args`.
///
/// # When to Implement
///
/// You typically don't need to implement this trait directly. The polyio
/// library provides a built-in handler that forwards to its `Continuation`
/// trait, which is implemented for every closure of matching arity.
///
/// Implement this trait when the continuation value is not itself callable,
/// for example a message that should be pushed to a queue on completion.
///
/// # Examples
///
/// ```
/// use polyio_internals::{
///     RawContinuation, handlers::ContinuationHandler, memory::SharedResource,
///     memory::GlobalResource,
/// };
///
/// // Calls any closure taking a single `u32`.
/// struct CallOnce;
///
/// impl<F: FnOnce(u32) + 'static> ContinuationHandler<F, (u32,)> for CallOnce {
///     fn invoke(continuation: F, (value,): (u32,)) {
///         continuation(value)
///     }
/// }
///
/// let raw = RawContinuation::<(u32,), ()>::new::<_, CallOnce>(
///     |value: u32| assert_eq!(value, 7),
///     (),
///     SharedResource::new(GlobalResource),
/// )
/// .unwrap();
/// raw.invoke((7,));
/// ```
pub trait ContinuationHandler<C, Args>: 'static {
    /// Calls `continuation` with the completion arguments.
    ///
    /// By the time this runs, the box that held `continuation` has already
    /// been destroyed and its memory returned to the resource it came from.
    /// The continuation is therefore free to start a new operation that
    /// allocates a new box, even from the same resource.
    fn invoke(continuation: C, args: Args);
}
