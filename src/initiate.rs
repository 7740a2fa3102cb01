//! Bridging generic completion tokens to erased device calls.
//!
//! Every asynchronous entry point accepts a [`CompletionToken`]: either a
//! [`Continuation`], which is erased and handed to the device, or
//! [`UseFuture`], which turns the operation into an [`Operation`] future.
//! The entry point's return type depends on the token.
//!
//! ```
//! use std::{
//!     pin::Pin,
//!     task::{Context, Poll, Waker},
//! };
//!
//! use polyio::{
//!     executor::RunQueue,
//!     initiate::{self, UseFuture},
//! };
//!
//! let queue = RunQueue::new();
//!
//! // With a continuation, initiation only reports allocation failure.
//! initiate::post(&queue.executor(), || println!("posted"))?;
//!
//! // With `UseFuture`, it returns a future of the completion arguments.
//! let mut operation = initiate::post(&queue.executor(), UseFuture)?;
//! let mut cx = Context::from_waker(Waker::noop());
//! assert!(Pin::new(&mut operation).poll(&mut cx).is_pending());
//!
//! queue.run();
//! assert_eq!(Pin::new(&mut operation).poll(&mut cx), Poll::Ready(()));
//! # Ok::<(), polyio::memory::AllocError>(())
//! ```

use core::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll, Waker},
};

use triomphe::Arc;

use crate::{
    cancel::{CancellationSignal, CancellationSlot, CancellationType},
    continuation::{Continuation, ErasedContinuation},
    error::Status,
    executor::Executor,
    memory::AllocError,
};

/// Something an asynchronous operation can be completed into.
pub trait CompletionToken<Args: 'static> {
    /// What the initiating call returns.
    type Output;

    /// Erases the token with `fallback` as fallback executor and passes the
    /// erased continuation to `initiation`, which starts the operation.
    fn initiate<F>(self, fallback: &Executor, initiation: F) -> Self::Output
    where
        F: FnOnce(ErasedContinuation<Args>);
}

impl<Args: 'static, K: Continuation<Args>> CompletionToken<Args> for K {
    type Output = Result<(), AllocError>;

    fn initiate<F>(self, fallback: &Executor, initiation: F) -> Self::Output
    where
        F: FnOnce(ErasedContinuation<Args>),
    {
        initiation(ErasedContinuation::new(self, fallback)?);
        Ok(())
    }
}

/// Starts an operation with `token` as its completion.
///
/// `initiation` receives the erased continuation and must arrange for it to
/// be completed exactly once, without completing it inline.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use polyio::{
///     continuation::ErasedContinuation, error::Status, executor::RunQueue, initiate,
/// };
///
/// let queue = RunQueue::new();
/// let seen = Arc::new(Mutex::new(None));
///
/// let s = seen.clone();
/// initiate::initiate(
///     &queue.executor(),
///     move |status: Status, n: usize| *s.lock().unwrap() = Some((status, n)),
///     |continuation: ErasedContinuation<(Status, usize)>| continuation.post((Ok(()), 3)),
/// )?;
///
/// queue.run();
/// assert_eq!(*seen.lock().unwrap(), Some((Ok(()), 3)));
/// # Ok::<(), polyio::memory::AllocError>(())
/// ```
pub fn initiate<Args, T, F>(executor: &Executor, token: T, initiation: F) -> T::Output
where
    Args: 'static,
    T: CompletionToken<Args>,
    F: FnOnce(ErasedContinuation<Args>),
{
    token.initiate(executor, initiation)
}

/// Completes `token` from a job posted to `executor`, or to the token's own
/// executor if it has one.
pub fn post<T: CompletionToken<()>>(executor: &Executor, token: T) -> T::Output {
    token.initiate(executor, |continuation| continuation.post(()))
}

/// Completes `token` through `executor`, inline if the caller is already
/// running on it.
pub fn dispatch<T: CompletionToken<()>>(executor: &Executor, token: T) -> T::Output {
    token.initiate(executor, |continuation| continuation.dispatch(()))
}

/// Completes `token` from a job deferred to `executor`.
pub fn defer<T: CompletionToken<()>>(executor: &Executor, token: T) -> T::Output {
    token.initiate(executor, |continuation| continuation.defer(()))
}

/// Completion token that turns an operation into an [`Operation`] future.
#[derive(Copy, Clone, Debug, Default)]
pub struct UseFuture;

/// Progress of an [`Operation`].
enum State<Args> {
    Pending(Option<Waker>),
    Ready(Args),
    Taken,
}

/// State shared between an [`Operation`] and its continuation.
struct Shared<Args> {
    state: spin::Mutex<State<Args>>,
}

/// The continuation behind [`UseFuture`].
///
/// Carries the cancellation slot of the [`Operation`], so dropping the
/// future cancels the device operation.
struct FutureContinuation<Args> {
    shared: Arc<Shared<Args>>,
    slot: CancellationSlot,
}

impl<Args: Send + 'static> Continuation<Args> for FutureContinuation<Args> {
    fn complete(self, args: Args) {
        let waker = {
            let mut state = self.shared.state.lock();
            match core::mem::replace(&mut *state, State::Ready(args)) {
                State::Pending(waker) => waker,
                State::Ready(_) | State::Taken => {
                    unreachable!("operation completed more than once")
                }
            }
        };

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    fn cancellation_slot(&self) -> Option<CancellationSlot> {
        Some(self.slot.clone())
    }
}

/// A future resolving to the completion arguments of an operation started
/// with [`UseFuture`].
///
/// Dropping the future before it resolves emits
/// [`CancellationType::Terminal`] to the operation.
#[must_use = "dropping an operation cancels it"]
pub struct Operation<Args> {
    shared: Arc<Shared<Args>>,
    signal: CancellationSignal,
}

impl<Args: Send + 'static> Operation<Args> {
    fn start<F>(fallback: &Executor, initiation: F) -> Result<Self, AllocError>
    where
        F: FnOnce(ErasedContinuation<Args>),
    {
        let shared = Arc::new(Shared {
            state: spin::Mutex::new(State::Pending(None)),
        });
        let signal = CancellationSignal::new();
        let continuation = FutureContinuation {
            shared: shared.clone(),
            slot: signal.slot(),
        };

        initiation(ErasedContinuation::new(continuation, fallback)?);
        Ok(Self { shared, signal })
    }
}

impl<Args> Operation<Args> {
    /// Returns `true` once the operation completed and its result was not
    /// taken yet.
    pub fn is_ready(&self) -> bool {
        matches!(*self.shared.state.lock(), State::Ready(_))
    }

    /// Asks the operation to stop early.
    ///
    /// The future still resolves, usually with
    /// [`Error::Aborted`](crate::error::Error::Aborted).
    pub fn cancel(&self, kind: CancellationType) {
        self.signal.emit(kind)
    }
}

impl<Args> Future for Operation<Args> {
    type Output = Args;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Args> {
        let mut state = self.shared.state.lock();
        match core::mem::replace(&mut *state, State::Taken) {
            State::Ready(args) => Poll::Ready(args),
            State::Pending(_) => {
                *state = State::Pending(Some(cx.waker().clone()));
                Poll::Pending
            }
            State::Taken => panic!("operation polled after completion"),
        }
    }
}

impl<Args> Drop for Operation<Args> {
    fn drop(&mut self) {
        let pending = matches!(*self.shared.state.lock(), State::Pending(_));
        if pending {
            tracing::debug!("operation dropped before completion");
            self.signal.emit(CancellationType::Terminal);
        }
    }
}

impl<Args> fmt::Debug for Operation<Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match *self.shared.state.lock() {
            State::Pending(_) => "pending",
            State::Ready(_) => "ready",
            State::Taken => "taken",
        };
        f.debug_struct("Operation").field("state", &state).finish()
    }
}

macro_rules! impl_use_future {
    ($($args:ty),* $(,)?) => {
        $(
            impl CompletionToken<$args> for UseFuture {
                type Output = Result<Operation<$args>, AllocError>;

                fn initiate<F>(self, fallback: &Executor, initiation: F) -> Self::Output
                where
                    F: FnOnce(ErasedContinuation<$args>),
                {
                    Operation::start(fallback, initiation)
                }
            }
        )*
    };
}

impl_use_future!((), (Status,), (Status, usize), (Status, i32));

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    };

    use super::*;
    use crate::{error::Error, executor::RunQueue};

    fn poll_once<F: Future + Unpin>(future: &mut F) -> Poll<F::Output> {
        let mut cx = Context::from_waker(Waker::noop());
        Pin::new(future).poll(&mut cx)
    }

    #[test]
    fn test_post_never_runs_inline() {
        let queue = RunQueue::new();
        let ran = Arc::new(AtomicBool::new(false));

        let r = ran.clone();
        post(&queue.executor(), move || r.store(true, Ordering::SeqCst)).unwrap();

        assert!(!ran.load(Ordering::SeqCst));
        queue.run();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_dispatch_inside_executor_runs_inline() {
        let queue = RunQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let executor = queue.executor();
        let o = order.clone();
        post(&queue.executor(), move || {
            let inner = o.clone();
            dispatch(&executor, move || inner.lock().unwrap().push("dispatched")).unwrap();
            o.lock().unwrap().push("after");
        })
        .unwrap();

        queue.run();
        assert_eq!(*order.lock().unwrap(), vec!["dispatched", "after"]);
    }

    #[test]
    fn test_future_resolves_with_arguments() {
        let queue = RunQueue::new();

        let mut operation = initiate(
            &queue.executor(),
            UseFuture,
            |continuation: ErasedContinuation<(Status, usize)>| continuation.post((Ok(()), 7)),
        )
        .unwrap();

        assert!(poll_once(&mut operation).is_pending());
        assert!(!operation.is_ready());

        queue.run();
        assert!(operation.is_ready());
        assert_eq!(poll_once(&mut operation), Poll::Ready((Ok(()), 7)));
    }

    #[test]
    fn test_dropping_future_cancels() {
        let queue = RunQueue::new();
        let cancelled = Arc::new(Mutex::new(None));
        let pending: Arc<Mutex<Option<ErasedContinuation<(Status,)>>>> = Arc::default();

        let operation = initiate(
            &queue.executor(),
            UseFuture,
            |continuation: ErasedContinuation<(Status,)>| {
            let slot = continuation.cancellation_slot().cloned().unwrap();
            let c = cancelled.clone();
            let p = pending.clone();
            slot.assign(move |kind| {
                *c.lock().unwrap() = Some(kind);
                if let Some(continuation) = p.lock().unwrap().take() {
                    continuation.post((Err(Error::Aborted),));
                }
            });
            *pending.lock().unwrap() = Some(continuation);
            },
        )
        .unwrap();

        drop(operation);
        assert_eq!(*cancelled.lock().unwrap(), Some(CancellationType::Terminal));
        assert_eq!(queue.run(), 1);
    }

    #[test]
    fn test_completed_future_does_not_cancel() {
        let queue = RunQueue::new();
        let signal_seen = Arc::new(AtomicBool::new(false));

        let seen = signal_seen.clone();
        let operation = defer(&queue.executor(), UseFuture).unwrap();
        operation.signal.slot().assign(move |_| seen.store(true, Ordering::SeqCst));

        queue.run();
        assert!(operation.is_ready());
        drop(operation);
        assert!(!signal_seen.load(Ordering::SeqCst));
    }
}
