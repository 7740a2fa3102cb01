#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! Tracing span propagation for polyio continuations.
//!
//! A continuation runs long after the code that started its operation
//! returned, usually from an executor's run loop, where the caller's
//! [`Span`] is no longer entered. Wrapping the continuation with
//! [`InstrumentExt::instrument`] or [`InstrumentExt::in_current_span`]
//! captures a span at initiation and re-enters it for the completion.
//!
//! # Quick Start
//!
//! ```
//! use polyio::{executor::RunQueue, initiate};
//! use polyio_tracing::InstrumentExt;
//!
//! let queue = RunQueue::new();
//!
//! let span = tracing::info_span!("request", id = 7);
//! let _entered = span.enter();
//! initiate::post(
//!     &queue.executor(),
//!     (|| tracing::info!("completed")).in_current_span(),
//! )?;
//! drop(_entered);
//!
//! // "completed" is recorded inside `request{id=7}`.
//! queue.run();
//! # Ok::<(), polyio::memory::AllocError>(())
//! ```
//!
//! The wrapper forwards the executor, allocator and cancellation slot of the
//! wrapped continuation, so it can be combined freely with the binders of
//! [`polyio::continuation`].

use polyio::{
    cancel::CancellationSlot, continuation::Continuation, executor::Executor, memory::Allocator,
};
use tracing::Span;

/// A continuation that enters a span while it completes.
///
/// Created by [`InstrumentExt::instrument`] and
/// [`InstrumentExt::in_current_span`].
#[derive(Clone, Debug)]
pub struct Instrumented<K> {
    span: Span,
    inner: K,
}

impl<K> Instrumented<K> {
    /// The span entered at completion.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Returns a reference to the wrapped continuation.
    pub fn get_ref(&self) -> &K {
        &self.inner
    }

    /// Unwraps the continuation, dropping the span.
    pub fn into_inner(self) -> K {
        self.inner
    }
}

impl<K, Args> Continuation<Args> for Instrumented<K>
where
    K: Continuation<Args>,
{
    fn complete(self, args: Args) {
        let _entered = self.span.enter();
        self.inner.complete(args)
    }

    fn allocator(&self) -> Allocator {
        self.inner.allocator()
    }

    fn executor(&self) -> Option<Executor> {
        self.inner.executor()
    }

    fn cancellation_slot(&self) -> Option<CancellationSlot> {
        self.inner.cancellation_slot()
    }
}

/// Extension trait attaching spans to continuations.
pub trait InstrumentExt: Sized {
    /// Completes `self` inside `span`.
    ///
    /// # Examples
    ///
    /// ```
    /// use polyio::error::Status;
    /// use polyio_tracing::InstrumentExt;
    ///
    /// let continuation = (|status: Status| assert!(status.is_ok()))
    ///     .instrument(tracing::debug_span!("flush"));
    /// // No subscriber is installed, so the span records nothing.
    /// assert!(continuation.span().is_disabled());
    /// ```
    fn instrument(self, span: Span) -> Instrumented<Self> {
        Instrumented { span, inner: self }
    }

    /// Completes `self` inside the span that is current when this method is
    /// called.
    fn in_current_span(self) -> Instrumented<Self> {
        self.instrument(Span::current())
    }
}

impl<K> InstrumentExt for K {}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use polyio::{
        cancel::CancellationSignal,
        continuation::{ErasedContinuation, bind_cancellation_slot, bind_executor},
        error::Status,
        executor::RunQueue,
        initiate,
    };
    use tracing_subscriber::{Layer, Registry, layer::SubscriberExt, registry::LookupSpan};

    use super::*;

    /// Records the name of the span each event was emitted in.
    #[derive(Clone, Default)]
    struct SpanNames(Arc<Mutex<Vec<Option<String>>>>);

    impl<S> Layer<S> for SpanNames
    where
        S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if event.metadata().target() != module_path!() {
                return;
            }
            let name = ctx.event_span(event).map(|span| span.name().to_owned());
            self.0.lock().unwrap().push(name);
        }
    }

    fn with_recorder(f: impl FnOnce()) -> Vec<Option<String>> {
        let names = SpanNames::default();
        let subscriber = Registry::default().with(names.clone());
        tracing::subscriber::with_default(subscriber, f);
        names.0.lock().unwrap().clone()
    }

    #[test]
    fn test_completion_runs_in_captured_span() {
        let names = with_recorder(|| {
            let queue = RunQueue::new();

            {
                let span = tracing::info_span!("request");
                let _entered = span.enter();
                initiate::post(
                    &queue.executor(),
                    (|| tracing::info!("completed")).in_current_span(),
                )
                .unwrap();
            }

            initiate::post(&queue.executor(), || tracing::info!("plain")).unwrap();
            queue.run();
        });

        assert_eq!(names, vec![Some("request".to_owned()), None]);
    }

    #[test]
    fn test_explicit_span() {
        let names = with_recorder(|| {
            let queue = RunQueue::new();
            let continuation = ErasedContinuation::new(
                (|status: Status| tracing::info!(?status, "done"))
                    .instrument(tracing::info_span!("write")),
                &queue.executor(),
            )
            .unwrap();

            continuation.invoke((Ok(()),));
        });

        assert_eq!(names, vec![Some("write".to_owned())]);
    }

    #[test]
    fn test_forwards_associations() {
        let queue = RunQueue::new();
        let signal = CancellationSignal::new();

        let continuation = bind_executor(
            queue.executor(),
            bind_cancellation_slot(signal.slot(), |_: Status| {}),
        )
        .in_current_span();

        assert_eq!(
            Continuation::<(Status,)>::executor(&continuation),
            Some(queue.executor())
        );
        assert_eq!(
            Continuation::<(Status,)>::cancellation_slot(&continuation),
            Some(signal.slot())
        );
        assert!(Continuation::<(Status,)>::allocator(&continuation).is_default());
    }

    #[test]
    fn test_send() {
        static_assertions::assert_impl_all!(Instrumented<fn()>: Send, Sync, Clone);
    }
}
