//! Tests for the `tracing` events emitted by polyio.
//!
//! - `test_continuation_lifecycle_events`: erase, invoke and
//!   destroy-without-invoke are each reported
//! - `test_cancellation_events`: emission with and without a handler
//! - `test_run_queue_events`: every job run is reported

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use polyio::{
    cancel::{CancellationSignal, CancellationType},
    continuation::ErasedContinuation,
    executor::RunQueue,
    initiate,
};
use tracing::{
    Level,
    field::{Field, Visit},
};
use tracing_subscriber::{Layer, Registry, layer::SubscriberExt};

/// Collects `(level, message)` of every event emitted by polyio.
#[derive(Clone, Default)]
struct Messages(Arc<Mutex<Vec<(Level, String)>>>);

struct MessageVisitor<'a>(&'a mut String);

impl Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.0 = format!("{value:?}");
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for Messages {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        if !event.metadata().target().starts_with("polyio") {
            return;
        }
        let mut message = String::new();
        event.record(&mut MessageVisitor(&mut message));
        self.0
            .lock()
            .unwrap()
            .push((*event.metadata().level(), message));
    }
}

impl Messages {
    fn capture(f: impl FnOnce()) -> Vec<(Level, String)> {
        let messages = Messages::default();
        let subscriber = Registry::default().with(messages.clone());
        tracing::subscriber::with_default(subscriber, f);
        messages.0.lock().unwrap().clone()
    }
}

fn has(messages: &[(Level, String)], level: Level, text: &str) -> bool {
    messages.iter().any(|(l, m)| *l == level && m == text)
}

#[test]
fn test_continuation_lifecycle_events() {
    let messages = Messages::capture(|| {
        let queue = RunQueue::new();
        let invoked = ErasedContinuation::<()>::new(|| {}, &queue.executor()).unwrap();
        invoked.invoke(());

        let dropped = ErasedContinuation::<()>::new(|| {}, &queue.executor()).unwrap();
        drop(dropped);
    });

    let erased = messages
        .iter()
        .filter(|(_, m)| m == "continuation erased")
        .count();
    assert_eq!(erased, 2);
    assert!(has(&messages, Level::TRACE, "invoking continuation"));
    assert!(has(
        &messages,
        Level::TRACE,
        "continuation destroyed without being invoked"
    ));
}

#[test]
fn test_cancellation_events() {
    let messages = Messages::capture(|| {
        let signal = CancellationSignal::new();
        signal.emit(CancellationType::Total);

        signal.slot().assign(|_| {});
        signal.emit(CancellationType::Terminal);
    });

    assert!(has(
        &messages,
        Level::TRACE,
        "cancellation emitted with no handler"
    ));
    assert!(has(&messages, Level::DEBUG, "cancellation emitted"));
}

#[test]
fn test_run_queue_events() {
    let messages = Messages::capture(|| {
        let queue = RunQueue::new();
        for _ in 0..3 {
            initiate::post(&queue.executor(), || {}).unwrap();
        }
        queue.run();
    });

    let runs = messages.iter().filter(|(_, m)| m == "running job").count();
    assert_eq!(runs, 3);
}
