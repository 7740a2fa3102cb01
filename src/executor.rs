//! Scheduling contexts.
//!
//! polyio does not run anything on its own. Completions are delivered by
//! handing a [`Job`] to an [`Executor`], an opaque, cloneable handle to some
//! [`Scheduler`] implementation: a thread pool, an event loop, or the simple
//! [`RunQueue`] provided here for tests and single-threaded programs.
//!
//! Executors compare equal when they refer to the same scheduler instance.
//!
//! # Examples
//!
//! ```
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! use polyio::executor::{Job, RunQueue};
//!
//! let queue = RunQueue::new();
//! let executor = queue.executor();
//! let counter = Arc::new(AtomicUsize::new(0));
//!
//! let c = counter.clone();
//! executor.post(Job::new(move || {
//!     c.fetch_add(1, Ordering::SeqCst);
//! }));
//!
//! // Nothing runs until the queue is driven.
//! assert_eq!(counter.load(Ordering::SeqCst), 0);
//! assert_eq!(queue.run(), 1);
//! assert_eq!(counter.load(Ordering::SeqCst), 1);
//! ```

use std::{cell::Cell, collections::VecDeque, fmt};

use triomphe::Arc;
use unsize::CoerceUnsize;

/// A unit of work handed to a [`Scheduler`].
pub struct Job(Box<dyn FnOnce() + Send>);

impl Job {
    /// Wraps `f` into a job.
    #[inline]
    pub fn new<F: FnOnce() + Send + 'static>(f: F) -> Self {
        Self(Box::new(f))
    }

    /// Runs the job, consuming it.
    #[inline]
    pub fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Job")
    }
}

/// A scheduling runtime that jobs can be submitted to.
///
/// Only [`post`](Scheduler::post) is required. The other methods have
/// defaults that are correct for any scheduler, but a scheduler that knows
/// which thread it runs on should override
/// [`running_in_this_thread`](Scheduler::running_in_this_thread) so that
/// [`dispatch`](Scheduler::dispatch) can run jobs immediately.
pub trait Scheduler: Send + Sync + 'static {
    /// Queues `job` for later execution. Never runs it on the caller's stack.
    fn post(&self, job: Job);

    /// Runs `job` immediately if the caller is already inside this scheduler,
    /// otherwise queues it.
    fn dispatch(&self, job: Job) {
        if self.running_in_this_thread() {
            job.run();
        } else {
            self.post(job);
        }
    }

    /// Queues `job` as a continuation of the currently running job.
    ///
    /// Schedulers may use this to batch work; the default simply posts.
    fn defer(&self, job: Job) {
        self.post(job);
    }

    /// Returns `true` if the calling thread is currently running a job of
    /// this scheduler.
    fn running_in_this_thread(&self) -> bool {
        false
    }
}

/// A shared handle to a [`Scheduler`].
#[derive(Clone)]
pub struct Executor(Arc<dyn Scheduler>);

impl Executor {
    /// Wraps `scheduler` in a new executor handle.
    pub fn new<S: Scheduler>(scheduler: S) -> Self {
        Self::from_arc(Arc::new(scheduler))
    }

    /// Creates an executor handle from an already shared scheduler.
    ///
    /// Handles created from clones of the same `Arc` compare equal.
    pub fn from_arc<S: Scheduler>(scheduler: Arc<S>) -> Self {
        Self(scheduler.unsize(unsize::Coercion!(to dyn Scheduler)))
    }

    /// Returns the scheduler behind this handle.
    #[inline]
    pub fn scheduler(&self) -> &dyn Scheduler {
        &*self.0
    }

    /// See [`Scheduler::post`].
    #[inline]
    pub fn post(&self, job: Job) {
        self.0.post(job)
    }

    /// See [`Scheduler::dispatch`].
    #[inline]
    pub fn dispatch(&self, job: Job) {
        self.0.dispatch(job)
    }

    /// See [`Scheduler::defer`].
    #[inline]
    pub fn defer(&self, job: Job) {
        self.0.defer(job)
    }

    /// See [`Scheduler::running_in_this_thread`].
    #[inline]
    pub fn running_in_this_thread(&self) -> bool {
        self.0.running_in_this_thread()
    }

    /// Returns the address of the scheduler, for diagnostics.
    #[inline]
    pub fn addr(&self) -> usize {
        (&*self.0 as *const dyn Scheduler).cast::<()>() as usize
    }
}

impl PartialEq for Executor {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::addr_eq(&*self.0, &*other.0)
    }
}

impl Eq for Executor {}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Executor({:#x})", self.addr())
    }
}

thread_local! {
    /// Address of the queue whose job is running on this thread, or 0.
    static CURRENT_QUEUE: Cell<usize> = const { Cell::new(0) };
}

/// Shared state of a [`RunQueue`].
struct QueueState {
    jobs: spin::Mutex<VecDeque<Job>>,
}

impl QueueState {
    fn addr(&self) -> usize {
        self as *const Self as usize
    }
}

impl Scheduler for QueueState {
    fn post(&self, job: Job) {
        self.jobs.lock().push_back(job);
    }

    fn running_in_this_thread(&self) -> bool {
        CURRENT_QUEUE.with(|current| current.get() == self.addr())
    }
}

/// Marks the queue as running on this thread until dropped.
struct RunningGuard {
    previous: usize,
}

impl RunningGuard {
    fn enter(state: &QueueState) -> Self {
        let previous = CURRENT_QUEUE.with(|current| current.replace(state.addr()));
        Self { previous }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        CURRENT_QUEUE.with(|current| current.set(self.previous));
    }
}

/// A first-in, first-out job queue driven by the thread that calls
/// [`run`](RunQueue::run).
///
/// Jobs may be posted from any thread. While a job runs, the queue reports
/// [`running_in_this_thread`](Scheduler::running_in_this_thread) on the
/// driving thread, so dispatched jobs run inline there.
pub struct RunQueue {
    state: Arc<QueueState>,
}

impl RunQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            state: Arc::new(QueueState {
                jobs: spin::Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Returns an executor that submits jobs to this queue.
    pub fn executor(&self) -> Executor {
        Executor::from_arc(self.state.clone())
    }

    /// Runs the oldest queued job, if any. Returns `true` if a job ran.
    pub fn run_one(&self) -> bool {
        let Some(job) = self.state.jobs.lock().pop_front() else {
            return false;
        };

        let _running = RunningGuard::enter(&self.state);
        tracing::trace!(queue = self.state.addr(), "running job");
        job.run();
        true
    }

    /// Runs jobs until the queue is empty, including jobs queued by the jobs
    /// themselves. Returns the number of jobs that ran.
    pub fn run(&self) -> usize {
        let mut count = 0;
        while self.run_one() {
            count += 1;
        }
        count
    }

    /// Runs only the jobs that were queued when this method was called.
    /// Returns the number of jobs that ran.
    pub fn poll(&self) -> usize {
        let ready = self.len();
        let mut count = 0;
        while count < ready && self.run_one() {
            count += 1;
        }
        count
    }

    /// The number of queued jobs.
    pub fn len(&self) -> usize {
        self.state.jobs.lock().len()
    }

    /// Returns `true` if no jobs are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RunQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RunQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunQueue")
            .field("addr", &format_args!("{:#x}", self.state.addr()))
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_executor_identity() {
        let queue = RunQueue::new();
        let other = RunQueue::new();

        assert_eq!(queue.executor(), queue.executor());
        assert_ne!(queue.executor(), other.executor());
    }

    #[test]
    fn test_run_queue_fifo() {
        let queue = RunQueue::new();
        let executor = queue.executor();
        let order = std::sync::Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            executor.post(Job::new(move || order.lock().unwrap().push(i)));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.run(), 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_dispatch_inline_only_inside_queue() {
        let queue = RunQueue::new();
        let executor = queue.executor();
        let order = std::sync::Arc::new(Mutex::new(Vec::new()));

        // Outside of `run` dispatch behaves like post.
        {
            let order = order.clone();
            executor.dispatch(Job::new(move || order.lock().unwrap().push("outside")));
        }
        assert!(order.lock().unwrap().is_empty());

        {
            let order = order.clone();
            let inner = executor.clone();
            executor.post(Job::new(move || {
                assert!(inner.running_in_this_thread());
                let nested = order.clone();
                inner.dispatch(Job::new(move || nested.lock().unwrap().push("dispatched")));
                order.lock().unwrap().push("after dispatch");
            }));
        }

        queue.run();
        assert_eq!(
            *order.lock().unwrap(),
            vec!["outside", "dispatched", "after dispatch"]
        );
        assert!(!executor.running_in_this_thread());
    }

    #[test]
    fn test_poll_skips_new_jobs() {
        let queue = RunQueue::new();
        let executor = queue.executor();

        let inner = executor.clone();
        executor.post(Job::new(move || inner.post(Job::new(|| {}))));

        assert_eq!(queue.poll(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.poll(), 1);
        assert_eq!(queue.poll(), 0);
    }

    #[test]
    fn test_post_from_other_thread() {
        let queue = RunQueue::new();
        let executor = queue.executor();

        std::thread::spawn(move || {
            assert!(!executor.running_in_this_thread());
            executor.post(Job::new(|| {}));
        })
        .join()
        .unwrap();

        assert_eq!(queue.run(), 1);
    }

    #[test]
    fn test_send_sync() {
        static_assertions::assert_impl_all!(Executor: Send, Sync);
        static_assertions::assert_impl_all!(Job: Send);
        static_assertions::assert_impl_all!(RunQueue: Send, Sync);
    }
}
