//! Ready-made dispatch contexts.
//!
//! [`EventLoop`] is a FIFO of posted jobs drained by whoever owns it.
//! [`LoopThread`] runs an event loop on a dedicated thread, which gives
//! continuations a fixed thread affinity.

use super::context::{ContextHandle, DispatchContext, Job, enter_context};
use crate::error::Panicked;
use crate::operation::Operation;

use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// How long an idle loop waits before re-checking its shutdown flag.
const PARK_TIMEOUT: Duration = Duration::from_millis(10);

/// Queue shared between the loop and everyone posting to it.
struct LoopQueue {
    /// Jobs waiting to run, in posting order.
    jobs: Mutex<VecDeque<Job>>,

    /// Wakes a parked loop when a job arrives or shutdown is requested.
    condvar: Condvar,

    /// Set once the loop should stop running.
    shutdown: AtomicBool,
}

impl DispatchContext for LoopQueue {
    fn post(&self, job: Job) {
        self.jobs.lock().push_back(job);
        self.condvar.notify_one();
    }
}

/// A single-consumer dispatch context backed by a job queue.
///
/// Jobs only run when the owner drains the loop with
/// [`run_pending`](Self::run_pending), [`run_until_complete`](Self::run_until_complete)
/// or [`run`](Self::run). While draining, the loop is installed as the
/// current dispatch context so continuations registered from inside a job
/// capture it.
#[derive(Clone)]
pub struct EventLoop {
    queue: Arc<LoopQueue>,
    handle: ContextHandle,
}

impl EventLoop {
    /// Creates an empty event loop.
    pub fn new() -> Self {
        let queue = Arc::new(LoopQueue {
            jobs: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        let handle = ContextHandle::from_arc(queue.clone());

        Self { queue, handle }
    }

    /// Returns a handle usable when registering continuations.
    pub fn handle(&self) -> ContextHandle {
        self.handle.clone()
    }

    /// Number of jobs waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.jobs.lock().len()
    }

    /// Runs `f` with this loop installed as the current dispatch context.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        enter_context(self.handle.clone(), f)
    }

    /// Runs queued jobs on the calling thread until the queue is empty.
    ///
    /// Jobs posted while draining are run as well. Returns the number of
    /// jobs executed.
    pub fn run_pending(&self) -> usize {
        let mut executed = 0;

        self.enter(|| {
            while let Some(job) = self.pop() {
                run_job(job);
                executed += 1;
            }
        });

        executed
    }

    /// Drains the loop until `operation` reaches a terminal state.
    pub fn run_until_complete<T>(&self, operation: &Operation<T>) {
        self.enter(|| {
            while !operation.is_completed() {
                match self.pop() {
                    Some(job) => run_job(job),
                    None => self.park(),
                }
            }
        });
    }

    /// Runs jobs until [`shutdown`](Self::shutdown) is called.
    pub fn run(&self) {
        self.enter(|| {
            loop {
                if self.queue.shutdown.load(Ordering::Acquire) {
                    break;
                }

                match self.pop() {
                    Some(job) => run_job(job),
                    None => self.park(),
                }
            }
        });
    }

    /// Asks a loop blocked in [`run`](Self::run) to return.
    pub fn shutdown(&self) {
        self.queue.shutdown.store(true, Ordering::Release);
        self.queue.condvar.notify_all();
    }

    fn pop(&self) -> Option<Job> {
        self.queue.jobs.lock().pop_front()
    }

    /// Waits for a job or a shutdown signal.
    ///
    /// The wait is bounded so callers periodically re-check their exit
    /// condition.
    fn park(&self) {
        let mut jobs = self.queue.jobs.lock();

        if !jobs.is_empty() || self.queue.shutdown.load(Ordering::Acquire) {
            return;
        }

        self.queue.condvar.wait_for(&mut jobs, PARK_TIMEOUT);
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

fn run_job(job: Job) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        let panicked = Panicked::from_payload(payload);
        tracing::warn!(error = %panicked, "event loop job panicked");
    }
}

/// An [`EventLoop`] running on its own thread.
///
/// Dropping the `LoopThread` stops the loop and joins the thread. Jobs
/// still queued at that point are discarded.
pub struct LoopThread {
    event_loop: EventLoop,
    thread_id: ThreadId,
    handle: Option<JoinHandle<()>>,
}

impl LoopThread {
    /// Spawns a named thread running a fresh event loop.
    pub fn spawn(name: impl Into<String>) -> io::Result<Self> {
        let event_loop = EventLoop::new();
        let worker = event_loop.clone();

        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || worker.run())?;
        let thread_id = handle.thread().id();

        tracing::debug!(?thread_id, "loop thread started");

        Ok(Self {
            event_loop,
            thread_id,
            handle: Some(handle),
        })
    }

    /// Returns a handle usable when registering continuations.
    pub fn handle(&self) -> ContextHandle {
        self.event_loop.handle()
    }

    /// Identifier of the thread running the loop.
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }
}

impl Drop for LoopThread {
    fn drop(&mut self) {
        self.event_loop.shutdown();

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
