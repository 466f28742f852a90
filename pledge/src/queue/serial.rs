use super::QueueBuilder;
use crate::error::Panicked;
use crate::operation::{CompletionSource, Operation, OperationCore};

use std::collections::{HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Start = Box<dyn FnOnce() + Send + 'static>;

/// Admits operations to run at most `max_concurrency` at a time, in the
/// order they were enqueued.
///
/// The queue never drives an operation itself. Admission means invoking
/// the `start` callback handed to [`enqueue`](Self::enqueue); the
/// operation's own producer performs every transition. The queue only
/// watches each operation through a continuation to learn when its slot
/// frees up.
///
/// # Examples
///
/// ```rust,ignore
/// let queue = SerialQueue::new();
/// let source = CompletionSource::<u32>::new();
/// let producer = source.clone();
///
/// queue.enqueue(&source.operation(), move || {
///     producer.try_set_result(7);
/// });
/// ```
#[derive(Clone)]
pub struct SerialQueue {
    shared: Arc<Shared>,
}

struct Shared {
    max_concurrency: usize,
    state: Mutex<QueueState>,
}

struct QueueState {
    pending: VecDeque<Entry>,

    /// Entries admitted and not yet terminal.
    active: HashSet<u64>,

    suspended: bool,

    /// Set while some thread is admitting entries.
    pumping: bool,

    idle_waiters: Vec<CompletionSource<()>>,
    next_entry: u64,
}

struct Entry {
    id: u64,
    operation: Arc<OperationCore>,
    start: Start,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.active.is_empty()
    }
}

impl SerialQueue {
    /// Creates a queue admitting one operation at a time.
    pub fn new() -> Self {
        QueueBuilder::new().build()
    }

    /// Returns a [`QueueBuilder`] to configure a queue.
    pub fn builder() -> QueueBuilder {
        QueueBuilder::new()
    }

    pub(super) fn with_config(max_concurrency: usize, suspended: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                max_concurrency,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    active: HashSet::new(),
                    suspended,
                    pumping: false,
                    idle_waiters: Vec::new(),
                    next_entry: 0,
                }),
            }),
        }
    }

    /// Appends `operation` to the queue.
    ///
    /// `start` runs once the operation is admitted, possibly right away on
    /// the calling thread. If the operation turns terminal while pending it
    /// is dropped from the queue and `start` never runs.
    ///
    /// Returns `false` when `operation` was already terminal and therefore
    /// not queued.
    pub fn enqueue<T, F>(&self, operation: &Operation<T>, start: F) -> bool
    where
        T: 'static,
        F: FnOnce() + Send + 'static,
    {
        if operation.is_completed() {
            tracing::debug!(op.id = operation.id(), "skipping terminal operation");
            return false;
        }

        let id = {
            let mut state = self.shared.state.lock();
            let id = state.next_entry;
            state.next_entry += 1;

            state.pending.push_back(Entry {
                id,
                operation: operation.core().clone(),
                start: Box::new(start),
            });

            id
        };

        tracing::trace!(op.id = operation.id(), entry = id, "operation enqueued");

        let shared = Arc::downgrade(&self.shared);
        operation.core().add_continuation(
            Box::new(move |_, _| Shared::finished(&shared, id)),
            None,
        );

        self.shared.pump();
        true
    }

    /// Number of operations waiting for admission.
    pub fn len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Number of admitted operations that are not terminal yet.
    pub fn active(&self) -> usize {
        self.shared.state.lock().active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_concurrency(&self) -> usize {
        self.shared.max_concurrency
    }

    /// Drops every pending operation without starting it.
    ///
    /// Admitted operations are unaffected. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped = {
            let mut state = self.shared.state.lock();
            std::mem::take(&mut state.pending)
        };

        tracing::debug!(dropped = dropped.len(), "queue cleared");

        let count = dropped.len();
        drop(dropped);

        self.shared.pump();
        count
    }

    /// Stops admitting operations until [`resume`](Self::resume).
    pub fn suspend(&self) {
        self.shared.state.lock().suspended = true;
    }

    pub fn resume(&self) {
        self.shared.state.lock().suspended = false;
        self.shared.pump();
    }

    pub fn is_suspended(&self) -> bool {
        self.shared.state.lock().suspended
    }

    /// Returns an operation that completes once nothing is pending or
    /// active.
    ///
    /// Completes synchronously if the queue is idle already. Dropping the
    /// last handle to the queue cancels outstanding idle operations.
    pub fn when_idle(&self) -> Operation<()> {
        let mut state = self.shared.state.lock();

        if state.is_idle() {
            return Operation::completed();
        }

        let waiter = CompletionSource::new();
        let operation = waiter.operation();
        state.idle_waiters.push(waiter);

        operation
    }
}

impl Default for SerialQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();

        f.debug_struct("SerialQueue")
            .field("max_concurrency", &self.shared.max_concurrency)
            .field("pending", &state.pending.len())
            .field("active", &state.active.len())
            .field("suspended", &state.suspended)
            .finish()
    }
}

impl Shared {
    /// Called once the operation behind entry `id` is terminal.
    fn finished(shared: &Weak<Shared>, id: u64) {
        let Some(shared) = shared.upgrade() else {
            return;
        };

        {
            let mut state = shared.state.lock();

            if !state.active.remove(&id) {
                state.pending.retain(|entry| entry.id != id);
            }
        }

        shared.pump();
    }

    /// Admits pending entries while slots are free.
    ///
    /// Only one thread pumps at a time; a nested or concurrent call leaves
    /// the work to the loop already running, so operations completing
    /// inside `start` never recurse.
    fn pump(&self) {
        let mut state = self.state.lock();

        if state.pumping {
            return;
        }

        state.pumping = true;

        while !state.suspended && state.active.len() < self.max_concurrency {
            let Some(entry) = state.pending.pop_front() else {
                break;
            };

            if entry.operation.is_completed() {
                continue;
            }

            state.active.insert(entry.id);
            drop(state);

            tracing::debug!(op.id = entry.operation.id(), entry = entry.id, "operation admitted");
            admit(entry);

            state = self.state.lock();
        }

        state.pumping = false;

        let waiters = if state.is_idle() {
            std::mem::take(&mut state.idle_waiters)
        } else {
            Vec::new()
        };

        drop(state);

        for waiter in waiters {
            waiter.try_set_result(());
        }
    }
}

fn admit(entry: Entry) {
    let Entry { id, operation, start } = entry;

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(start)) {
        let panicked = Panicked::from_payload(payload);
        tracing::warn!(op.id = operation.id(), entry = id, error = %panicked, "start callback panicked");
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        for waiter in self.state.get_mut().idle_waiters.drain(..) {
            waiter.try_set_canceled();
        }
    }
}
