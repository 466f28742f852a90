use crate::error::Panicked;
use crate::operation::{CompletionSource, Operation, OperationCore, Outcome};
use crate::time;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

/// How often and how fast [`retry`] tries again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    interval: Duration,
    max_retries: Option<usize>,
}

impl RetryPolicy {
    /// Retries up to `max_retries` times after the first attempt.
    ///
    /// A budget of zero performs exactly one attempt.
    pub fn new(max_retries: usize) -> Self {
        Self {
            interval: Duration::ZERO,
            max_retries: Some(max_retries),
        }
    }

    /// Retries until an attempt succeeds or is canceled.
    pub fn unbounded() -> Self {
        Self {
            interval: Duration::ZERO,
            max_retries: None,
        }
    }

    /// Builds a policy from raw values: a negative `max_retries` means
    /// unbounded.
    pub fn from_raw(interval_ms: u64, max_retries: i64) -> Self {
        let policy = match usize::try_from(max_retries) {
            Ok(max_retries) => Self::new(max_retries),
            Err(_) => Self::unbounded(),
        };

        policy.set_interval(Duration::from_millis(interval_ms))
    }

    /// Sets the pause between a failed attempt and the next one.
    pub fn set_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The retry budget, `None` when unbounded.
    pub fn max_retries(&self) -> Option<usize> {
        self.max_retries
    }
}

/// Creates an operation that retries the operations produced by `factory`.
///
/// `factory` is called once immediately. Each faulted attempt consumes one
/// retry from the budget and, after the policy's interval, triggers a new
/// call. The combined operation:
/// - runs to completion with the first successful attempt's value,
/// - is canceled as soon as an attempt is canceled (never retried),
/// - faults with the last attempt's cause once the budget is exhausted.
///
/// A panicking factory faults the combined operation with [`Panicked`].
///
/// # Examples
///
/// ```rust,ignore
/// let fetched = retry(RetryPolicy::new(3).set_interval(Duration::from_millis(50)), || fetch());
/// ```
pub fn retry<T, G>(policy: RetryPolicy, factory: G) -> Operation<T>
where
    T: Clone + Send + Sync + 'static,
    G: FnMut() -> Operation<T> + Send + 'static,
{
    let state = Arc::new(RetryState {
        factory: Mutex::new(factory),
        remaining: Mutex::new(policy.max_retries),
        interval: policy.interval,
        attempts: AtomicUsize::new(0),
        constructing: AtomicBool::new(true),
        source: CompletionSource::new(),
    });
    let operation = state.source.operation();

    state.clone().attempt();
    state.constructing.store(false, Ordering::Release);

    operation
}

struct RetryState<T, G> {
    factory: Mutex<G>,

    /// Retries left, `None` when unbounded.
    remaining: Mutex<Option<usize>>,

    interval: Duration,
    attempts: AtomicUsize,

    /// Set while [`retry`] itself is still running.
    constructing: AtomicBool,

    source: CompletionSource<T>,
}

impl<T, G> RetryState<T, G>
where
    T: Clone + Send + Sync + 'static,
    G: FnMut() -> Operation<T> + Send + 'static,
{
    /// Runs attempts until one is pending or the outcome is settled.
    ///
    /// Attempts that fail synchronously with no interval are retried in
    /// this loop rather than recursively.
    fn attempt(self: Arc<Self>) {
        loop {
            let attempt = match self.spawn_attempt() {
                Ok(attempt) => attempt,
                Err(panicked) => {
                    tracing::warn!(op.id = self.source.operation().id(), error = %panicked, "retry factory panicked");
                    self.source
                        .try_complete(Outcome::Faulted(Arc::new(panicked)), self.synchronously());
                    return;
                }
            };

            if !attempt.is_completed() {
                let state = self.clone();
                attempt.core().add_continuation(
                    Box::new(move |attempt, _| {
                        if state.settle(attempt) {
                            state.schedule_next();
                        }
                    }),
                    None,
                );
                return;
            }

            if !self.settle(attempt.core()) {
                return;
            }

            if !self.interval.is_zero() {
                self.schedule_next();
                return;
            }
        }
    }

    fn spawn_attempt(&self) -> Result<Operation<T>, Panicked> {
        let number = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(op.id = self.source.operation().id(), attempt = number, "retry attempt");

        let mut factory = self.factory.lock();
        panic::catch_unwind(AssertUnwindSafe(|| (*factory)())).map_err(Panicked::from_payload)
    }

    /// Applies the outcome of a finished attempt.
    ///
    /// Returns `true` when another attempt should follow.
    fn settle(&self, attempt: &Arc<OperationCore>) -> bool {
        let outcome = match attempt.outcome().and_then(|outcome| outcome.typed::<T>()) {
            Ok(outcome) => outcome,
            Err(error) => Outcome::Faulted(Arc::new(error)),
        };

        if let Outcome::Faulted(_) = &outcome {
            let mut remaining = self.remaining.lock();

            match remaining.as_mut() {
                None => return true,
                Some(left) if *left > 0 => {
                    *left -= 1;
                    return true;
                }
                Some(_) => {}
            }
        }

        self.source.try_complete(outcome, self.synchronously());
        false
    }

    /// Starts the next attempt once the interval elapsed.
    fn schedule_next(self: Arc<Self>) {
        if self.interval.is_zero() {
            self.attempt();
            return;
        }

        time::delay(self.interval).core().add_continuation(
            Box::new(move |_, _| self.attempt()),
            None,
        );
    }

    fn synchronously(&self) -> bool {
        self.constructing.load(Ordering::Acquire)
    }
}
