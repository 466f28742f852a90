use super::outcome::RawOutcome;
use super::state::Status;
use super::Fault;
use crate::dispatch::{self, Callback, Continuation, ContextHandle, ContinuationToken};
use crate::error::OperationError;

use std::any::Any;
use std::fmt;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Opaque value attached to an operation by its creator.
pub type UserState = Arc<dyn Any + Send + Sync>;

/// Source of process-unique operation identifiers.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// The non-generic operation state machine.
///
/// `OperationCore` owns the status, the type-erased outcome, the
/// continuation list and the disposal flag. Typed access goes through
/// [`Operation`](super::Operation); transitions are driven by a
/// [`CompletionSource`](super::CompletionSource) or, for combinators, by
/// their internal continuations.
pub struct OperationCore {
    /// Process-unique identifier, used in log events.
    id: u64,

    /// Current [`Status`], stored in its raw form.
    ///
    /// Non-terminal transitions are lock-free compare-exchanges. Terminal
    /// transitions additionally hold `inner` so payload, status and the
    /// continuation list change together.
    status: AtomicU8,

    /// Set by the producer on the terminal transition.
    completed_synchronously: AtomicBool,

    /// Once set, outcome and wait access fail with `Disposed`.
    disposed: AtomicBool,

    /// Creator-supplied value, never interpreted.
    user_state: Option<UserState>,

    /// State guarded by the short critical section.
    inner: Mutex<Inner>,

    /// Signaled once, on the terminal transition.
    completed: Condvar,
}

struct Inner {
    /// Present from the terminal transition until disposal.
    outcome: Option<RawOutcome>,

    /// Pending continuations in registration order.
    ///
    /// Drained exactly once by the terminal transition.
    continuations: Vec<Continuation>,

    /// Next token handed out by [`OperationCore::add_continuation`].
    next_token: u64,

    /// Runs once, on the first successful disposal.
    dispose_hook: Option<Box<dyn FnOnce() + Send>>,
}

impl OperationCore {
    /// Creates an operation in the `Created` status.
    pub(crate) fn new(user_state: Option<UserState>) -> Arc<Self> {
        Arc::new(Self::with_status(Status::Created, None, false, user_state))
    }

    /// Creates an operation that is already terminal.
    pub(crate) fn new_completed(outcome: RawOutcome, user_state: Option<UserState>) -> Arc<Self> {
        let outcome = outcome.normalized();
        let status = outcome.status();

        Arc::new(Self::with_status(status, Some(outcome), true, user_state))
    }

    fn with_status(
        status: Status,
        outcome: Option<RawOutcome>,
        completed_synchronously: bool,
        user_state: Option<UserState>,
    ) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            status: AtomicU8::new(status.as_raw()),
            completed_synchronously: AtomicBool::new(completed_synchronously),
            disposed: AtomicBool::new(false),
            user_state,
            inner: Mutex::new(Inner {
                outcome,
                continuations: Vec::new(),
                next_token: 0,
                dispose_hook: None,
            }),
            completed: Condvar::new(),
        }
    }

    /// Process-unique identifier of this operation.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current status. Never blocks.
    pub fn status(&self) -> Status {
        Status::from_raw(self.status.load(Ordering::Acquire))
    }

    /// Returns `true` once the operation reached a terminal status.
    pub fn is_completed(&self) -> bool {
        self.status().is_terminal()
    }

    /// Whether the terminal transition happened on the call stack that
    /// created or started the operation.
    pub fn completed_synchronously(&self) -> bool {
        self.is_completed() && self.completed_synchronously.load(Ordering::Acquire)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// The value supplied by the creator, if any.
    pub fn user_state(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.user_state.as_deref()
    }

    pub(crate) fn try_set_scheduled(&self) -> Result<(), Status> {
        self.transition(Status::Scheduled)
    }

    pub(crate) fn try_set_running(&self) -> Result<(), Status> {
        self.transition(Status::Running)
    }

    /// Moves between non-terminal statuses.
    ///
    /// Returns the observed status when the transition is illegal.
    fn transition(&self, target: Status) -> Result<(), Status> {
        let mut current = self.status.load(Ordering::Acquire);

        loop {
            let status = Status::from_raw(current);

            if !status.can_transition_to(target) {
                return Err(status);
            }

            match self.status.compare_exchange_weak(
                current,
                target.as_raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    tracing::trace!(op.id = self.id, from = %status, to = %target, "operation transitioned");
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Performs the terminal transition.
    ///
    /// Exactly one caller wins: it installs the outcome, wakes blocked
    /// waiters and drains the continuation list. Every other caller gets
    /// the status that was already reached.
    pub(crate) fn try_complete(
        self: &Arc<Self>,
        outcome: RawOutcome,
        completed_synchronously: bool,
    ) -> Result<(), Status> {
        let outcome = outcome.normalized();
        let target = outcome.status();

        let continuations = {
            let mut inner = self.inner.lock();

            let mut current = self.status.load(Ordering::Acquire);
            let status = Status::from_raw(current);
            if status.is_terminal() {
                return Err(status);
            }

            inner.outcome = Some(outcome);
            self.completed_synchronously
                .store(completed_synchronously, Ordering::Release);

            // Scheduled/Running may still race in without the lock.
            while let Err(actual) = self.status.compare_exchange_weak(
                current,
                target.as_raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                current = actual;
            }

            self.completed.notify_all();
            mem::take(&mut inner.continuations)
        };

        tracing::trace!(
            op.id = self.id,
            status = %target,
            completed_synchronously,
            continuations = continuations.len(),
            "operation completed"
        );

        for continuation in continuations {
            continuation.dispatch(self, completed_synchronously);
        }

        Ok(())
    }

    /// Registers `callback`, or runs it inline if the operation is already
    /// terminal.
    ///
    /// Returns `true` when the callback ran immediately on the calling
    /// thread instead of being queued.
    pub fn try_add_completion_callback<F>(
        self: &Arc<Self>,
        callback: F,
        context: Option<ContextHandle>,
    ) -> bool
    where
        F: FnOnce(&Arc<OperationCore>, bool) + Send + 'static,
    {
        self.add_continuation(Box::new(callback), context).is_none()
    }

    /// Queues a continuation and returns its token, or runs it inline and
    /// returns `None` when the operation is already terminal.
    pub(crate) fn add_continuation(
        self: &Arc<Self>,
        callback: Callback,
        context: Option<ContextHandle>,
    ) -> Option<ContinuationToken> {
        {
            let mut inner = self.inner.lock();

            if !self.is_completed() {
                let token = inner.next_token;
                inner.next_token += 1;
                inner
                    .continuations
                    .push(Continuation::new(token, callback, context));

                return Some(ContinuationToken(token));
            }
        }

        dispatch::invoke(callback, self, true);
        None
    }

    /// Removes a continuation that has not run yet.
    pub(crate) fn remove_continuation(&self, token: ContinuationToken) -> bool {
        let mut inner = self.inner.lock();

        match inner.continuations.iter().position(|c| c.token == token.0) {
            Some(index) => {
                inner.continuations.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_dispose_hook(&self, hook: Box<dyn FnOnce() + Send>) {
        self.inner.lock().dispose_hook = Some(hook);
    }

    /// The stored outcome of a terminal operation.
    pub(crate) fn outcome(&self) -> Result<RawOutcome, OperationError> {
        self.ensure_not_disposed()?;

        if !self.is_completed() {
            return Err(OperationError::NotCompleted);
        }

        self.inner
            .lock()
            .outcome
            .clone()
            .ok_or(OperationError::Disposed)
    }

    /// The fault of a faulted or canceled operation, `None` on success.
    pub fn fault(&self) -> Result<Option<Fault>, OperationError> {
        Ok(self.outcome()?.fault())
    }

    /// Blocks the calling thread until the operation is terminal.
    pub fn wait(&self) -> Result<(), OperationError> {
        self.ensure_not_disposed()?;

        let mut inner = self.inner.lock();
        while !self.is_completed() {
            self.completed.wait(&mut inner);
        }

        Ok(())
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    ///
    /// Returns whether the operation completed.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool, OperationError> {
        self.ensure_not_disposed()?;

        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();

        while !self.is_completed() {
            if self.completed.wait_until(&mut inner, deadline).timed_out() {
                return Ok(self.is_completed());
            }
        }

        Ok(true)
    }

    /// Releases the outcome and runs the dispose hook.
    ///
    /// Fails with `NotCompleted` while the operation is still pending.
    /// Calls after the first successful disposal are no-ops.
    pub fn dispose(&self) -> Result<(), OperationError> {
        if !self.is_completed() {
            return Err(OperationError::NotCompleted);
        }

        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let hook = {
            let mut inner = self.inner.lock();
            inner.outcome = None;
            inner.dispose_hook.take()
        };

        tracing::trace!(op.id = self.id, "operation disposed");

        if let Some(hook) = hook {
            hook();
        }

        Ok(())
    }

    fn ensure_not_disposed(&self) -> Result<(), OperationError> {
        if self.is_disposed() {
            Err(OperationError::Disposed)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for OperationCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationCore")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
