use super::core::OperationCore;
use super::outcome::{Outcome, RawOutcome};
use super::{Operation, Status};
use crate::error::{Canceled, OperationError, into_cause};

use std::any::Any;
use std::error::Error;
use std::sync::Arc;

/// Producer side of an operation.
///
/// A `CompletionSource` is the only way to drive the transitions of the
/// operation it created. Hand out [`operation`](Self::operation) to
/// consumers and keep the source for whoever does the work.
///
/// Every setter comes in two flavors:
/// - `try_*` returns `false` when the transition is not allowed,
/// - the plain variant returns [`OperationError::InvalidState`].
///
/// The shorthand setters report `completed_synchronously = false`; use
/// [`try_complete`](Self::try_complete) to state it explicitly.
pub struct CompletionSource<T> {
    operation: Operation<T>,
}

impl<T> CompletionSource<T> {
    /// Creates a source for a new operation in the `Created` status.
    pub fn new() -> Self {
        Self {
            operation: Operation::from_core(OperationCore::new(None)),
        }
    }

    /// Creates a source whose operation carries `state` as user state.
    pub fn with_state<S: Any + Send + Sync>(state: S) -> Self {
        let state: Arc<dyn Any + Send + Sync> = Arc::new(state);

        Self {
            operation: Operation::from_core(OperationCore::new(Some(state))),
        }
    }

    /// Returns a consumer handle to the operation.
    pub fn operation(&self) -> Operation<T> {
        self.operation.clone()
    }

    /// Registers cleanup to run once, when the operation is first disposed.
    pub fn on_dispose<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.operation.core().set_dispose_hook(Box::new(hook));
    }

    pub fn try_set_scheduled(&self) -> bool {
        self.set_scheduled().is_ok()
    }

    /// Moves the operation from `Created` to `Scheduled`.
    pub fn set_scheduled(&self) -> Result<(), OperationError> {
        self.operation
            .core()
            .try_set_scheduled()
            .map_err(|current| invalid(Status::Scheduled, current))
    }

    pub fn try_set_running(&self) -> bool {
        self.set_running().is_ok()
    }

    /// Moves the operation from `Created` or `Scheduled` to `Running`.
    pub fn set_running(&self) -> Result<(), OperationError> {
        self.operation
            .core()
            .try_set_running()
            .map_err(|current| invalid(Status::Running, current))
    }

    pub fn try_set_fault<E>(&self, error: E) -> bool
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        self.set_fault(error).is_ok()
    }

    /// Faults the operation with `error`.
    ///
    /// A cancellation marker cancels the operation instead.
    pub fn set_fault<E>(&self, error: E) -> Result<(), OperationError>
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let outcome = RawOutcome::Faulted(into_cause(error.into()));
        self.finish(outcome, false)
    }

    pub fn try_set_canceled(&self) -> bool {
        self.set_canceled().is_ok()
    }

    /// Cancels the operation.
    pub fn set_canceled(&self) -> Result<(), OperationError> {
        self.finish(RawOutcome::Canceled(Canceled::new()), false)
    }

    fn finish(&self, outcome: RawOutcome, completed_synchronously: bool) -> Result<(), OperationError> {
        let attempted = outcome.normalized_status();

        self.operation
            .core()
            .try_complete(outcome, completed_synchronously)
            .map_err(|current| invalid(attempted, current))
    }
}

impl<T: Send + Sync + 'static> CompletionSource<T> {
    pub fn try_set_result(&self, value: T) -> bool {
        self.set_result(value).is_ok()
    }

    /// Completes the operation with `value`.
    pub fn set_result(&self, value: T) -> Result<(), OperationError> {
        self.complete(Outcome::Completed(value), false)
    }

    pub fn try_complete(&self, outcome: Outcome<T>, completed_synchronously: bool) -> bool {
        self.complete(outcome, completed_synchronously).is_ok()
    }

    /// Performs the terminal transition with an explicit outcome.
    ///
    /// `completed_synchronously` should be `true` only when this call
    /// happens on the call stack that created or started the operation.
    pub fn complete(&self, outcome: Outcome<T>, completed_synchronously: bool) -> Result<(), OperationError> {
        self.finish(RawOutcome::erase(outcome), completed_synchronously)
    }
}

impl<T> Clone for CompletionSource<T> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation.clone(),
        }
    }
}

impl<T> Default for CompletionSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(attempted: Status, current: Status) -> OperationError {
    OperationError::InvalidState { attempted, current }
}
