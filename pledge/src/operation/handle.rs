use super::awaiter::{Awaiter, OperationFuture};
use super::core::OperationCore;
use super::outcome::{Outcome, RawOutcome, downcast};
use super::source::CompletionSource;
use super::{Fault, Status};
use crate::dispatch::{ContextHandle, ContinuationToken, current_context};
use crate::error::{Canceled, OperationError, Panicked, into_cause};

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::future::IntoFuture;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// Typed handle to an operation.
///
/// Handles are cheap to clone; every clone observes the same underlying
/// [`OperationCore`]. A handle only allows observation: transitions are
/// reserved to the matching [`CompletionSource`].
pub struct Operation<T = ()> {
    core: Arc<OperationCore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Operation<T> {
    pub(crate) fn from_core(core: Arc<OperationCore>) -> Self {
        Self {
            core,
            _marker: PhantomData,
        }
    }

    /// Creates an operation that is already faulted with `error`.
    ///
    /// A cancellation marker produces a canceled operation instead.
    pub fn from_fault<E>(error: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let outcome = RawOutcome::Faulted(into_cause(error.into()));
        Self::from_core(OperationCore::new_completed(outcome, None))
    }

    /// Creates an operation that is already canceled.
    pub fn from_canceled() -> Self {
        let outcome = RawOutcome::Canceled(Canceled::new());
        Self::from_core(OperationCore::new_completed(outcome, None))
    }

    /// The untyped core, usable with heterogeneous combinators.
    pub fn core(&self) -> &Arc<OperationCore> {
        &self.core
    }

    pub fn id(&self) -> u64 {
        self.core.id()
    }

    pub fn status(&self) -> Status {
        self.core.status()
    }

    /// Returns `true` once the operation is terminal.
    pub fn is_completed(&self) -> bool {
        self.core.is_completed()
    }

    pub fn is_completed_successfully(&self) -> bool {
        self.status() == Status::RanToCompletion
    }

    pub fn is_faulted(&self) -> bool {
        self.status() == Status::Faulted
    }

    pub fn is_canceled(&self) -> bool {
        self.status() == Status::Canceled
    }

    pub fn completed_synchronously(&self) -> bool {
        self.core.completed_synchronously()
    }

    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    pub fn user_state(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.core.user_state()
    }

    /// The fault of a faulted or canceled operation, `None` on success.
    pub fn fault(&self) -> Result<Option<Fault>, OperationError> {
        self.core.fault()
    }

    /// Registers `callback` to run once the operation is terminal.
    ///
    /// With `Some(context)`, the callback is posted to that context unless
    /// the operation completes on it. If the operation is already terminal,
    /// the callback runs immediately on the calling thread and `None` is
    /// returned.
    pub fn register<F>(&self, callback: F, context: Option<ContextHandle>) -> Option<ContinuationToken>
    where
        T: 'static,
        F: FnOnce(&Operation<T>, bool) + Send + 'static,
    {
        self.core.add_continuation(
            Box::new(move |core, synchronously| {
                callback(&Operation::from_core(core.clone()), synchronously)
            }),
            context,
        )
    }

    /// Registers `callback` on the dispatch context active right now.
    pub fn on_completed<F>(&self, callback: F) -> Option<ContinuationToken>
    where
        T: 'static,
        F: FnOnce(&Operation<T>, bool) + Send + 'static,
    {
        self.register(callback, current_context())
    }

    /// Removes a continuation that has not run yet.
    pub fn unregister(&self, token: ContinuationToken) -> bool {
        self.core.remove_continuation(token)
    }

    /// Blocks the calling thread until the operation is terminal.
    pub fn wait(&self) -> Result<(), OperationError> {
        self.core.wait()
    }

    /// Blocks for at most `timeout`; returns whether the operation completed.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool, OperationError> {
        self.core.wait_timeout(timeout)
    }

    pub fn dispose(&self) -> Result<(), OperationError> {
        self.core.dispose()
    }
}

impl<T: Clone + Send + Sync + 'static> Operation<T> {
    /// Creates an operation that already ran to completion with `value`.
    pub fn from_result(value: T) -> Self {
        let outcome = RawOutcome::Completed(Arc::new(value));
        Self::from_core(OperationCore::new_completed(outcome, None))
    }

    /// The result of an operation that ran to completion.
    ///
    /// Faults and cancellation are reported as errors, as is access before
    /// completion or after disposal.
    pub fn result(&self) -> Result<T, OperationError> {
        match self.core.outcome()? {
            Outcome::Completed(value) => downcast(&value),
            Outcome::Faulted(cause) => Err(OperationError::Faulted(cause)),
            Outcome::Canceled(canceled) => Err(OperationError::Canceled(canceled)),
        }
    }

    /// The typed terminal outcome.
    pub fn outcome(&self) -> Result<Outcome<T>, OperationError> {
        self.core.outcome()?.typed()
    }

    /// Returns the await bridge for this operation.
    pub fn awaiter(&self) -> Awaiter<T> {
        Awaiter::new(self.clone())
    }

    /// Runs `f` once this operation is terminal, whatever the outcome.
    ///
    /// The returned operation completes with the value produced by `f`, or
    /// faults with [`Panicked`] if `f` panics. `f` runs on the dispatch
    /// context active at the time of this call.
    pub fn continue_with<U, F>(&self, f: F) -> Operation<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&Operation<T>) -> U + Send + 'static,
    {
        let source = CompletionSource::new();
        let dependent = source.operation();

        self.on_completed(move |antecedent, synchronously| {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| f(antecedent))) {
                Ok(value) => Outcome::Completed(value),
                Err(payload) => Outcome::Faulted(Arc::new(Panicked::from_payload(payload))),
            };

            source.try_complete(outcome, synchronously);
        });

        dependent
    }

    /// Runs `f` with the result once this operation ran to completion.
    ///
    /// Faults and cancellation of this operation are forwarded unchanged
    /// without calling `f`. An error returned by `f` faults the returned
    /// operation.
    pub fn then<U, E, F>(&self, f: F) -> Operation<U>
    where
        U: Send + Sync + 'static,
        E: Into<Box<dyn Error + Send + Sync>>,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
    {
        let source = CompletionSource::new();
        let dependent = source.operation();

        self.on_completed(move |antecedent, synchronously| {
            let outcome = match antecedent.outcome() {
                Ok(Outcome::Completed(value)) => {
                    match panic::catch_unwind(AssertUnwindSafe(|| f(value))) {
                        Ok(Ok(value)) => Outcome::Completed(value),
                        Ok(Err(error)) => Outcome::Faulted(into_cause(error.into())),
                        Err(payload) => Outcome::Faulted(Arc::new(Panicked::from_payload(payload))),
                    }
                }
                Ok(Outcome::Faulted(cause)) => Outcome::Faulted(cause),
                Ok(Outcome::Canceled(canceled)) => Outcome::Canceled(canceled),
                Err(error) => Outcome::Faulted(Arc::new(error)),
            };

            source.try_complete(outcome, synchronously);
        });

        dependent
    }
}

impl Operation<()> {
    /// Creates a unit operation that already ran to completion.
    pub fn completed() -> Self {
        Self::from_result(())
    }
}

impl<T> Clone for Operation<T> {
    fn clone(&self) -> Self {
        Self::from_core(self.core.clone())
    }
}

impl<T> fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id())
            .field("status", &self.status())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> IntoFuture for Operation<T> {
    type Output = Result<T, OperationError>;
    type IntoFuture = OperationFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        OperationFuture::new(self)
    }
}
