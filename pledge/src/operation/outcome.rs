use super::Status;
use crate::error::{Canceled, Cause, OperationError, cancellation_of};

use std::any::Any;
use std::sync::Arc;

/// Type-erased result slot stored by the non-generic operation core.
pub(crate) type Value = Arc<dyn Any + Send + Sync>;

/// Terminal outcome as stored inside [`OperationCore`](super::OperationCore).
pub(crate) type RawOutcome = Outcome<Value>;

/// The terminal outcome of an operation.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// The operation ran to completion with a value.
    Completed(T),

    /// The operation failed.
    Faulted(Cause),

    /// The operation was canceled.
    Canceled(Canceled),
}

impl<T> Outcome<T> {
    /// The terminal status this outcome corresponds to.
    pub fn status(&self) -> Status {
        match self {
            Outcome::Completed(_) => Status::RanToCompletion,
            Outcome::Faulted(_) => Status::Faulted,
            Outcome::Canceled(_) => Status::Canceled,
        }
    }

    /// Converts the outcome into a `Result`, rendering faults and
    /// cancellation as errors.
    pub fn into_result(self) -> Result<T, OperationError> {
        match self {
            Outcome::Completed(value) => Ok(value),
            Outcome::Faulted(cause) => Err(OperationError::Faulted(cause)),
            Outcome::Canceled(canceled) => Err(OperationError::Canceled(canceled)),
        }
    }

    /// Returns the fault carried by a non-successful outcome.
    pub fn fault(&self) -> Option<Fault> {
        match self {
            Outcome::Completed(_) => None,
            Outcome::Faulted(cause) => Some(Fault::Error(cause.clone())),
            Outcome::Canceled(canceled) => Some(Fault::Canceled(canceled.clone())),
        }
    }

    /// The status this outcome records once normalized.
    pub(crate) fn normalized_status(&self) -> Status {
        match self {
            Outcome::Faulted(cause) if cancellation_of(cause).is_some() => Status::Canceled,
            other => other.status(),
        }
    }

    /// Records a fault whose cause is a cancellation marker as canceled.
    pub(crate) fn normalized(self) -> Self {
        match self {
            Outcome::Faulted(cause) => match cancellation_of(&cause) {
                Some(canceled) => Outcome::Canceled(canceled),
                None => Outcome::Faulted(cause),
            },
            other => other,
        }
    }
}

impl RawOutcome {
    pub(crate) fn erase<T: Send + Sync + 'static>(outcome: Outcome<T>) -> Self {
        match outcome {
            Outcome::Completed(value) => Outcome::Completed(Arc::new(value)),
            Outcome::Faulted(cause) => Outcome::Faulted(cause),
            Outcome::Canceled(canceled) => Outcome::Canceled(canceled),
        }
    }

    /// Recovers a typed outcome by cloning the stored value out of the slot.
    pub(crate) fn typed<T: Clone + 'static>(&self) -> Result<Outcome<T>, OperationError> {
        Ok(match self {
            Outcome::Completed(value) => Outcome::Completed(downcast(value)?),
            Outcome::Faulted(cause) => Outcome::Faulted(cause.clone()),
            Outcome::Canceled(canceled) => Outcome::Canceled(canceled.clone()),
        })
    }
}

/// Clones a typed value out of an erased result slot.
pub(crate) fn downcast<T: Clone + 'static>(value: &Value) -> Result<T, OperationError> {
    (**value)
        .downcast_ref::<T>()
        .cloned()
        .ok_or(OperationError::ResultType)
}

/// Why an operation did not produce a value.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Producer-supplied failure.
    Error(Cause),

    /// Cancellation, never conflated with an ordinary failure.
    Canceled(Canceled),
}

impl Fault {
    /// The failure cause, or the reason attached to the cancellation.
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            Fault::Error(cause) => Some(cause),
            Fault::Canceled(canceled) => canceled.reason(),
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Fault::Canceled(_))
    }
}
