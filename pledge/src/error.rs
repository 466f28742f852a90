//! Error types surfaced by operations and their producers.
//!
//! Status and flag queries never fail. Everything else that can go wrong is
//! reported through [`OperationError`]:
//! - misuse of the producer surface (`InvalidState`),
//! - access after disposal (`Disposed`) or before completion (`NotCompleted`),
//! - the outcome of a failed or canceled operation (`Faulted`, `Canceled`).

use crate::operation::Status;

use std::any::Any;
use std::error::Error;
use std::sync::Arc;

use thiserror::Error;

/// A shared, type-erased error payload.
///
/// Causes are reference counted so the same fault can be observed by any
/// number of consumers without being cloned.
pub type Cause = Arc<dyn Error + Send + Sync + 'static>;

/// Errors reported by operations and completion sources.
#[derive(Debug, Clone, Error)]
pub enum OperationError {
    /// A transition was attempted from a status that forbids it.
    #[error("cannot transition to {attempted} from {current}")]
    InvalidState { attempted: Status, current: Status },

    /// The operation was accessed after being disposed.
    #[error("operation has been disposed")]
    Disposed,

    /// The operation has not reached a terminal state yet.
    #[error("operation has not completed")]
    NotCompleted,

    /// The operation faulted with the given cause.
    #[error("operation faulted: {0}")]
    Faulted(Cause),

    /// The operation was canceled.
    #[error(transparent)]
    Canceled(Canceled),

    /// The operation did not complete within the allotted time.
    #[error("operation timed out")]
    TimedOut,

    /// A combinator that needs at least one operation received none.
    #[error("no operations were supplied")]
    EmptyInput,

    /// The stored result does not have the type the handle expects.
    #[error("operation result has an unexpected type")]
    ResultType,
}

impl OperationError {
    /// Returns `true` if this error represents a cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self, OperationError::Canceled(_))
    }

    /// Returns the producer-supplied cause of a faulted operation.
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            OperationError::Faulted(cause) => Some(cause),
            _ => None,
        }
    }
}

/// Cancellation marker.
///
/// Passing this type (or an [`OperationError::Canceled`]) as the cause of a
/// fault records the operation as canceled instead of faulted.
#[derive(Debug, Clone, Default, Error)]
#[error("operation was canceled")]
pub struct Canceled {
    reason: Option<Cause>,
}

impl Canceled {
    /// Creates a cancellation marker with no reason attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cancellation marker wrapping the error that caused it.
    pub fn with_reason<E>(reason: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self {
            reason: Some(into_cause(reason.into())),
        }
    }

    /// The error that caused the cancellation, if any.
    pub fn reason(&self) -> Option<&Cause> {
        self.reason.as_ref()
    }
}

/// Every fault collected by an all-of combinator, in input order.
#[derive(Debug, Clone, Error)]
#[error("{} operations faulted", .causes.len())]
pub struct AggregateError {
    causes: Vec<Cause>,
}

impl AggregateError {
    pub(crate) fn new(causes: Vec<Cause>) -> Self {
        Self { causes }
    }

    /// The individual causes.
    pub fn causes(&self) -> &[Cause] {
        &self.causes
    }
}

/// A callback or factory panicked while producing a dependent operation.
#[derive(Debug, Clone, Error)]
#[error("callback panicked: {message}")]
pub struct Panicked {
    message: String,
}

impl Panicked {
    /// Builds the error from a payload returned by `catch_unwind`.
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_owned(),
                Err(_) => "unknown panic payload".to_owned(),
            },
        };

        Self { message }
    }

    /// The panic message, when it was a string.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Converts a boxed error into a shared [`Cause`].
///
/// A box that already wraps a `Cause` is unwrapped instead of being nested
/// a second time, so cancellation markers stay detectable.
pub(crate) fn into_cause(error: Box<dyn Error + Send + Sync>) -> Cause {
    match error.downcast::<Cause>() {
        Ok(cause) => *cause,
        Err(error) => Arc::from(error),
    }
}

/// Returns the cancellation marker carried by `cause`, if it is one.
pub(crate) fn cancellation_of(cause: &Cause) -> Option<Canceled> {
    if let Some(canceled) = cause.downcast_ref::<Canceled>() {
        return Some(canceled.clone());
    }

    match cause.downcast_ref::<OperationError>() {
        Some(OperationError::Canceled(canceled)) => Some(canceled.clone()),
        _ => None,
    }
}
