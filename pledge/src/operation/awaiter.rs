use super::Operation;
use crate::dispatch::{ContinuationToken, current_context};
use crate::error::OperationError;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

/// Await bridge over an operation.
///
/// Exposes the three things a suspension mechanism needs: whether the
/// operation is done, a way to register exactly one resumption, and the
/// outcome to resume with.
pub struct Awaiter<T> {
    operation: Operation<T>,
}

impl<T: Clone + Send + Sync + 'static> Awaiter<T> {
    pub(crate) fn new(operation: Operation<T>) -> Self {
        Self { operation }
    }

    /// Returns `true` if the operation is already terminal.
    pub fn is_done(&self) -> bool {
        self.operation.is_completed()
    }

    /// Registers the single resumption callback.
    ///
    /// The awaiter is consumed, so at most one resumption can exist. The
    /// callback runs on the dispatch context active at registration time,
    /// or immediately if the operation is already done.
    pub fn register_resumption<F>(self, resume: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.operation
            .register(move |_, _| resume(), current_context());
    }

    /// The outcome to resume with.
    ///
    /// Returns the result on success, [`OperationError::Faulted`] with the
    /// producer's cause, or [`OperationError::Canceled`].
    pub fn outcome(&self) -> Result<T, OperationError> {
        self.operation.result()
    }
}

/// Future resolving to the outcome of an operation.
///
/// Created by awaiting an [`Operation`]. The future registers a single
/// continuation the first time it is polled; later polls only replace
/// the waker it will notify.
pub struct OperationFuture<T> {
    operation: Operation<T>,

    /// Waker slot shared with the registered continuation.
    waker: Option<Arc<Mutex<Option<Waker>>>>,

    /// Token of the registered continuation, removed again on drop.
    token: Option<ContinuationToken>,
}

impl<T> OperationFuture<T> {
    pub(crate) fn new(operation: Operation<T>) -> Self {
        Self {
            operation,
            waker: None,
            token: None,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Future for OperationFuture<T> {
    type Output = Result<T, OperationError>;

    /// Polls the operation.
    ///
    /// The waker is stored **before** re-checking the status to avoid
    /// missed wake-ups.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.operation.is_completed() {
            return Poll::Ready(this.operation.result());
        }

        match &this.waker {
            Some(slot) => {
                let mut waker = slot.lock();
                if !waker.as_ref().is_some_and(|w| w.will_wake(cx.waker())) {
                    *waker = Some(cx.waker().clone());
                }
            }
            None => {
                let slot = Arc::new(Mutex::new(Some(cx.waker().clone())));
                let wake = slot.clone();

                this.token = this.operation.core().add_continuation(
                    Box::new(move |_, _| {
                        if let Some(waker) = wake.lock().take() {
                            waker.wake();
                        }
                    }),
                    None,
                );

                this.waker = Some(slot);
            }
        }

        if this.operation.is_completed() {
            return Poll::Ready(this.operation.result());
        }

        Poll::Pending
    }
}

impl<T> Drop for OperationFuture<T> {
    /// Unregisters the waker continuation of an abandoned future.
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.operation.unregister(token);
        }
    }
}
