use crate::dispatch::ContinuationToken;
use crate::error::OperationError;
use crate::operation::{CompletionSource, Operation, OperationCore, Outcome};
use crate::time::Delay;

use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

/// Mirrors `operation`, faulting with [`OperationError::TimedOut`] if it is
/// not terminal within `duration`.
///
/// The wrapped operation is left untouched when the deadline passes; only
/// the returned operation gives up on it.
pub fn timeout<T>(operation: &Operation<T>, duration: Duration) -> Operation<T>
where
    T: Clone + Send + Sync + 'static,
{
    if operation.is_completed() {
        return mirror(operation.core(), true);
    }

    let state = Arc::new(Deadline {
        decided: AtomicBool::new(false),
        delay: Mutex::new(None),
        watch: Mutex::new(None),
        source: CompletionSource::new(),
    });
    let result = state.source.operation();

    let delay = Delay::start(duration);
    let expiry = delay.operation();
    *state.delay.lock() = Some(delay);

    let observer = state.clone();
    let token = operation.core().add_continuation(
        Box::new(move |inner, _| observer.finish(inner)),
        None,
    );

    if let Some(token) = token {
        *state.watch.lock() = Some((Arc::downgrade(operation.core()), token));
    }

    let observer = state.clone();
    expiry.core().add_continuation(
        Box::new(move |_, _| observer.expire(duration)),
        None,
    );

    result
}

fn mirror<T>(core: &Arc<OperationCore>, synchronously: bool) -> Operation<T>
where
    T: Clone + Send + Sync + 'static,
{
    let source = CompletionSource::new();
    source.try_complete(copy_outcome(core), synchronously);
    source.operation()
}

fn copy_outcome<T: Clone + 'static>(core: &Arc<OperationCore>) -> Outcome<T> {
    match core.outcome().and_then(|outcome| outcome.typed::<T>()) {
        Ok(outcome) => outcome,
        Err(error) => Outcome::Faulted(Arc::new(error)),
    }
}

struct Deadline<T> {
    decided: AtomicBool,
    delay: Mutex<Option<Delay>>,

    /// Continuation left on the wrapped operation, removed on expiry.
    watch: Mutex<Option<(Weak<OperationCore>, ContinuationToken)>>,

    source: CompletionSource<T>,
}

impl<T: Clone + Send + Sync + 'static> Deadline<T> {
    fn finish(&self, inner: &Arc<OperationCore>) {
        if self.decided.swap(true, Ordering::AcqRel) {
            return;
        }

        self.source.try_complete(copy_outcome(inner), false);
        self.abandon_delay();
    }

    fn expire(&self, duration: Duration) {
        if self.decided.swap(true, Ordering::AcqRel) {
            return;
        }

        let watch = self.watch.lock().take();

        if let Some((inner, token)) = watch {
            if let Some(inner) = inner.upgrade() {
                inner.remove_continuation(token);
            }
        }

        drop(self.delay.lock().take());

        tracing::debug!(op.id = self.source.operation().id(), ?duration, "operation timed out");
        self.source
            .try_complete(Outcome::Faulted(Arc::new(OperationError::TimedOut)), false);
    }

    fn abandon_delay(&self) {
        let delay = self.delay.lock().take();

        if let Some(delay) = delay {
            delay.abandon();
        }
    }
}
