use crate::dispatch::ContinuationToken;
use crate::error::OperationError;
use crate::operation::{CompletionSource, Operation, OperationCore, Outcome};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

/// Creates an operation that mirrors the first child to reach a terminal
/// state.
///
/// The winner's outcome (value, fault or cancellation) is copied; the other
/// children keep running and are never canceled by this combinator. When
/// several children are already terminal, the earliest in `operations`
/// wins. Children completing concurrently on different threads race, and
/// whichever continuation runs first wins.
///
/// An empty input yields an operation faulted with
/// [`OperationError::EmptyInput`].
pub fn when_any<T, I>(operations: I) -> Operation<T>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = Operation<T>>,
{
    let children: Vec<Operation<T>> = operations.into_iter().collect();

    if children.is_empty() {
        return Operation::from_fault(OperationError::EmptyInput);
    }

    let state = Arc::new(RaceState {
        decided: AtomicBool::new(false),
        constructing: AtomicBool::new(true),
        builder: thread::current().id(),
        registrations: Mutex::new(Vec::new()),
        source: CompletionSource::new(),
    });
    let operation = state.source.operation();

    tracing::debug!(op.id = operation.id(), children = children.len(), "when_any started");

    for child in &children {
        if state.decided.load(Ordering::Acquire) {
            break;
        }

        let observer = state.clone();
        let token = child.core().add_continuation(
            Box::new(move |child, _| observer.observe(child)),
            None,
        );

        if let Some(token) = token {
            state
                .registrations
                .lock()
                .push((Arc::downgrade(child.core()), token));
        }
    }

    state.constructing.store(false, Ordering::Release);

    // A child may have won on another thread while registrations were
    // still being added.
    if state.decided.load(Ordering::Acquire) {
        state.detach();
    }

    operation
}

struct RaceState<T> {
    /// Set by the first child to complete.
    decided: AtomicBool,

    /// Set while [`when_any`] is still running on `builder`.
    constructing: AtomicBool,
    builder: ThreadId,

    /// Continuations still registered on losing children.
    registrations: Mutex<Vec<(Weak<OperationCore>, ContinuationToken)>>,

    source: CompletionSource<T>,
}

impl<T: Clone + Send + Sync + 'static> RaceState<T> {
    fn observe(&self, child: &Arc<OperationCore>) {
        if self.decided.swap(true, Ordering::AcqRel) {
            return;
        }

        let synchronously = self.on_construction_stack();

        let outcome = match child.outcome().and_then(|outcome| outcome.typed::<T>()) {
            Ok(outcome) => outcome,
            Err(error) => Outcome::Faulted(Arc::new(error)),
        };

        tracing::debug!(
            op.id = self.source.operation().id(),
            winner = child.id(),
            status = %outcome.status(),
            "when_any decided"
        );

        self.source.try_complete(outcome, synchronously);
        self.detach();
    }

    /// Whether the caller runs inside [`when_any`] itself.
    fn on_construction_stack(&self) -> bool {
        self.constructing.load(Ordering::Acquire) && thread::current().id() == self.builder
    }

    /// Removes the continuations left on the losing children.
    fn detach(&self) {
        let registrations = std::mem::take(&mut *self.registrations.lock());

        for (child, token) in registrations {
            if let Some(child) = child.upgrade() {
                child.remove_continuation(token);
            }
        }
    }
}
