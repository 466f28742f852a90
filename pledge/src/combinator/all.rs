use crate::error::{AggregateError, Canceled, Cause, OperationError};
use crate::operation::{CompletionSource, Operation, OperationCore, Outcome, Value, downcast};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

/// Creates an operation that completes once every operation in
/// `operations` is terminal.
///
/// The combined operation:
/// - is canceled if any child was canceled (the first one observed wins),
/// - otherwise faults with an [`AggregateError`] holding every child fault
///   in input order,
/// - otherwise runs to completion with the child results in input order.
///
/// It reports `completed_synchronously` only when every child was already
/// terminal while the combinator was being built. An empty input completes
/// immediately with an empty vector.
///
/// # Examples
///
/// ```rust,ignore
/// let both = when_all([first.operation(), second.operation()]);
/// first.set_result(1)?;
/// second.set_result(2)?;
/// assert_eq!(both.result()?, vec![1, 2]);
/// ```
pub fn when_all<T, I>(operations: I) -> Operation<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = Operation<T>>,
{
    let children = operations
        .into_iter()
        .map(|operation| operation.core().clone())
        .collect();

    join(children, collect_values::<T>)
}

/// Like [`when_all`], over operations of different result types.
///
/// The combined operation carries no value; read the children for results.
pub fn when_all_erased<I>(operations: I) -> Operation<()>
where
    I: IntoIterator<Item = Arc<OperationCore>>,
{
    join(operations.into_iter().collect(), |_| Ok(()))
}

fn collect_values<T: Clone + 'static>(values: Vec<Value>) -> Result<Vec<T>, OperationError> {
    values.iter().map(downcast::<T>).collect()
}

/// Builds the combined result once every child is accounted for.
type Collect<R> = fn(Vec<Value>) -> Result<R, OperationError>;

fn join<R>(children: Vec<Arc<OperationCore>>, collect: Collect<R>) -> Operation<R>
where
    R: Send + Sync + 'static,
{
    let count = children.len();
    let state = Arc::new(JoinState {
        // One extra count is held by construction itself.
        remaining: AtomicUsize::new(count + 1),
        slots: Mutex::new(Slots::new(count)),
        source: CompletionSource::new(),
        collect,
    });
    let operation = state.source.operation();

    tracing::debug!(op.id = operation.id(), children = count, "when_all started");

    for (index, child) in children.iter().enumerate() {
        let state = state.clone();
        child.add_continuation(
            Box::new(move |child, _| state.observe(index, child)),
            None,
        );
    }

    state.release(true);
    operation
}

struct JoinState<R> {
    /// Children not yet observed, plus one for construction.
    remaining: AtomicUsize,

    slots: Mutex<Slots>,
    source: CompletionSource<R>,
    collect: Collect<R>,
}

/// Child outcomes gathered so far.
struct Slots {
    values: Vec<Option<Value>>,
    faults: Vec<(usize, Cause)>,
    canceled: Option<Canceled>,
}

impl Slots {
    fn new(count: usize) -> Self {
        Self {
            values: (0..count).map(|_| None).collect(),
            faults: Vec::new(),
            canceled: None,
        }
    }
}

impl<R: Send + Sync + 'static> JoinState<R> {
    fn observe(&self, index: usize, child: &Arc<OperationCore>) {
        {
            let mut slots = self.slots.lock();

            match child.outcome() {
                Ok(Outcome::Completed(value)) => slots.values[index] = Some(value),
                Ok(Outcome::Faulted(cause)) => slots.faults.push((index, cause)),
                Ok(Outcome::Canceled(canceled)) => {
                    if slots.canceled.is_none() {
                        slots.canceled = Some(canceled);
                    }
                }
                Err(error) => slots.faults.push((index, Arc::new(error))),
            }
        }

        self.release(false);
    }

    /// Drops one count; the last one completes the combined operation.
    fn release(&self, synchronously: bool) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        let outcome = {
            let mut slots = self.slots.lock();

            if let Some(canceled) = slots.canceled.take() {
                Outcome::Canceled(canceled)
            } else if !slots.faults.is_empty() {
                let mut faults = std::mem::take(&mut slots.faults);
                faults.sort_by_key(|(index, _)| *index);

                let causes = faults.into_iter().map(|(_, cause)| cause).collect();
                Outcome::Faulted(Arc::new(AggregateError::new(causes)))
            } else {
                let values = slots.values.drain(..).flatten().collect();

                match (self.collect)(values) {
                    Ok(result) => Outcome::Completed(result),
                    Err(error) => Outcome::Faulted(Arc::new(error)),
                }
            }
        };

        self.source.try_complete(outcome, synchronously);
    }
}
