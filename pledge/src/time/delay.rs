use super::timer::{self, TimerKey};
use crate::operation::{CompletionSource, Operation, Outcome};

use std::time::{Duration, Instant};

/// Creates an operation that completes after `duration`.
///
/// A zero duration returns an operation that already ran to completion.
/// Otherwise the operation is `Scheduled` right away and completed by
/// the timer thread once the deadline passes.
///
/// # Examples
///
/// ```rust,ignore
/// let delay = pledge::time::delay(Duration::from_millis(10));
/// delay.wait()?;
/// ```
pub fn delay(duration: Duration) -> Operation<()> {
    Delay::start(duration).operation()
}

/// A pending delay together with the means to abandon it.
///
/// Used by combinators that own their helper delays and tear them down
/// once they are no longer needed.
pub(crate) struct Delay {
    source: CompletionSource<()>,
    key: Option<TimerKey>,
}

impl Delay {
    /// Schedules a delay; a zero duration completes immediately.
    pub(crate) fn start(duration: Duration) -> Self {
        let source = CompletionSource::new();

        if duration.is_zero() {
            source.try_complete(Outcome::Completed(()), true);
            return Self { source, key: None };
        }

        source.try_set_scheduled();

        let deadline = Instant::now() + duration;
        let producer = source.clone();
        let key = timer::schedule(
            deadline,
            Box::new(move || {
                producer.try_set_result(());
            }),
        );

        tracing::debug!(op.id = source.operation().id(), ?duration, "delay scheduled");

        Self {
            source,
            key: Some(key),
        }
    }

    pub(crate) fn operation(&self) -> Operation<()> {
        self.source.operation()
    }

    /// Stops the timer, cancels the delay operation and disposes it.
    pub(crate) fn abandon(self) {
        if let Some(key) = self.key {
            key.cancel();
        }

        self.source.try_set_canceled();

        // Terminal by now, so disposal cannot fail.
        let _ = self.source.operation().dispose();
    }
}
