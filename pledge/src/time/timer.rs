use crate::dispatch::Job;
use crate::error::Panicked;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Instant;

/// Commands accepted by the timer driver thread.
pub(crate) enum Command {
    SetTimer {
        deadline: Instant,
        action: Job,
        cancelled: Arc<AtomicBool>,
    },

    /// Drops entries whose key was cancelled.
    Purge,
}

/// An entry in the timer queue.
///
/// Stored in a binary heap ordered by deadline. Entries with the same
/// deadline fire in the order they were scheduled.
pub(crate) struct TimerEntry {
    /// The time at which the timer should fire.
    deadline: Instant,

    /// Scheduling sequence number, breaks deadline ties.
    seq: u64,

    /// Work performed when the deadline is reached.
    action: Job,

    /// Cancellation flag shared with the [`TimerKey`].
    cancelled: Arc<AtomicBool>,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for TimerEntry {
    /// Orders timer entries by deadline, then by scheduling order.
    ///
    /// The comparison is **reversed** so that a `BinaryHeap<TimerEntry>`
    /// behaves as a min-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Cancels a scheduled timer.
///
/// Cancelling after the timer fired has no effect.
#[derive(Clone)]
pub(crate) struct TimerKey {
    cancelled: Arc<AtomicBool>,
}

impl TimerKey {
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::Release);

        if let Some(driver) = DRIVER.get() {
            // A stopped driver holds no entries to purge.
            let _ = driver.sender.send(Command::Purge);
        }
    }
}

/// Handle used to send commands to the driver thread.
struct TimerHandle {
    sender: Sender<Command>,
}

static DRIVER: OnceLock<TimerHandle> = OnceLock::new();

/// Name of the timer driver thread.
const THREAD_NAME: &str = "pledge-timer";

/// Schedules `action` to run on the timer thread at `deadline`.
///
/// The driver thread is started on first use.
pub(crate) fn schedule(deadline: Instant, action: Job) -> TimerKey {
    let cancelled = Arc::new(AtomicBool::new(false));
    let driver = DRIVER.get_or_init(TimerDriver::start);

    let command = Command::SetTimer {
        deadline,
        action,
        cancelled: cancelled.clone(),
    };

    if driver.sender.send(command).is_err() {
        tracing::warn!("timer driver is gone, timer will never fire");
    }

    TimerKey { cancelled }
}

/// Owns the timer heap and fires expired entries.
struct TimerDriver {
    /// Channel receiving commands from any thread.
    receiver: Receiver<Command>,

    /// Min-heap of pending timers ordered by deadline.
    timers: BinaryHeap<TimerEntry>,

    /// Next sequence number.
    seq: u64,
}

impl TimerDriver {
    /// Starts the driver thread and returns a handle to it.
    fn start() -> TimerHandle {
        let (sender, receiver) = channel();

        let spawned = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || {
                let driver = TimerDriver {
                    receiver,
                    timers: BinaryHeap::new(),
                    seq: 0,
                };
                driver.run();
            });

        match spawned {
            Ok(_) => tracing::debug!("timer driver started"),
            Err(error) => tracing::warn!(%error, "failed to start timer driver"),
        }

        TimerHandle { sender }
    }

    /// Main loop.
    ///
    /// 1. Wait for a command, bounded by the earliest deadline
    /// 2. Drain every queued command
    /// 3. Fire expired timers
    fn run(mut self) {
        loop {
            let timeout = self
                .timers
                .peek()
                .map(|t| t.deadline.saturating_duration_since(Instant::now()));

            let command = match timeout {
                Some(timeout) => match self.receiver.recv_timeout(timeout) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => return,
                },
                None => match self.receiver.recv() {
                    Ok(command) => Some(command),
                    Err(_) => return,
                },
            };

            if let Some(command) = command {
                self.handle(command);

                while let Ok(command) = self.receiver.try_recv() {
                    self.handle(command);
                }
            }

            self.fire_expired();
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::SetTimer {
                deadline,
                action,
                cancelled,
            } => {
                self.seq += 1;
                self.timers.push(TimerEntry {
                    deadline,
                    seq: self.seq,
                    action,
                    cancelled,
                });
            }
            Command::Purge => {
                let before = self.timers.len();
                self.timers
                    .retain(|timer| !timer.cancelled.load(AtomicOrdering::Acquire));

                tracing::trace!(purged = before - self.timers.len(), "cancelled timers purged");
            }
        }
    }

    fn fire_expired(&mut self) {
        let now = Instant::now();

        while let Some(timer) = self.timers.peek() {
            if timer.deadline > now {
                break;
            }

            let Some(timer) = self.timers.pop() else {
                break;
            };

            if timer.cancelled.load(AtomicOrdering::Acquire) {
                continue;
            }

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(timer.action)) {
                let panicked = Panicked::from_payload(payload);
                tracing::warn!(error = %panicked, "timer action panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[test]
    fn cancelled_timer_releases_its_action() {
        let marker = Arc::new(());
        let held = marker.clone();

        let key = schedule(
            Instant::now() + Duration::from_secs(3600),
            Box::new(move || drop(held)),
        );
        assert_eq!(Arc::strong_count(&marker), 2);

        key.cancel();

        let deadline = Instant::now() + Duration::from_secs(5);
        while Arc::strong_count(&marker) > 1 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(Arc::strong_count(&marker), 1, "Cancelled entry should be dropped early");
    }

    #[test]
    fn entries_fire_by_deadline_then_schedule_order() {
        let now = Instant::now();
        let entry = |deadline, seq| TimerEntry {
            deadline,
            seq,
            action: Box::new(|| {}),
            cancelled: Arc::new(AtomicBool::new(false)),
        };

        let mut heap = BinaryHeap::new();
        heap.push(entry(now + Duration::from_millis(5), 1));
        heap.push(entry(now, 3));
        heap.push(entry(now, 2));

        let order: Vec<_> = std::iter::from_fn(|| heap.pop().map(|timer| timer.seq)).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }
}
