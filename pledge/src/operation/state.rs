use std::fmt;

/// Operation created, no producer activity observed yet.
pub(crate) const CREATED: u8 = 0;

/// Operation handed to whatever will run it.
pub(crate) const SCHEDULED: u8 = 1;

/// Producer is actively working on the operation.
pub(crate) const RUNNING: u8 = 2;

/// Operation produced its result.
pub(crate) const RAN_TO_COMPLETION: u8 = 3;

/// Operation failed with a cause.
pub(crate) const FAULTED: u8 = 4;

/// Operation was canceled.
pub(crate) const CANCELED: u8 = 5;

/// Lifecycle status of an operation.
///
/// The first three variants are non-terminal. Once an operation reaches
/// [`RanToCompletion`](Status::RanToCompletion), [`Faulted`](Status::Faulted)
/// or [`Canceled`](Status::Canceled), its status never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Created,
    Scheduled,
    Running,
    RanToCompletion,
    Faulted,
    Canceled,
}

impl Status {
    /// Returns `true` for the three terminal statuses.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Status::RanToCompletion | Status::Faulted | Status::Canceled
        )
    }

    /// Whether a transition from `self` to `target` is legal.
    ///
    /// | target | allowed from |
    /// |---|---|
    /// | `Scheduled` | `Created` |
    /// | `Running` | `Created`, `Scheduled` |
    /// | terminal | any non-terminal status |
    pub fn can_transition_to(self, target: Status) -> bool {
        match target {
            Status::Created => false,
            Status::Scheduled => self == Status::Created,
            Status::Running => matches!(self, Status::Created | Status::Scheduled),
            _ => !self.is_terminal(),
        }
    }

    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            CREATED => Status::Created,
            SCHEDULED => Status::Scheduled,
            RUNNING => Status::Running,
            RAN_TO_COMPLETION => Status::RanToCompletion,
            FAULTED => Status::Faulted,
            _ => Status::Canceled,
        }
    }

    pub(crate) fn as_raw(self) -> u8 {
        match self {
            Status::Created => CREATED,
            Status::Scheduled => SCHEDULED,
            Status::Running => RUNNING,
            Status::RanToCompletion => RAN_TO_COMPLETION,
            Status::Faulted => FAULTED,
            Status::Canceled => CANCELED,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Created => "created",
            Status::Scheduled => "scheduled",
            Status::Running => "running",
            Status::RanToCompletion => "ran-to-completion",
            Status::Faulted => "faulted",
            Status::Canceled => "canceled",
        };

        f.write_str(name)
    }
}
