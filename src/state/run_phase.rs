/// Pipeline run phases
///
/// A run moves strictly forward through these phases. It may jump to
/// `Closed` from `Discovering` or `Scheduling` when a run-fatal error stops it
/// before any page task has been submitted.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    /// Pipeline constructed, nothing fetched yet
    Init,

    /// Fetching the seed page to learn the page count
    Discovering,

    /// Loading the checkpoint and submitting page tasks
    Scheduling,

    /// Every task submitted; tasks are executing
    Running,

    /// Waiting for the queue to become idle
    Draining,

    /// Sink closed; the run is over
    Closed,
}

impl RunPhase {
    /// Returns the phase that normally follows this one
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::Discovering),
            Self::Discovering => Some(Self::Scheduling),
            Self::Scheduling => Some(Self::Running),
            Self::Running => Some(Self::Draining),
            Self::Draining => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    /// Returns true if moving from `self` to `to` is allowed
    pub fn can_transition_to(&self, to: Self) -> bool {
        if self.next() == Some(to) {
            return true;
        }
        to == Self::Closed && matches!(self, Self::Discovering | Self::Scheduling)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Discovering => "discovering",
            Self::Scheduling => "scheduling",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
