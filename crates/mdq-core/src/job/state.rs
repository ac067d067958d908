//! Job state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a job. Stored as a lowercase string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Active,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub const ALL: [JobState; 6] = [
        JobState::Queued,
        JobState::Active,
        JobState::Paused,
        JobState::Completed,
        JobState::Failed,
        JobState::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Active => "active",
            JobState::Paused => "paused",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    /// No outgoing transitions at all.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Cancelled)
    }

    /// Finished from the point of view of pause/cancel: nothing left to stop.
    /// `Failed` is included; it only leaves through an explicit retry.
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match self {
            Queued => matches!(next, Active | Paused | Cancelled),
            Active => matches!(next, Completed | Failed | Paused | Cancelled | Queued),
            Paused => matches!(next, Queued | Cancelled),
            Failed => matches!(next, Queued),
            Completed | Cancelled => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a state string is not one of the known states.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job state: {0}")]
pub struct ParseStateError(pub String);

impl FromStr for JobState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseStateError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_edges() {
        for next in JobState::ALL {
            assert!(!JobState::Completed.can_transition_to(next));
            assert!(!JobState::Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn completed_cannot_go_back_to_active() {
        assert!(!JobState::Completed.can_transition_to(JobState::Active));
    }

    #[test]
    fn paused_resumes_through_queued_only() {
        assert!(JobState::Paused.can_transition_to(JobState::Queued));
        assert!(!JobState::Paused.can_transition_to(JobState::Active));
        assert!(JobState::Paused.can_transition_to(JobState::Cancelled));
    }

    #[test]
    fn failed_may_be_requeued_but_not_cancelled() {
        assert!(JobState::Failed.can_transition_to(JobState::Queued));
        assert!(!JobState::Failed.can_transition_to(JobState::Cancelled));
        assert!(JobState::Failed.is_finished());
        assert!(!JobState::Failed.is_terminal());
    }

    #[test]
    fn parse_and_display() {
        for st in JobState::ALL {
            assert_eq!(st.as_str().parse::<JobState>().unwrap(), st);
            assert_eq!(st.to_string(), st.as_str());
        }
        assert_eq!("ACTIVE".parse::<JobState>().unwrap(), JobState::Active);
        assert!("running".parse::<JobState>().is_err());
    }
}
