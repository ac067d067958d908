//! Error taxonomy of the queue API.
//!
//! Stage failures inside a worker (`FetchError`, `PostprocessError`,
//! `FinalizeError`) never reach callers; they are recorded on the job as a
//! `JobError`. Only the variants below cross the public API.

use crate::job::{JobId, JobState};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// Rejected at submission; the job never entered the queue.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("job {0} not found")]
    NotFound(JobId),

    /// Compare-and-swap or state-machine violation. No job was mutated.
    #[error("job {id}: cannot move {actual} -> {requested} (expected {expected})")]
    Conflict {
        id: JobId,
        expected: JobState,
        actual: JobState,
        requested: JobState,
    },

    /// The queue store itself is unusable; escalated to the caller.
    #[error("queue store unavailable: {0}")]
    SystemFault(String),
}

pub type QueueResult<T> = Result<T, QueueError>;
