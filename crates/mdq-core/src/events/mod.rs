//! Progress and state-change events.
//!
//! The store publishes one event per successful mutation; observers (console
//! output, the SQLite mirror, a GUI) subscribe through [`Publisher`]. The core
//! has no dependency on any of them.

mod progress;
mod publisher;

pub use progress::{ProgressStats, ProgressThrottle};
pub use publisher::{Publisher, Subscription, DEFAULT_SUBSCRIBER_CAPACITY};

use crate::job::{Job, JobError, JobId, JobState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// State transition (including submission).
    State,
    /// Byte counters changed while Active.
    Progress,
    /// Record deleted from the store.
    Removed,
}

/// One `(jobId, state, progressBytes, totalBytes, error?)` notification.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEvent {
    pub job_id: JobId,
    pub kind: EventKind,
    pub state: JobState,
    pub attempt: u32,
    pub progress_bytes: u64,
    pub total_bytes: Option<u64>,
    pub error: Option<JobError>,
}

impl JobEvent {
    pub(crate) fn state_of(job: &Job) -> Self {
        Self::from_job(job, EventKind::State)
    }

    pub(crate) fn progress_of(job: &Job) -> Self {
        Self::from_job(job, EventKind::Progress)
    }

    pub(crate) fn removed(job: &Job) -> Self {
        Self::from_job(job, EventKind::Removed)
    }

    fn from_job(job: &Job, kind: EventKind) -> Self {
        Self {
            job_id: job.id,
            kind,
            state: job.state,
            attempt: job.attempt,
            progress_bytes: job.progress_bytes,
            total_bytes: job.total_bytes,
            error: job.last_error.clone(),
        }
    }

    /// Terminal events are never dropped by a full subscriber buffer.
    pub fn is_terminal(&self) -> bool {
        match self.kind {
            EventKind::Removed => true,
            EventKind::State => self.state.is_finished(),
            EventKind::Progress => false,
        }
    }
}
