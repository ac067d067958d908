//! Job record: identity, submission parameters, and mutable execution state.
//!
//! Records are owned by the queue store; everything outside the store works on
//! cloned snapshots, so holding a `Job` never lets a caller mutate the queue.

mod state;

pub use state::{JobState, ParseStateError};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::QueueError;

/// Job identifier. Assigned by the store, strictly increasing, never reused.
pub type JobId = i64;

/// Optional tag hints supplied at submission and handed to the postprocessor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
}

impl TagHints {
    pub fn is_empty(&self) -> bool {
        self.artist.is_none() && self.title.is_none() && self.album.is_none()
    }
}

/// Whether a failure is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Network timeout, connection reset, throttling: retried with backoff.
    Transient,
    /// Invalid source, disk full, unwritable destination, bad data: not retried.
    Permanent,
}

/// Pipeline stage a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Start,
    Fetch,
    Postprocess,
    Finalize,
}

/// Last classified failure of a job (`lastError`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: FailureKind,
    pub stage: Stage,
    pub message: String,
}

impl JobError {
    pub fn new(kind: FailureKind, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            message: message.into(),
        }
    }

    pub fn transient(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, stage, message)
    }

    pub fn permanent(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(FailureKind::Permanent, stage, message)
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:?} error: {}", self.kind, self.stage, self.message)
    }
}

/// Submission parameters for a new job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub source: String,
    pub destination: PathBuf,
    pub hints: TagHints,
}

impl NewJob {
    pub fn new(source: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            hints: TagHints::default(),
        }
    }

    pub fn with_hints(mut self, hints: TagHints) -> Self {
        self.hints = hints;
        self
    }

    /// Rejects empty source or destination before anything enters the queue.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.source.trim().is_empty() {
            return Err(QueueError::InvalidInput("source is empty".into()));
        }
        if self.destination.as_os_str().is_empty()
            || self.destination.to_string_lossy().trim().is_empty()
        {
            return Err(QueueError::InvalidInput("destination is empty".into()));
        }
        Ok(())
    }
}

/// Full job record. Public handles to it are snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    /// Locator to fetch (usually a URL).
    pub source: String,
    /// Target path; replaced by the conflict-free path once finalized.
    pub destination: PathBuf,
    pub hints: TagHints,
    pub state: JobState,
    /// Execution attempts started so far.
    pub attempt: u32,
    pub progress_bytes: u64,
    pub total_bytes: Option<u64>,
    pub last_error: Option<JobError>,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Unix milliseconds.
    pub updated_at: i64,
    /// Next admission continues the current attempt (after pause or crash
    /// recovery) instead of starting a fresh one.
    pub resume_pending: bool,
    /// Not admissible before this Unix-millisecond instant (retry backoff).
    pub retry_at: Option<i64>,
}

/// Read-only copy of a job handed out by the query API.
pub type JobSnapshot = Job;

impl Job {
    pub(crate) fn from_new(id: JobId, new: NewJob, now: i64) -> Self {
        Self {
            id,
            source: new.source,
            destination: new.destination,
            hints: new.hints,
            state: JobState::Queued,
            attempt: 0,
            progress_bytes: 0,
            total_bytes: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            resume_pending: false,
            retry_at: None,
        }
    }

    /// Queued and not waiting out a retry delay.
    pub fn is_admissible(&self, now: i64) -> bool {
        self.state == JobState::Queued && self.retry_at.map_or(true, |at| at <= now)
    }
}

/// Current time as Unix milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
