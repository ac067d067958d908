//! Postprocess stage: hand the staged file to an external transcode/tag step.
//!
//! Runs on the blocking pool. Transient failures are retried in place by the
//! worker without refetching; anything still failing afterwards fails the job.

mod command;

pub use command::CommandPostprocessor;

use std::path::{Path, PathBuf};

use crate::job::{FailureKind, TagHints};
use crate::retry::Retryable;

/// Input to one postprocess run.
#[derive(Debug, Clone, Copy)]
pub struct PostprocessRequest<'a> {
    /// Fully fetched staging file.
    pub input: &'a Path,
    /// Suggested output location inside the staging area.
    pub output: &'a Path,
    pub hints: &'a TagHints,
}

/// Raw file + metadata hints -> tagged file.
pub trait Postprocessor: Send + Sync {
    /// Returns the path of the processed file (may be `req.input` when the
    /// step works in place).
    fn process(&self, req: &PostprocessRequest<'_>) -> Result<PathBuf, PostprocessError>;
}

/// Leaves the fetched bytes untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Postprocessor for Passthrough {
    fn process(&self, req: &PostprocessRequest<'_>) -> Result<PathBuf, PostprocessError> {
        Ok(req.input.to_path_buf())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PostprocessError {
    /// The program could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// Killed by a signal before finishing.
    #[error("{program} terminated by signal")]
    Killed { program: String },
    /// The program rejected the input.
    #[error("{program} exited with status {code}: {stderr}")]
    Exit {
        program: String,
        code: i32,
        stderr: String,
    },
    #[error("postprocess produced no output at {0}")]
    MissingOutput(PathBuf),
    #[error("invalid postprocess command: {0}")]
    InvalidCommand(String),
}

impl Retryable for PostprocessError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            PostprocessError::Spawn { source, .. } => match source.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    FailureKind::Permanent
                }
                _ => FailureKind::Transient,
            },
            PostprocessError::Killed { .. } => FailureKind::Transient,
            PostprocessError::Exit { .. }
            | PostprocessError::MissingOutput(_)
            | PostprocessError::InvalidCommand(_) => FailureKind::Permanent,
        }
    }
}
