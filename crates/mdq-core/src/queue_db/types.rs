//! Row <-> job record conversion.

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::path::PathBuf;

use crate::job::{Job, JobError, JobState, TagHints};

/// Column list shared by every SELECT, in `job_from_row` order.
pub(super) const JOB_COLUMNS: &str = "id, source, destination, hints_json, state, attempt, \
     progress_bytes, total_bytes, last_error_json, resume_pending, retry_at, created_at, updated_at";

pub(super) fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let id: i64 = row.get("id");
    let state_str: String = row.get("state");
    let state: JobState = state_str
        .parse()
        .with_context(|| format!("job {} has invalid state", id))?;
    let hints_json: Option<String> = row.get("hints_json");
    let hints = match hints_json.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => serde_json::from_str::<TagHints>(s)
            .with_context(|| format!("job {} has invalid hints", id))?,
        None => TagHints::default(),
    };
    let error_json: Option<String> = row.get("last_error_json");
    let last_error = match error_json.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => Some(
            serde_json::from_str::<JobError>(s)
                .with_context(|| format!("job {} has invalid last error", id))?,
        ),
        None => None,
    };
    let destination: String = row.get("destination");
    let attempt: i64 = row.get("attempt");
    let progress: i64 = row.get("progress_bytes");
    let total: Option<i64> = row.get("total_bytes");
    let resume_pending: i64 = row.get("resume_pending");

    Ok(Job {
        id,
        source: row.get("source"),
        destination: PathBuf::from(destination),
        hints,
        state,
        attempt: attempt.max(0) as u32,
        progress_bytes: progress.max(0) as u64,
        total_bytes: total.map(|t| t.max(0) as u64),
        last_error,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        resume_pending: resume_pending != 0,
        retry_at: row.get("retry_at"),
    })
}

/// JSON columns of a job, `None` when empty.
pub(super) fn hints_json(hints: &TagHints) -> Result<Option<String>> {
    if hints.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(hints)?))
}

pub(super) fn error_json(err: Option<&JobError>) -> Result<Option<String>> {
    err.map(serde_json::to_string).transpose().map_err(Into::into)
}
