//! Job write operations: insert, snapshot upsert, CAS transitions, removal.
//!
//! `transition` is the offline counterpart of the in-memory store: used when
//! no engine is running, it applies the same per-edge bookkeeping and only
//! writes if the row is still in the expected state.

use anyhow::Result;

use super::super::db::{fault, QueueDb};
use super::super::types::{error_json, hints_json};
use crate::error::{QueueError, QueueResult};
use crate::job::{now_millis, Job, JobId, JobState, NewJob};
use crate::store;

impl QueueDb {
    /// Insert a new Queued job and return its id.
    pub async fn insert_job(&self, new: &NewJob) -> QueueResult<JobId> {
        new.validate()?;
        let now = now_millis();
        let hints = hints_json(&new.hints).map_err(fault)?;
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (source, destination, hints_json, state, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
        )
        .bind(&new.source)
        .bind(new.destination.to_string_lossy().as_ref())
        .bind(hints)
        .bind(JobState::Queued.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(fault)?;
        Ok(result.last_insert_rowid())
    }

    /// Write a full job snapshot, inserting the row if needed.
    pub async fn upsert(&self, job: &Job) -> Result<()> {
        let hints = hints_json(&job.hints)?;
        let last_error = error_json(job.last_error.as_ref())?;
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, source, destination, hints_json, state, attempt,
                progress_bytes, total_bytes, last_error_json, resume_pending,
                retry_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(id) DO UPDATE SET
                source = excluded.source,
                destination = excluded.destination,
                hints_json = excluded.hints_json,
                state = excluded.state,
                attempt = excluded.attempt,
                progress_bytes = excluded.progress_bytes,
                total_bytes = excluded.total_bytes,
                last_error_json = excluded.last_error_json,
                resume_pending = excluded.resume_pending,
                retry_at = excluded.retry_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(job.id)
        .bind(&job.source)
        .bind(job.destination.to_string_lossy().as_ref())
        .bind(hints)
        .bind(job.state.as_str())
        .bind(job.attempt as i64)
        .bind(job.progress_bytes as i64)
        .bind(job.total_bytes.map(|t| t as i64))
        .bind(last_error)
        .bind(job.resume_pending as i64)
        .bind(job.retry_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a job row. Returns whether a row existed.
    pub async fn delete(&self, id: JobId) -> Result<bool> {
        let result = sqlx::query(r#"DELETE FROM jobs WHERE id = ?1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Compare-and-swap `expected -> next` on the stored row.
    pub async fn transition(
        &self,
        id: JobId,
        expected: JobState,
        next: JobState,
    ) -> QueueResult<Job> {
        let mut job = self
            .get_job(id)
            .await
            .map_err(fault)?
            .ok_or(QueueError::NotFound(id))?;
        if job.state != expected || !expected.can_transition_to(next) {
            return Err(QueueError::Conflict {
                id,
                expected,
                actual: job.state,
                requested: next,
            });
        }
        store::enter(&mut job, next);
        job.updated_at = now_millis();

        let last_error = error_json(job.last_error.as_ref()).map_err(fault)?;
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?1, attempt = ?2, progress_bytes = ?3, total_bytes = ?4,
                last_error_json = ?5, resume_pending = ?6, retry_at = ?7, updated_at = ?8
            WHERE id = ?9 AND state = ?10
            "#,
        )
        .bind(job.state.as_str())
        .bind(job.attempt as i64)
        .bind(job.progress_bytes as i64)
        .bind(job.total_bytes.map(|t| t as i64))
        .bind(last_error)
        .bind(job.resume_pending as i64)
        .bind(job.retry_at)
        .bind(job.updated_at)
        .bind(id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(fault)?;

        if result.rows_affected() == 0 {
            // Changed between the read and the write.
            let actual = match self.get_job(id).await.map_err(fault)? {
                Some(current) => current.state,
                None => return Err(QueueError::NotFound(id)),
            };
            return Err(QueueError::Conflict {
                id,
                expected,
                actual,
                requested: next,
            });
        }
        Ok(job)
    }

    /// Failed -> Queued for every failed job. Returns the ids requeued.
    pub async fn retry_failed(&self) -> QueueResult<Vec<JobId>> {
        let mut ids = Vec::new();
        for job in self.list(Some(JobState::Failed)).await.map_err(fault)? {
            match self.transition(job.id, JobState::Failed, JobState::Queued).await {
                Ok(_) => ids.push(job.id),
                Err(QueueError::Conflict { .. } | QueueError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(ids)
    }

    /// Requeue rows left Active by a process that did not exit cleanly.
    /// The attempt counter is kept; the next admission continues it.
    pub async fn recover_active_jobs(&self) -> Result<u64> {
        let now = now_millis();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?1, resume_pending = 1, updated_at = ?2
            WHERE state = ?3
            "#,
        )
        .bind(JobState::Queued.as_str())
        .bind(now)
        .bind(JobState::Active.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
