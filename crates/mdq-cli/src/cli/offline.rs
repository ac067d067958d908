//! Control commands applied to the database when no `mdq run` is listening.
//!
//! Same outcomes as the engine's control API, expressed as compare-and-swap
//! transitions on the stored rows. Nothing is executing, so there is no
//! worker to signal: an Active row here is a leftover of a run that did not
//! exit cleanly.

use anyhow::Result;
use mdq_core::error::{QueueError, QueueResult};
use mdq_core::storage;
use mdq_core::{JobId, JobState, QueueDb};
use std::path::PathBuf;

pub struct OfflineQueue {
    db: QueueDb,
    staging_dir: PathBuf,
}

impl OfflineQueue {
    pub fn new(db: QueueDb, staging_dir: PathBuf) -> Self {
        Self { db, staging_dir }
    }

    async fn state_of(&self, id: JobId) -> QueueResult<JobState> {
        self.db
            .get_job(id)
            .await
            .map_err(|e| QueueError::SystemFault(e.to_string()))?
            .map(|job| job.state)
            .ok_or(QueueError::NotFound(id))
    }

    pub async fn pause(&self, id: JobId) -> QueueResult<JobState> {
        loop {
            let state = self.state_of(id).await?;
            if !matches!(state, JobState::Queued | JobState::Active) {
                return Ok(state);
            }
            match self.db.transition(id, state, JobState::Paused).await {
                Ok(job) => return Ok(job.state),
                Err(QueueError::Conflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn resume(&self, id: JobId) -> QueueResult<JobState> {
        let state = self.state_of(id).await?;
        match state {
            JobState::Paused => Ok(self
                .db
                .transition(id, JobState::Paused, JobState::Queued)
                .await?
                .state),
            JobState::Queued | JobState::Active => Ok(state),
            actual => Err(QueueError::Conflict {
                id,
                expected: JobState::Paused,
                actual,
                requested: JobState::Queued,
            }),
        }
    }

    pub async fn cancel(&self, id: JobId) -> QueueResult<JobState> {
        loop {
            let state = self.state_of(id).await?;
            if state.is_finished() {
                return Ok(state);
            }
            match self.db.transition(id, state, JobState::Cancelled).await {
                Ok(job) => {
                    self.discard(id);
                    return Ok(job.state);
                }
                Err(QueueError::Conflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn cancel_all(&self) -> QueueResult<Vec<(JobId, JobState)>> {
        let jobs = self
            .db
            .load_all()
            .await
            .map_err(|e| QueueError::SystemFault(e.to_string()))?;
        let mut touched = Vec::new();
        for job in jobs.into_iter().filter(|j| !j.state.is_finished()) {
            touched.push((job.id, self.cancel(job.id).await?));
        }
        Ok(touched)
    }

    pub async fn retry(&self, id: JobId) -> QueueResult<JobState> {
        let job = self
            .db
            .transition(id, JobState::Failed, JobState::Queued)
            .await?;
        self.discard(id);
        Ok(job.state)
    }

    pub async fn remove(&self, id: JobId) -> QueueResult<JobState> {
        let state = self.state_of(id).await?;
        if !state.is_finished() {
            return Err(QueueError::Conflict {
                id,
                expected: JobState::Completed,
                actual: state,
                requested: state,
            });
        }
        let deleted = self
            .db
            .delete(id)
            .await
            .map_err(|e| QueueError::SystemFault(e.to_string()))?;
        if !deleted {
            return Err(QueueError::NotFound(id));
        }
        self.discard(id);
        Ok(state)
    }

    fn discard(&self, id: JobId) {
        if let Err(e) = storage::discard_staging(&self.staging_dir, id) {
            tracing::warn!(job_id = id, error = %e, "staging cleanup failed");
        }
    }
}

/// Open the offline view used by control commands.
pub fn open(db: &QueueDb, cfg: &mdq_core::config::MdqConfig) -> Result<OfflineQueue> {
    Ok(OfflineQueue::new(db.clone(), cfg.staging_dir()?))
}
