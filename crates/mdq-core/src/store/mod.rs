//! In-memory queue store: the single source of truth for job records.
//!
//! Every mutation is a compare-and-swap on the job's current state. Callers
//! never receive a mutable reference; they get cloned snapshots. Each
//! successful mutation publishes one event while the store lock is held, so
//! observers see a job's events in mutation order.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{QueueError, QueueResult};
use crate::events::{JobEvent, Publisher};
use crate::job::{now_millis, Job, JobError, JobId, JobSnapshot, JobState, NewJob};

/// Result of a successful Queued -> Active admission.
#[derive(Debug, Clone)]
pub struct Admitted {
    pub job: JobSnapshot,
    /// The admission continued an interrupted attempt instead of starting one.
    pub resumed: bool,
}

struct StoreInner {
    jobs: BTreeMap<JobId, Job>,
    next_id: JobId,
}

/// Cloneable handle to the shared job table.
#[derive(Clone)]
pub struct QueueStore {
    inner: Arc<Mutex<StoreInner>>,
    publisher: Publisher,
}

impl QueueStore {
    pub fn new(publisher: Publisher) -> Self {
        Self::restore(publisher, Vec::new(), 1)
    }

    /// Build a store from persisted records. Jobs left Active by a crash are
    /// requeued with their attempt unchanged and marked for resumption.
    pub fn restore(publisher: Publisher, records: Vec<Job>, next_id: JobId) -> Self {
        let mut jobs = BTreeMap::new();
        let mut high = next_id.max(1);
        for mut job in records {
            if job.state == JobState::Active {
                job.state = JobState::Queued;
                job.resume_pending = true;
                job.updated_at = now_millis();
            }
            high = high.max(job.id + 1);
            jobs.insert(job.id, job);
        }
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                jobs,
                next_id: high,
            })),
            publisher,
        }
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    fn lock(&self) -> QueueResult<MutexGuard<'_, StoreInner>> {
        self.inner
            .lock()
            .map_err(|_| QueueError::SystemFault("queue store lock poisoned".into()))
    }

    /// Insert a new Queued job. Rejects empty source or destination.
    pub fn submit(&self, new: NewJob) -> QueueResult<JobId> {
        new.validate()?;
        let mut inner = self.lock()?;
        let id = inner.next_id;
        inner.next_id += 1;
        let job = Job::from_new(id, new, now_millis());
        self.publisher.publish(JobEvent::state_of(&job));
        inner.jobs.insert(id, job);
        Ok(id)
    }

    pub fn get(&self, id: JobId) -> QueueResult<JobSnapshot> {
        self.lock()?
            .jobs
            .get(&id)
            .cloned()
            .ok_or(QueueError::NotFound(id))
    }

    /// All jobs (or those in `filter`) in id order, which is submission order.
    pub fn list(&self, filter: Option<JobState>) -> QueueResult<Vec<JobSnapshot>> {
        Ok(self
            .lock()?
            .jobs
            .values()
            .filter(|j| filter.map_or(true, |s| j.state == s))
            .cloned()
            .collect())
    }

    pub fn list_by_state(&self, state: JobState) -> QueueResult<Vec<JobSnapshot>> {
        self.list(Some(state))
    }

    pub fn count(&self, state: JobState) -> QueueResult<usize> {
        Ok(self
            .lock()?
            .jobs
            .values()
            .filter(|j| j.state == state)
            .count())
    }

    pub fn len(&self) -> QueueResult<usize> {
        Ok(self.lock()?.jobs.len())
    }

    pub fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Id the next submission will receive.
    pub fn next_id(&self) -> QueueResult<JobId> {
        Ok(self.lock()?.next_id)
    }

    /// Earliest backoff deadline after `now` among Queued jobs.
    pub fn next_retry_at(&self, now: i64) -> QueueResult<Option<i64>> {
        Ok(self
            .lock()?
            .jobs
            .values()
            .filter(|j| j.state == JobState::Queued)
            .filter_map(|j| j.retry_at)
            .filter(|&at| at > now)
            .min())
    }

    /// Compare-and-swap the state of `id` from `expected` to `next`.
    pub fn transition(
        &self,
        id: JobId,
        expected: JobState,
        next: JobState,
    ) -> QueueResult<JobSnapshot> {
        self.mutate(id, expected, next, |_| {})
    }

    /// Queued -> Active. Starts a fresh attempt unless the job was interrupted
    /// by a pause or a crash, in which case the current attempt continues.
    pub fn start_attempt(&self, id: JobId) -> QueueResult<Admitted> {
        let mut inner = self.lock()?;
        let job = checked_mut(&mut inner, id, JobState::Queued, JobState::Active)?;
        let resumed = job.resume_pending;
        enter(job, JobState::Active);
        job.updated_at = now_millis();
        self.publisher.publish(JobEvent::state_of(job));
        Ok(Admitted {
            job: job.clone(),
            resumed,
        })
    }

    /// Undo an admission whose worker could not start.
    pub fn abort_start(
        &self,
        id: JobId,
        resumed: bool,
        err: JobError,
        retry_at: Option<i64>,
    ) -> QueueResult<JobSnapshot> {
        self.mutate(id, JobState::Active, JobState::Queued, |job| {
            if resumed {
                job.resume_pending = true;
            } else {
                job.attempt = job.attempt.saturating_sub(1);
            }
            job.last_error = Some(err);
            job.retry_at = retry_at;
        })
    }

    /// Record where the transfer starts and the expected size. Progress
    /// stays monotone within an attempt: a stream that restarts below the
    /// recorded count (a source that refused to resume) only moves it again
    /// once it passes that count.
    pub fn begin_transfer(
        &self,
        id: JobId,
        offset: u64,
        total: Option<u64>,
    ) -> QueueResult<JobSnapshot> {
        let mut inner = self.lock()?;
        let job = active_mut(&mut inner, id)?;
        let recorded = job.progress_bytes.max(offset);
        job.total_bytes = total;
        job.progress_bytes = total.map_or(recorded, |t| recorded.min(t));
        job.updated_at = now_millis();
        self.publisher.publish(JobEvent::progress_of(job));
        Ok(job.clone())
    }

    /// Move the progress counters forward. Ignored unless the job is Active;
    /// progress never decreases and never exceeds a known total.
    pub fn update_progress(&self, id: JobId, done: u64, total: Option<u64>) -> QueueResult<()> {
        let mut inner = self.lock()?;
        let job = inner.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        if job.state != JobState::Active {
            return Ok(());
        }
        let total = total.or(job.total_bytes);
        let capped = total.map_or(done, |t| done.min(t));
        let progress = job.progress_bytes.max(capped);
        if progress == job.progress_bytes && total == job.total_bytes {
            return Ok(());
        }
        job.progress_bytes = progress;
        job.total_bytes = total;
        job.updated_at = now_millis();
        self.publisher.publish(JobEvent::progress_of(job));
        Ok(())
    }

    /// Active -> Queued after a retryable failure. The next admission starts
    /// a new attempt from zero bytes.
    pub fn requeue(
        &self,
        id: JobId,
        err: JobError,
        retry_at: Option<i64>,
    ) -> QueueResult<JobSnapshot> {
        self.mutate(id, JobState::Active, JobState::Queued, |job| {
            job.progress_bytes = 0;
            job.total_bytes = None;
            job.last_error = Some(err);
            job.retry_at = retry_at;
        })
    }

    pub fn fail(&self, id: JobId, err: JobError) -> QueueResult<JobSnapshot> {
        self.mutate(id, JobState::Active, JobState::Failed, |job| {
            job.last_error = Some(err);
        })
    }

    /// Active -> Completed with the path the file was actually written to.
    pub fn complete(&self, id: JobId, final_path: PathBuf) -> QueueResult<JobSnapshot> {
        self.mutate(id, JobState::Active, JobState::Completed, |job| {
            job.destination = final_path;
            job.last_error = None;
            if let Some(total) = job.total_bytes {
                job.progress_bytes = job.progress_bytes.max(total);
            }
        })
    }

    /// Active -> Paused; partial bytes are kept for resumption.
    pub fn pause_active(&self, id: JobId) -> QueueResult<JobSnapshot> {
        self.transition(id, JobState::Active, JobState::Paused)
    }

    pub fn cancel_active(&self, id: JobId) -> QueueResult<JobSnapshot> {
        self.transition(id, JobState::Active, JobState::Cancelled)
    }

    /// Failed -> Queued with a clean slate: attempt counter and progress reset.
    pub fn retry(&self, id: JobId) -> QueueResult<JobSnapshot> {
        self.transition(id, JobState::Failed, JobState::Queued)
    }

    /// Delete a finished job. Queued, Active and Paused jobs cannot be removed.
    pub fn remove(&self, id: JobId) -> QueueResult<JobSnapshot> {
        let mut inner = self.lock()?;
        let job = inner.jobs.get(&id).ok_or(QueueError::NotFound(id))?;
        if !job.state.is_finished() {
            return Err(QueueError::Conflict {
                id,
                expected: JobState::Completed,
                actual: job.state,
                requested: job.state,
            });
        }
        let job = inner.jobs.remove(&id).ok_or(QueueError::NotFound(id))?;
        self.publisher.publish(JobEvent::removed(&job));
        Ok(job)
    }

    fn mutate<F>(
        &self,
        id: JobId,
        expected: JobState,
        next: JobState,
        f: F,
    ) -> QueueResult<JobSnapshot>
    where
        F: FnOnce(&mut Job),
    {
        let mut inner = self.lock()?;
        let job = checked_mut(&mut inner, id, expected, next)?;
        enter(job, next);
        f(job);
        job.updated_at = now_millis();
        self.publisher.publish(JobEvent::state_of(job));
        Ok(job.clone())
    }
}

fn checked_mut(
    inner: &mut StoreInner,
    id: JobId,
    expected: JobState,
    next: JobState,
) -> QueueResult<&mut Job> {
    let job = inner.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
    if job.state != expected || !expected.can_transition_to(next) {
        return Err(QueueError::Conflict {
            id,
            expected,
            actual: job.state,
            requested: next,
        });
    }
    Ok(job)
}

fn active_mut(inner: &mut StoreInner, id: JobId) -> QueueResult<&mut Job> {
    let job = inner.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
    if job.state != JobState::Active {
        return Err(QueueError::Conflict {
            id,
            expected: JobState::Active,
            actual: job.state,
            requested: JobState::Active,
        });
    }
    Ok(job)
}

/// Per-edge bookkeeping shared by every transition.
pub(crate) fn enter(job: &mut Job, next: JobState) {
    use JobState::*;
    match (job.state, next) {
        (Queued, Active) => {
            if job.resume_pending {
                job.resume_pending = false;
            } else {
                job.attempt += 1;
                job.progress_bytes = 0;
                job.total_bytes = None;
            }
            job.retry_at = None;
        }
        (Active, Queued) => job.resume_pending = false,
        (Active, Paused) => job.resume_pending = true,
        (Queued, Paused) => job.retry_at = None,
        (Failed, Queued) => {
            job.attempt = 0;
            job.progress_bytes = 0;
            job.total_bytes = None;
            job.last_error = None;
            job.retry_at = None;
            job.resume_pending = false;
        }
        (_, Cancelled) => {
            job.resume_pending = false;
            job.retry_at = None;
        }
        _ => {}
    }
    job.state = next;
}

#[cfg(test)]
mod tests;
