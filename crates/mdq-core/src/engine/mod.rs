//! Queue engine: the explicit instance that owns a job queue and executes it.
//!
//! An [`Engine`] bundles the queue store, event publisher, control registry,
//! admission controller and the collaborators a worker calls. Callers hold
//! it (or a clone) instead of reaching for a global; several engines can run
//! side by side in one process.

mod builder;
mod config;

pub use builder::EngineBuilder;
pub use config::EngineConfig;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::admission::{self, Admission};
use crate::control::{JobControl, Signal};
use crate::destination::DestinationResolver;
use crate::error::{QueueError, QueueResult};
use crate::events::{JobEvent, Publisher, Subscription};
use crate::fetch::FetchTransport;
use crate::job::{JobId, JobSnapshot, JobState, NewJob, TagHints};
use crate::postprocess::Postprocessor;
use crate::storage;
use crate::store::QueueStore;

/// State shared by the engine handle, the admission controller and workers.
pub(crate) struct Shared {
    pub(crate) config: EngineConfig,
    pub(crate) store: QueueStore,
    pub(crate) control: JobControl,
    pub(crate) admission: Admission,
    pub(crate) transport: Arc<dyn FetchTransport>,
    pub(crate) postprocessor: Arc<dyn Postprocessor>,
    pub(crate) resolver: Arc<dyn DestinationResolver>,
    pub(crate) finalize_lock: Mutex<()>,
    pub(crate) runtime: tokio::runtime::Handle,
}

/// Handle to a running queue. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Run an admission pass. Needed once after building from restored
    /// records; submissions and control calls trigger passes themselves.
    pub fn start(&self) {
        admission::admit(&self.shared);
    }

    /// Queue a new job and admit it if a slot is free.
    pub fn submit(
        &self,
        source: impl Into<String>,
        destination: impl Into<PathBuf>,
        hints: TagHints,
    ) -> QueueResult<JobId> {
        self.submit_job(NewJob::new(source, destination).with_hints(hints))
    }

    pub fn submit_job(&self, new: NewJob) -> QueueResult<JobId> {
        let id = self.shared.store.submit(new)?;
        tracing::debug!(job_id = id, "job submitted");
        admission::admit(&self.shared);
        Ok(id)
    }

    pub fn get(&self, id: JobId) -> QueueResult<JobSnapshot> {
        self.shared.store.get(id)
    }

    /// Jobs in submission order, optionally only those in `filter`.
    pub fn list(&self, filter: Option<JobState>) -> QueueResult<Vec<JobSnapshot>> {
        self.shared.store.list(filter)
    }

    /// Jobs currently holding a slot.
    pub fn active_count(&self) -> usize {
        self.shared.admission.budget().in_use()
    }

    pub fn max_active(&self) -> usize {
        self.shared.admission.budget().max()
    }

    /// Id the next submission will get.
    pub fn next_id(&self) -> QueueResult<JobId> {
        self.shared.store.next_id()
    }

    pub fn publisher(&self) -> &Publisher {
        self.shared.store.publisher()
    }

    /// Subscribe with the configured buffer size.
    pub fn subscribe(&self) -> Subscription {
        self.publisher().subscribe(self.shared.config.event_buffer)
    }

    /// Call `handler` for every event on a dedicated task.
    pub fn subscribe_with<F>(&self, handler: F) -> tokio::task::JoinHandle<()>
    where
        F: FnMut(JobEvent) + Send + 'static,
    {
        let _enter = self.shared.runtime.enter();
        self.publisher()
            .subscribe_with(self.shared.config.event_buffer, handler)
    }

    /// Resolves when nothing is Active or Queued.
    pub async fn wait_idle(&self) {
        admission::wait_idle(&self.shared).await
    }

    /// Pause a job. Queued jobs pause at once; an Active job stops at its
    /// next checkpoint, keeping its partial bytes. Returns the resulting
    /// state (Completed if the job had already committed to finalize).
    pub async fn pause(&self, id: JobId) -> QueueResult<JobState> {
        self.interrupt(id, Signal::Pause).await
    }

    /// Cancel a job and discard its partial bytes. Cancelling a finished job
    /// reports its state without error.
    pub async fn cancel(&self, id: JobId) -> QueueResult<JobState> {
        self.interrupt(id, Signal::Cancel).await
    }

    async fn interrupt(&self, id: JobId, signal: Signal) -> QueueResult<JobState> {
        let store = &self.shared.store;
        loop {
            let job = store.get(id)?;
            let direct = match (job.state, signal) {
                (JobState::Queued, Signal::Pause) => Some(JobState::Paused),
                (JobState::Queued | JobState::Paused, Signal::Cancel) => Some(JobState::Cancelled),
                (JobState::Active, _) => None,
                (state, _) => return Ok(state),
            };
            match direct {
                Some(next) => match store.transition(id, job.state, next) {
                    Ok(job) => {
                        if next == JobState::Cancelled {
                            self.discard(id);
                        }
                        tracing::info!(job_id = id, state = %job.state, "job {}", signal_verb(signal));
                        // Wakes idle waiters; the job may have been the last Queued one.
                        admission::admit(&self.shared);
                        return Ok(job.state);
                    }
                    // Admitted or changed concurrently; look again.
                    Err(QueueError::Conflict { .. }) => continue,
                    Err(e) => return Err(e),
                },
                None => {
                    let Some(token) = self.shared.control.get(id) else {
                        tokio::task::yield_now().await;
                        continue;
                    };
                    token.request(signal);
                    token.wait_exit().await;
                    match store.get(id)?.state {
                        // Requeued by a failure that won the race, or already
                        // admitted again; act on the new state.
                        JobState::Queued | JobState::Active => continue,
                        state => return Ok(state),
                    }
                }
            }
        }
    }

    /// Paused -> Queued. Queued or Active jobs are reported unchanged; a
    /// finished job cannot be resumed.
    pub async fn resume(&self, id: JobId) -> QueueResult<JobState> {
        let store = &self.shared.store;
        loop {
            let job = store.get(id)?;
            match job.state {
                JobState::Paused => match store.transition(id, JobState::Paused, JobState::Queued) {
                    Ok(_) => {
                        tracing::info!(job_id = id, "job resumed");
                        admission::admit(&self.shared);
                        return Ok(store.get(id)?.state);
                    }
                    Err(QueueError::Conflict { .. }) => continue,
                    Err(e) => return Err(e),
                },
                JobState::Queued | JobState::Active => return Ok(job.state),
                actual => {
                    return Err(QueueError::Conflict {
                        id,
                        expected: JobState::Paused,
                        actual,
                        requested: JobState::Queued,
                    })
                }
            }
        }
    }

    /// Cancel every job that has not finished. Returns the jobs it touched
    /// with their resulting states.
    pub async fn cancel_all(&self) -> QueueResult<Vec<(JobId, JobState)>> {
        let store = &self.shared.store;
        let mut touched = Vec::new();
        // Waiting jobs first, so finishing workers have nothing to admit.
        for job in store.list(None)? {
            if matches!(job.state, JobState::Queued | JobState::Paused) {
                touched.push((job.id, self.cancel(job.id).await?));
            }
        }
        let mut tokens = Vec::new();
        for job in store.list(Some(JobState::Active))? {
            if let Some(token) = self.shared.control.get(job.id) {
                token.request(Signal::Cancel);
                tokens.push((job.id, token));
            }
        }
        for (id, token) in tokens {
            token.wait_exit().await;
            touched.push((id, store.get(id)?.state));
        }
        // Anything admitted or submitted meanwhile.
        for job in store.list(None)? {
            if !job.state.is_finished() {
                touched.push((job.id, self.cancel(job.id).await?));
            }
        }
        Ok(touched)
    }

    /// Failed -> Queued with the attempt counter reset.
    pub fn retry(&self, id: JobId) -> QueueResult<JobState> {
        let job = self.shared.store.retry(id)?;
        tracing::info!(job_id = id, "job queued for retry");
        self.discard(id);
        admission::admit(&self.shared);
        Ok(self.shared.store.get(id).map(|j| j.state).unwrap_or(job.state))
    }

    /// Delete a finished job from the queue.
    pub fn remove(&self, id: JobId) -> QueueResult<JobSnapshot> {
        let job = self.shared.store.remove(id)?;
        self.discard(id);
        Ok(job)
    }

    fn discard(&self, id: JobId) {
        if let Err(e) = storage::discard_staging(&self.shared.config.staging_dir, id) {
            tracing::warn!(job_id = id, error = %e, "staging cleanup failed");
        }
    }
}

fn signal_verb(signal: Signal) -> &'static str {
    match signal {
        Signal::Pause => "paused",
        Signal::Cancel => "cancelled",
    }
}
