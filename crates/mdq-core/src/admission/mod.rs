//! Admission controller: moves Queued jobs to Active under the slot cap.
//!
//! There is no polling loop. A pass runs when something can change the
//! answer: a submission, a resume or retry, a worker releasing its slot, or
//! the backoff timer firing for the earliest delayed job. Passes are
//! serialized, so two passes never race for the same Queued job.

mod budget;
mod guard;

pub use budget::SlotBudget;
pub use guard::SlotGuard;

use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::engine::Shared;
use crate::error::QueueError;
use crate::job::{now_millis, JobError, JobState, Stage};
use crate::storage;
use crate::worker;

/// Delay before retrying a job whose worker could not be prepared.
const START_RETRY_MS: i64 = 1_000;

pub(crate) struct Admission {
    budget: Arc<SlotBudget>,
    pass: Mutex<()>,
    idle: Notify,
    timer: Mutex<Option<(i64, JoinHandle<()>)>>,
}

impl Admission {
    pub(crate) fn new(max_active: usize) -> Self {
        Self {
            budget: SlotBudget::new(max_active),
            pass: Mutex::new(()),
            idle: Notify::new(),
            timer: Mutex::new(None),
        }
    }

    pub(crate) fn budget(&self) -> &Arc<SlotBudget> {
        &self.budget
    }

    fn timer(&self) -> MutexGuard<'_, Option<(i64, JoinHandle<()>)>> {
        self.timer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.timer().take() {
            handle.abort();
        }
    }
}

/// One admission pass over the Queued jobs, oldest first.
pub(crate) fn admit(shared: &Arc<Shared>) {
    let _pass = shared
        .admission
        .pass
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    let now = now_millis();
    let queued = match shared.store.list_by_state(JobState::Queued) {
        Ok(q) => q,
        Err(e) => {
            tracing::warn!(error = %e, "admission pass skipped");
            return;
        }
    };

    let mut started = 0usize;
    for job in queued {
        if !job.is_admissible(now) {
            continue;
        }
        let Some(slot) = shared.admission.budget.try_acquire() else {
            break;
        };
        // Registered before the job becomes Active so a pause issued right
        // after admission always finds the token.
        let token = shared.control.register(job.id);
        let admitted = match shared.store.start_attempt(job.id) {
            Ok(a) => a,
            Err(QueueError::Conflict { .. } | QueueError::NotFound(_)) => {
                // Paused, cancelled or removed since the listing.
                shared.control.unregister_token(job.id, &token);
                continue;
            }
            Err(e) => {
                shared.control.unregister_token(job.id, &token);
                tracing::warn!(job_id = job.id, error = %e, "admission failed");
                break;
            }
        };

        if let Err(e) = storage::prepare_staging_dir(&shared.config.staging_dir) {
            tracing::warn!(
                job_id = job.id,
                dir = %shared.config.staging_dir.display(),
                error = %e,
                "cannot prepare staging directory; job requeued"
            );
            let err = JobError::transient(Stage::Start, e.to_string());
            if let Err(e) =
                shared
                    .store
                    .abort_start(job.id, admitted.resumed, err, Some(now + START_RETRY_MS))
            {
                tracing::warn!(job_id = job.id, error = %e, "rollback of admission failed");
            }
            shared.control.unregister_token(job.id, &token);
            drop(slot);
            break;
        }

        tracing::debug!(
            job_id = job.id,
            attempt = admitted.job.attempt,
            resumed = admitted.resumed,
            "admitted"
        );
        worker::spawn(Arc::clone(shared), admitted, token, slot);
        started += 1;
    }

    if started > 0 {
        tracing::debug!(
            started,
            in_use = shared.admission.budget.in_use(),
            max = shared.admission.budget.max(),
            "admission pass"
        );
    }
    schedule_wakeup(shared, now);
    shared.admission.idle.notify_waiters();
}

/// Arm the single backoff timer for the earliest delayed Queued job.
fn schedule_wakeup(shared: &Arc<Shared>, now: i64) {
    let next = match shared.store.next_retry_at(now) {
        Ok(Some(at)) => at,
        _ => return,
    };
    let mut timer = shared.admission.timer();
    if let Some((at, handle)) = timer.as_ref() {
        if *at <= next && !handle.is_finished() {
            return;
        }
        handle.abort();
    }

    let weak = Arc::downgrade(shared);
    let delay = Duration::from_millis(next.saturating_sub(now).max(0) as u64);
    let handle = shared.runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(shared) = weak.upgrade() {
            {
                let mut timer = shared.admission.timer();
                if timer.as_ref().is_some_and(|(at, _)| *at == next) {
                    timer.take();
                }
            }
            admit(&shared);
        }
    });
    *timer = Some((next, handle));
}

/// Resolves once no job is Active and none is waiting in Queued (delayed
/// retries included).
pub(crate) async fn wait_idle(shared: &Shared) {
    loop {
        let mut notified = pin!(shared.admission.idle.notified());
        notified.as_mut().enable();
        let queued = shared.store.count(JobState::Queued).unwrap_or(0);
        if shared.admission.budget.in_use() == 0 && queued == 0 {
            return;
        }
        notified.await;
    }
}
