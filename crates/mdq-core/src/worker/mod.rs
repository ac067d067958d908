//! Worker: runs one admitted job through fetch, postprocess and finalize.
//!
//! A worker owns its job from admission until the job leaves Active. It gets
//! the job snapshot by value at spawn time and never looks a job up by any
//! other id. Blocking stages run on the blocking pool; the store lock is
//! never held across them.

mod sink;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::admission::{self, SlotGuard};
use crate::control::{ControlToken, Signal};
use crate::destination::resolve_desired;
use crate::engine::Shared;
use crate::events::ProgressThrottle;
use crate::fetch::FetchError;
use crate::job::{now_millis, Job, JobError, Stage};
use crate::postprocess::PostprocessRequest;
use crate::retry::{run_with_retry, RetryDecision, Retryable};
use crate::storage::{self, FinalizeError, StagingFile};
use crate::store::Admitted;

use self::sink::StagingSink;

/// How an execution ended, before it is recorded on the job.
#[derive(Debug)]
enum Outcome {
    Completed(PathBuf),
    Interrupted(Signal),
    Failed(JobError),
}

/// Start the worker task for an admitted job. The slot is released when the
/// task ends.
pub(crate) fn spawn(
    shared: Arc<Shared>,
    admitted: Admitted,
    token: Arc<ControlToken>,
    slot: SlotGuard,
) {
    let runtime = shared.runtime.clone();
    runtime.spawn(run(shared, admitted, token, slot));
}

async fn run(shared: Arc<Shared>, admitted: Admitted, token: Arc<ControlToken>, slot: SlotGuard) {
    let Admitted { job, resumed } = admitted;
    let outcome = execute(&shared, &job, resumed, &token).await;
    settle(&shared, &job, &token, outcome);
    shared.control.unregister_token(job.id, &token);
    drop(slot);
    token.mark_exited();
    admission::admit(&shared);
}

async fn execute(shared: &Arc<Shared>, job: &Job, resumed: bool, token: &Arc<ControlToken>) -> Outcome {
    if let Some(signal) = token.pending() {
        return Outcome::Interrupted(signal);
    }

    let staged = storage::staging_path(&shared.config.staging_dir, job.id);
    match fetch(shared, job, resumed, token, &staged).await {
        Ok(()) => {}
        Err(FetchError::Interrupted(signal)) => return Outcome::Interrupted(signal),
        Err(e) => {
            tracing::warn!(job_id = job.id, attempt = job.attempt, error = %e, "fetch failed");
            return Outcome::Failed(JobError::new(e.failure_kind(), Stage::Fetch, e.to_string()));
        }
    }

    if let Some(signal) = token.pending() {
        return Outcome::Interrupted(signal);
    }
    let desired = resolve_desired(&job.destination, &shared.config.library_dir, &job.source);
    let processed = match postprocess(shared, job, &staged, &desired).await {
        Ok(path) => path,
        Err(err) => return Outcome::Failed(err),
    };

    if let Err(signal) = token.commit() {
        return Outcome::Interrupted(signal);
    }
    let finalizer = Arc::clone(shared);
    let result =
        tokio::task::spawn_blocking(move || finalize(&finalizer, &processed, &desired)).await;
    match result {
        Ok(Ok(path)) => Outcome::Completed(path),
        Ok(Err(e)) => {
            tracing::warn!(job_id = job.id, error = %e, "finalize failed");
            Outcome::Failed(JobError::new(e.failure_kind(), Stage::Finalize, e.to_string()))
        }
        Err(e) => Outcome::Failed(JobError::permanent(
            Stage::Finalize,
            format!("finalize task failed: {}", e),
        )),
    }
}

/// Stream the source into the staging file, continuing a paused attempt
/// from its recorded offset.
async fn fetch(
    shared: &Arc<Shared>,
    job: &Job,
    resumed: bool,
    token: &Arc<ControlToken>,
    staged: &Path,
) -> Result<(), FetchError> {
    let resume_from = if resumed { job.progress_bytes } else { 0 };
    let known_total = job.total_bytes;
    let id = job.id;
    let source = job.source.clone();
    let path = staged.to_path_buf();
    let transport = Arc::clone(&shared.transport);
    let store = shared.store.clone();
    let token = Arc::clone(token);
    let chunk_size = shared.config.chunk_size;
    let throttle = ProgressThrottle::new(
        shared.config.progress_every_bytes,
        shared.config.progress_interval,
    );

    let task = tokio::task::spawn_blocking(move || -> Result<(), FetchError> {
        let file = StagingFile::open(&path, resume_from).map_err(FetchError::Storage)?;
        let offset = file.len();
        if resume_from > 0 && known_total == Some(offset) {
            tracing::debug!(job_id = id, bytes = offset, "staged file already complete");
            return Ok(());
        }
        if offset > 0 {
            tracing::info!(job_id = id, offset, "resuming fetch");
        }
        let mut sink = StagingSink::new(id, store, token, file, throttle);
        let result = transport.fetch(&source, offset, chunk_size, &mut sink);
        let flushed = sink.finish(result.is_ok());
        result?;
        flushed.map_err(FetchError::Storage)
    });
    match task.await {
        Ok(result) => result,
        Err(e) => Err(FetchError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("fetch task failed: {}", e),
        ))),
    }
}

/// Run the postprocessor, retrying transient failures in place. Whatever
/// still fails afterwards is permanent: the bytes are already here.
async fn postprocess(
    shared: &Arc<Shared>,
    job: &Job,
    staged: &Path,
    desired: &Path,
) -> Result<PathBuf, JobError> {
    let postprocessor = Arc::clone(&shared.postprocessor);
    let policy = shared.config.postprocess_retry;
    let input = staged.to_path_buf();
    let output = storage::postprocess_output_path(&shared.config.staging_dir, job.id, desired);
    let hints = job.hints.clone();
    let id = job.id;

    let task = tokio::task::spawn_blocking(move || {
        run_with_retry(&policy, |attempt| {
            if attempt > 1 {
                tracing::info!(job_id = id, attempt, "retrying postprocess");
            }
            postprocessor.process(&PostprocessRequest {
                input: &input,
                output: &output,
                hints: &hints,
            })
        })
    });
    match task.await {
        Ok(Ok(path)) => Ok(path),
        Ok(Err(e)) => {
            tracing::warn!(job_id = job.id, error = %e, "postprocess failed");
            Err(JobError::permanent(Stage::Postprocess, e.to_string()))
        }
        Err(e) => Err(JobError::permanent(
            Stage::Postprocess,
            format!("postprocess task failed: {}", e),
        )),
    }
}

/// Pick a free destination and move the file there. Serialized across
/// workers so two jobs never pick the same name.
fn finalize(shared: &Shared, file: &Path, desired: &Path) -> Result<PathBuf, FinalizeError> {
    let _guard = shared
        .finalize_lock
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    let target = shared
        .resolver
        .resolve(desired)
        .map_err(|source| FinalizeError::Resolve {
            path: desired.to_path_buf(),
            source,
        })?;
    storage::move_into_place(file, &target)?;
    Ok(target)
}

/// Record the outcome on the job and clean up staging. A pause or cancel
/// requested before a failure is recorded wins over the failure.
fn settle(shared: &Shared, job: &Job, token: &ControlToken, outcome: Outcome) {
    let id = job.id;
    let outcome = match outcome {
        Outcome::Failed(err) => match token.commit() {
            Ok(()) => Outcome::Failed(err),
            Err(signal) => {
                tracing::debug!(job_id = id, error = %err, "failure superseded by {}", signal);
                Outcome::Interrupted(signal)
            }
        },
        other => other,
    };
    let recorded = match outcome {
        Outcome::Completed(path) => {
            discard(shared, job);
            tracing::info!(job_id = id, path = %path.display(), "job completed");
            shared.store.complete(id, path)
        }
        Outcome::Interrupted(Signal::Pause) => {
            tracing::info!(job_id = id, "job paused");
            shared.store.pause_active(id)
        }
        Outcome::Interrupted(Signal::Cancel) => {
            discard(shared, job);
            tracing::info!(job_id = id, "job cancelled");
            shared.store.cancel_active(id)
        }
        Outcome::Failed(err) => {
            discard(shared, job);
            match shared.config.retry.decide(job.attempt, err.kind) {
                RetryDecision::RetryAfter(delay) => {
                    tracing::info!(
                        job_id = id,
                        attempt = job.attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "job requeued"
                    );
                    let retry_at = now_millis() + delay.as_millis() as i64;
                    shared.store.requeue(id, err, Some(retry_at))
                }
                RetryDecision::NoRetry => {
                    tracing::warn!(job_id = id, attempt = job.attempt, error = %err, "job failed");
                    shared.store.fail(id, err)
                }
            }
        }
    };
    if let Err(e) = recorded {
        tracing::warn!(job_id = id, error = %e, "could not record job outcome");
    }
}

fn discard(shared: &Shared, job: &Job) {
    if let Err(e) = storage::discard_staging(&shared.config.staging_dir, job.id) {
        tracing::warn!(job_id = job.id, error = %e, "staging cleanup failed");
    }
}
