//! Job control for pause/cancel: shared signal tokens per running job.
//!
//! Each Active job is registered with a `ControlToken` before its worker is
//! spawned. A control call sets the signal; the worker checks it at its
//! checkpoints (between chunks, before postprocess, before finalize) and
//! stops cooperatively. Nothing is ever killed mid-write.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::watch;

use crate::job::JobId;

/// Stop request delivered to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Stop and keep partial bytes.
    Pause,
    /// Stop and discard partial bytes.
    Cancel,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Pause => write!(f, "paused by user"),
            Signal::Cancel => write!(f, "cancelled by user"),
        }
    }
}

const NONE: u8 = 0;
const PAUSE: u8 = 1;
const CANCEL: u8 = 2;
const COMMITTED: u8 = 3;

/// Outcome of [`ControlToken::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The signal is now pending for the worker.
    Delivered,
    /// The worker already committed to finalize; the job will complete.
    Committed,
}

/// Per-job control signal plus an exit notification for the waiting caller.
#[derive(Debug)]
pub struct ControlToken {
    signal: AtomicU8,
    exited: watch::Sender<bool>,
}

impl Default for ControlToken {
    fn default() -> Self {
        Self {
            signal: AtomicU8::new(NONE),
            exited: watch::Sender::new(false),
        }
    }
}

impl ControlToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Cancel overrides a pending Pause; nothing overrides
    /// a commit.
    pub fn request(&self, signal: Signal) -> RequestOutcome {
        let want = match signal {
            Signal::Pause => PAUSE,
            Signal::Cancel => CANCEL,
        };
        let mut cur = self.signal.load(Ordering::Acquire);
        loop {
            match cur {
                COMMITTED => return RequestOutcome::Committed,
                CANCEL => return RequestOutcome::Delivered,
                PAUSE if want == PAUSE => return RequestOutcome::Delivered,
                _ => {}
            }
            match self
                .signal
                .compare_exchange(cur, want, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return RequestOutcome::Delivered,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Pending signal, if any. Checked by the worker at each checkpoint.
    pub fn pending(&self) -> Option<Signal> {
        match self.signal.load(Ordering::Acquire) {
            PAUSE => Some(Signal::Pause),
            CANCEL => Some(Signal::Cancel),
            _ => None,
        }
    }

    /// Worker commits to finalize, or to recording a failure. Fails with the
    /// pending signal if one arrived first.
    pub fn commit(&self) -> Result<(), Signal> {
        match self
            .signal
            .compare_exchange(NONE, COMMITTED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(CANCEL) => Err(Signal::Cancel),
            Err(PAUSE) => Err(Signal::Pause),
            Err(_) => Ok(()),
        }
    }

    pub fn is_committed(&self) -> bool {
        self.signal.load(Ordering::Acquire) == COMMITTED
    }

    /// Called by the worker once the job has left Active.
    pub fn mark_exited(&self) {
        self.exited.send_replace(true);
    }

    /// Wait until the worker holding this token has left Active.
    pub async fn wait_exit(&self) {
        let mut rx = self.exited.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|exited| *exited).await;
    }
}

/// Shared registry of job id -> control token for running jobs.
#[derive(Default)]
pub struct JobControl {
    jobs: RwLock<HashMap<JobId, Arc<ControlToken>>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job about to run; returns the token to hand to its worker.
    pub fn register(&self, job_id: JobId) -> Arc<ControlToken> {
        let token = Arc::new(ControlToken::new());
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id, Arc::clone(&token));
        token
    }

    /// Unregister a job (call when the worker leaves Active).
    pub fn unregister(&self, job_id: JobId) {
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&job_id);
    }

    /// Unregister only if `token` is still the one registered for `job_id`.
    /// A job that was resumed right after pausing may already hold a new one.
    pub fn unregister_token(&self, job_id: JobId, token: &Arc<ControlToken>) {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if jobs.get(&job_id).is_some_and(|t| Arc::ptr_eq(t, token)) {
            jobs.remove(&job_id);
        }
    }

    pub fn get(&self, job_id: JobId) -> Option<Arc<ControlToken>> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&job_id)
            .cloned()
    }

    /// Number of registered (running) jobs.
    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Default path for the control socket (same XDG state dir as the DB).
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("mdq")?.get_state_home();
    Ok(dir.join("mdq").join("control.sock"))
}
