//! `mdq pause|resume|cancel|retry|remove <id>` and `mdq cancel-all`.
//!
//! Sent to the running `mdq run` over the control socket when one is
//! listening; applied to the database otherwise.

use anyhow::{bail, Result};
use mdq_core::config::MdqConfig;
use mdq_core::{JobId, JobState, QueueDb};

use crate::cli::control_socket::{self, ControlReply, ControlRequest};
use crate::cli::offline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Pause,
    Resume,
    Cancel,
    Retry,
    Remove,
}

impl ControlAction {
    fn request(self, id: JobId) -> ControlRequest {
        match self {
            ControlAction::Pause => ControlRequest::Pause { id },
            ControlAction::Resume => ControlRequest::Resume { id },
            ControlAction::Cancel => ControlRequest::Cancel { id },
            ControlAction::Retry => ControlRequest::Retry { id },
            ControlAction::Remove => ControlRequest::Remove { id },
        }
    }

    fn verb(self) -> &'static str {
        match self {
            ControlAction::Pause => "pause",
            ControlAction::Resume => "resume",
            ControlAction::Cancel => "cancel",
            ControlAction::Retry => "retry",
            ControlAction::Remove => "remove",
        }
    }
}

pub async fn run_control(
    db: &QueueDb,
    cfg: &MdqConfig,
    action: ControlAction,
    id: JobId,
) -> Result<()> {
    let socket = control_socket::default_socket_path()?;
    let state = match control_socket::send(&socket, &action.request(id)).await? {
        Some(ControlReply::State { state, .. }) => state,
        Some(ControlReply::Error { message }) => bail!("{} job {}: {}", action.verb(), id, message),
        Some(other) => bail!("unexpected reply: {:?}", other),
        None => {
            let queue = offline::open(db, cfg)?;
            let result = match action {
                ControlAction::Pause => queue.pause(id).await,
                ControlAction::Resume => queue.resume(id).await,
                ControlAction::Cancel => queue.cancel(id).await,
                ControlAction::Retry => queue.retry(id).await,
                ControlAction::Remove => queue.remove(id).await,
            };
            match result {
                Ok(state) => state,
                Err(e) => bail!("{} job {}: {}", action.verb(), id, e),
            }
        }
    };
    if action == ControlAction::Remove {
        println!("Removed job {id} ({state})");
    } else {
        println!("Job {id}: {state}");
    }
    Ok(())
}

pub async fn run_cancel_all(db: &QueueDb, cfg: &MdqConfig) -> Result<()> {
    let socket = control_socket::default_socket_path()?;
    let jobs: Vec<(JobId, JobState)> =
        match control_socket::send(&socket, &ControlRequest::CancelAll).await? {
            Some(ControlReply::States { jobs }) => jobs,
            Some(ControlReply::Error { message }) => bail!("cancel all: {}", message),
            Some(other) => bail!("unexpected reply: {:?}", other),
            None => offline::open(db, cfg)?.cancel_all().await?,
        };
    if jobs.is_empty() {
        println!("No unfinished jobs.");
    }
    for (id, state) in jobs {
        println!("Job {id}: {state}");
    }
    Ok(())
}
