//! `mdq add <source> <destination>` – queue a new job.

use anyhow::{bail, Result};
use mdq_core::{NewJob, QueueDb, TagHints};
use std::path::PathBuf;

use crate::cli::control_socket::{self, ControlReply, ControlRequest};

/// Hands the job to a running `mdq run` if there is one, so it starts right
/// away; otherwise it is stored for the next run.
pub async fn run_add(
    db: &QueueDb,
    source: &str,
    destination: PathBuf,
    hints: TagHints,
) -> Result<()> {
    let request = ControlRequest::Submit {
        source: source.to_string(),
        destination: destination.clone(),
        hints: hints.clone(),
    };
    let socket = control_socket::default_socket_path()?;
    let id = match control_socket::send(&socket, &request).await? {
        Some(ControlReply::Submitted { id }) => id,
        Some(ControlReply::Error { message }) => bail!(message),
        Some(other) => bail!("unexpected reply: {:?}", other),
        None => {
            db.insert_job(&NewJob::new(source, destination).with_hints(hints))
                .await?
        }
    };
    println!("Added job {id}: {source}");
    Ok(())
}
