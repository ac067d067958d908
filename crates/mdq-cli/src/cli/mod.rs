//! CLI for the mdq download queue.

mod commands;
pub mod control_socket;
mod offline;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mdq_core::{config, JobId, JobState, QueueDb, TagHints};
use std::path::PathBuf;

use commands::{run_add, run_cancel_all, run_control, run_queue, run_status, ControlAction};

/// Top-level CLI for the mdq download queue.
#[derive(Debug, Parser)]
#[command(name = "mdq")]
#[command(about = "mdq: media download queue", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Queue a download.
    Add {
        /// URL or local path to fetch.
        source: String,
        /// Target file, or a directory (ending in `/`). Relative paths are
        /// placed under the configured library directory.
        destination: PathBuf,
        #[arg(long)]
        artist: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        album: Option<String>,
    },

    /// Execute queued jobs until the queue drains.
    Run {
        /// Override the configured number of concurrently active jobs.
        #[arg(long, value_name = "N")]
        max_active: Option<usize>,
        /// Keep running after the queue drains, accepting new jobs, until Ctrl-C.
        #[arg(long)]
        watch: bool,
    },

    /// Show jobs.
    Status {
        /// Only jobs in this state (queued, active, paused, completed, failed, cancelled).
        #[arg(long, value_name = "STATE")]
        state: Option<JobState>,
    },

    /// Pause a queued or active job, keeping its partial download.
    Pause { id: JobId },

    /// Put a paused job back in the queue.
    Resume { id: JobId },

    /// Cancel a job and discard its partial download.
    Cancel { id: JobId },

    /// Cancel every job that has not finished.
    CancelAll,

    /// Queue a failed job again with a fresh attempt budget.
    Retry { id: JobId },

    /// Remove a finished job from the queue.
    Remove { id: JobId },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let db = QueueDb::open_default().await?;

        match cli.command {
            CliCommand::Add {
                source,
                destination,
                artist,
                title,
                album,
            } => {
                let hints = TagHints {
                    artist,
                    title,
                    album,
                };
                run_add(&db, &source, destination, hints).await?
            }
            CliCommand::Run { max_active, watch } => run_queue(&db, &cfg, max_active, watch).await?,
            CliCommand::Status { state } => run_status(&db, state).await?,
            CliCommand::Pause { id } => run_control(&db, &cfg, ControlAction::Pause, id).await?,
            CliCommand::Resume { id } => run_control(&db, &cfg, ControlAction::Resume, id).await?,
            CliCommand::Cancel { id } => run_control(&db, &cfg, ControlAction::Cancel, id).await?,
            CliCommand::CancelAll => run_cancel_all(&db, &cfg).await?,
            CliCommand::Retry { id } => run_control(&db, &cfg, ControlAction::Retry, id).await?,
            CliCommand::Remove { id } => run_control(&db, &cfg, ControlAction::Remove, id).await?,
        }

        db.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
