//! Event-driven persistence: keeps the database in step with an engine.
//!
//! The mirror coalesces bursts of events per job and writes the engine's
//! current snapshot rather than replaying each event, so a slow disk only
//! costs write frequency, never correctness of the final row.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::QueueDb;
use crate::engine::Engine;
use crate::error::QueueError;
use crate::events::Subscription;
use crate::job::JobId;

pub struct PersistenceMirror;

impl PersistenceMirror {
    /// Subscribe to `engine` and start writing its jobs to `db`. The
    /// subscription is taken before this returns, so no later mutation is
    /// missed. Must be called from within a Tokio runtime.
    pub fn spawn(engine: &Engine, db: QueueDb) -> MirrorHandle {
        let sub = engine.subscribe();
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run(engine.clone(), db, sub, stop_rx));
        MirrorHandle {
            stop: stop_tx,
            task,
        }
    }
}

/// Running mirror task.
pub struct MirrorHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
}

impl MirrorHandle {
    /// Write everything buffered so far and stop.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.stop.send(true);
        self.task.await.context("persistence mirror task panicked")?
    }
}

async fn run(
    engine: Engine,
    db: QueueDb,
    sub: Subscription,
    mut stop: watch::Receiver<bool>,
) -> Result<()> {
    let jobs = engine.list(None)?;
    for job in &jobs {
        db.upsert(job).await?;
    }
    tracing::debug!(jobs = jobs.len(), "queue database synced");

    let mut pending = BTreeSet::new();
    loop {
        tokio::select! {
            event = sub.recv() => {
                let Some(event) = event else { break };
                pending.insert(event.job_id);
                while let Some(event) = sub.try_recv() {
                    pending.insert(event.job_id);
                }
                flush(&engine, &db, &mut pending).await;
            }
            _ = stop.changed() => break,
        }
    }

    while let Some(event) = sub.try_recv() {
        pending.insert(event.job_id);
    }
    flush(&engine, &db, &mut pending).await;
    if sub.dropped() > 0 {
        tracing::debug!(dropped = sub.dropped(), "mirror skipped coalesced progress events");
    }
    Ok(())
}

async fn flush(engine: &Engine, db: &QueueDb, pending: &mut BTreeSet<JobId>) {
    for id in std::mem::take(pending) {
        let written = match engine.get(id) {
            Ok(job) => db.upsert(&job).await,
            Err(QueueError::NotFound(_)) => db.delete(id).await.map(|_| ()),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = written {
            tracing::warn!(job_id = id, error = %e, "could not persist job");
        }
    }
}
