//! `mdq run` – execute the queue until it drains (or, with `--watch`,
//! until interrupted), serving control commands meanwhile.

use anyhow::{bail, Result};
use mdq_core::config::MdqConfig;
use mdq_core::events::ProgressStats;
use mdq_core::{
    Engine, EngineConfig, EventKind, JobEvent, JobId, JobState, PersistenceMirror, QueueDb,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::cli::commands::status::human_bytes;
use crate::cli::control_socket;

const PROGRESS_PRINT_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run_queue(
    db: &QueueDb,
    cfg: &MdqConfig,
    max_active: Option<usize>,
    watch: bool,
) -> Result<()> {
    let socket_path = control_socket::default_socket_path()?;
    if control_socket::is_live(&socket_path).await {
        bail!(
            "another `mdq run` is already serving {}",
            socket_path.display()
        );
    }

    let recovered = db.recover_active_jobs().await?;
    if recovered > 0 {
        tracing::info!("recovered {} job(s) from previous run", recovered);
    }

    let mut engine_cfg = EngineConfig::from_config(cfg)?;
    if let Some(n) = max_active {
        engine_cfg.max_active = n.max(1);
    }
    let engine = Engine::builder(engine_cfg)
        .restore(db.load_all().await?, db.next_id().await?)
        .build()?;
    let mirror = PersistenceMirror::spawn(&engine, db.clone());
    let console = engine.subscribe_with(console_printer());
    let listener = control_socket::spawn_control_listener(engine.clone(), &socket_path)?;
    tracing::debug!(path = %socket_path.display(), "control socket listening");

    engine.start();
    let interrupted = if watch {
        println!("Watching queue; Ctrl-C to stop.");
        tokio::signal::ctrl_c().await?;
        true
    } else {
        tokio::select! {
            _ = engine.wait_idle() => false,
            r = tokio::signal::ctrl_c() => { r?; true }
        }
    };

    listener.abort();
    let _ = std::fs::remove_file(&socket_path);
    let active = engine.active_count();
    mirror.shutdown().await?;
    console.abort();

    let jobs = engine.list(None)?;
    let count = |s: JobState| jobs.iter().filter(|j| j.state == s).count();
    println!(
        "{} completed, {} failed, {} cancelled, {} paused, {} queued",
        count(JobState::Completed),
        count(JobState::Failed),
        count(JobState::Cancelled),
        count(JobState::Paused),
        count(JobState::Queued)
    );
    if interrupted && active > 0 {
        println!("{} active job(s) will continue on the next run.", active);
    }
    tracing::info!(interrupted, active, "run finished");
    Ok(())
}

/// Event handler printing state changes and, at most every half second per
/// job, transfer progress.
fn console_printer() -> impl FnMut(JobEvent) + Send + 'static {
    let mut started: HashMap<JobId, Instant> = HashMap::new();
    let mut last_print: HashMap<JobId, Instant> = HashMap::new();
    move |event: JobEvent| match event.kind {
        EventKind::State => {
            let id = event.job_id;
            match event.state {
                JobState::Active => {
                    started.insert(id, Instant::now());
                    println!("job {id}: active (attempt {})", event.attempt);
                }
                JobState::Failed | JobState::Queued if event.error.is_some() => {
                    started.remove(&id);
                    if let Some(err) = &event.error {
                        println!("job {id}: {} ({})", event.state, err);
                    }
                }
                state => {
                    started.remove(&id);
                    last_print.remove(&id);
                    println!("job {id}: {state}");
                }
            }
        }
        EventKind::Progress => {
            let now = Instant::now();
            let due = last_print
                .get(&event.job_id)
                .map_or(true, |t| now.duration_since(*t) >= PROGRESS_PRINT_INTERVAL);
            if !due {
                return;
            }
            last_print.insert(event.job_id, now);
            let elapsed = started
                .get(&event.job_id)
                .map_or(0.0, |t| now.duration_since(*t).as_secs_f64());
            let stats = ProgressStats {
                bytes_done: event.progress_bytes,
                total_bytes: event.total_bytes,
                elapsed_secs: elapsed,
            };
            println!("{}", progress_line(event.job_id, &stats));
        }
        EventKind::Removed => {}
    }
}

fn progress_line(id: JobId, stats: &ProgressStats) -> String {
    let pct = stats
        .fraction()
        .map(|f| format!("{:.1}%", f * 100.0))
        .unwrap_or_else(|| "?".to_string());
    let eta = stats
        .eta_secs()
        .map(|s| format!("{:.0}s", s))
        .unwrap_or_else(|| "?".to_string());
    format!(
        "job {id}: {} / {} ({pct})  {}/s  ETA {eta}",
        human_bytes(stats.bytes_done),
        stats
            .total_bytes
            .map(human_bytes)
            .unwrap_or_else(|| "?".to_string()),
        human_bytes(stats.bytes_per_sec() as u64),
    )
}
