//! `mdq status` – list jobs from the queue database.

use anyhow::Result;
use mdq_core::{Job, JobState, QueueDb};

pub async fn run_status(db: &QueueDb, filter: Option<JobState>) -> Result<()> {
    let jobs = db.list(filter).await?;
    if jobs.is_empty() {
        println!("No jobs in queue.");
        return Ok(());
    }
    println!(
        "{:<6} {:<10} {:<4} {:<18} {}",
        "ID", "STATE", "TRY", "PROGRESS", "SOURCE -> DESTINATION"
    );
    for job in &jobs {
        println!(
            "{:<6} {:<10} {:<4} {:<18} {} -> {}",
            job.id,
            job.state.as_str(),
            job.attempt,
            progress_cell(job),
            job.source,
            job.destination.display()
        );
        if let Some(err) = &job.last_error {
            println!("       last error: {}", err);
        }
    }
    Ok(())
}

fn progress_cell(job: &Job) -> String {
    match job.total_bytes {
        Some(total) if total > 0 => format!(
            "{} ({:.0}%)",
            human_bytes(job.progress_bytes),
            job.progress_bytes as f64 * 100.0 / total as f64
        ),
        _ if job.progress_bytes > 0 => human_bytes(job.progress_bytes),
        _ => "-".to_string(),
    }
}

pub(crate) fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
