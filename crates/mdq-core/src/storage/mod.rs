//! Disk I/O and file lifecycle.
//!
//! Bytes are only ever written inside the staging directory
//! (`<staging>/job-<id>.part`, plus postprocess output next to it) until
//! finalize moves the finished file into place with a rename.

mod finalize;
mod staging;

pub use finalize::{move_into_place, FinalizeError};
pub use staging::StagingFile;

use std::io;
use std::path::{Path, PathBuf};

use crate::job::JobId;

/// Suffix of the file a job fetches into.
pub const STAGING_SUFFIX: &str = ".part";

fn job_prefix(id: JobId) -> String {
    format!("job-{}.", id)
}

/// Path of the fetch staging file for job `id`.
pub fn staging_path(staging_dir: &Path, id: JobId) -> PathBuf {
    staging_dir.join(format!("job-{}{}", id, STAGING_SUFFIX))
}

/// Where a postprocessor should write its output. Keeps the destination's
/// extension so format-sniffing tools pick the right encoder.
pub fn postprocess_output_path(staging_dir: &Path, id: JobId, desired: &Path) -> PathBuf {
    let mut name = format!("{}out", job_prefix(id));
    if let Some(ext) = desired.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    staging_dir.join(name)
}

/// Create the staging directory if needed.
pub fn prepare_staging_dir(staging_dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(staging_dir)
}

/// Remove every staging artifact of job `id`. Missing files are fine.
pub fn discard_staging(staging_dir: &Path, id: JobId) -> io::Result<()> {
    let prefix = job_prefix(id);
    let entries = match std::fs::read_dir(staging_dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(())
}
