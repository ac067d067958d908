//! Destination resolution: where a finished job's file lands.
//!
//! A job's destination may be relative (placed under the library directory)
//! or name a directory (a filename is derived from the source). The resolver
//! then picks a conflict-free path so finalize never overwrites.

mod name;
mod sanitize;

pub use name::filename_from_source;
pub use sanitize::sanitize_filename_for_linux;

use std::io;
use std::path::{Path, PathBuf};

/// Desired path -> conflict-free final path.
pub trait DestinationResolver: Send + Sync {
    fn resolve(&self, desired: &Path) -> io::Result<PathBuf>;
}

/// Appends ` (1)`, ` (2)`, ... to the file stem until the path is free.
#[derive(Debug, Clone, Copy, Default)]
pub struct Disambiguating;

/// Gives up after this many candidates.
const MAX_SUFFIX: u32 = 10_000;

impl DestinationResolver for Disambiguating {
    fn resolve(&self, desired: &Path) -> io::Result<PathBuf> {
        if is_free(desired)? {
            return Ok(desired.to_path_buf());
        }
        let parent = desired.parent().unwrap_or_else(|| Path::new(""));
        let stem = desired
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = desired
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        for n in 1..=MAX_SUFFIX {
            let candidate = parent.join(format!("{} ({}){}", stem, n, ext));
            if is_free(&candidate)? {
                return Ok(candidate);
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free name for {}", desired.display()),
        ))
    }
}

/// Nothing (not even a dangling symlink) occupies `path`.
fn is_free(path: &Path) -> io::Result<bool> {
    match std::fs::symlink_metadata(path) {
        Ok(_) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e),
    }
}

/// Turn a job's destination into a concrete file path.
///
/// Relative destinations are joined onto `library_dir`. A destination ending
/// in `/` or naming an existing directory gets a filename derived from
/// `source`.
pub fn resolve_desired(destination: &Path, library_dir: &Path, source: &str) -> PathBuf {
    let names_dir = destination.as_os_str().to_string_lossy().ends_with('/');
    let base = if destination.is_relative() {
        library_dir.join(destination)
    } else {
        destination.to_path_buf()
    };
    if names_dir || base.is_dir() {
        base.join(filename_from_source(source))
    } else {
        base
    }
}
