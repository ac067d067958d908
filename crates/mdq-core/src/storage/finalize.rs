//! Atomic move of a finished file into the library.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use crate::job::FailureKind;
use crate::retry::Retryable;

#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    #[error("cannot resolve destination {path}: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to move {} to {}: {source}", from.display(), to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Retryable for FinalizeError {
    /// Destination problems (unwritable, disk full) do not heal by refetching.
    fn failure_kind(&self) -> FailureKind {
        FailureKind::Permanent
    }
}

/// Move `src` to `dst` so that `dst` only ever appears complete.
///
/// Same filesystem: a single `rename`. Across filesystems: copy into a
/// hidden temp file next to `dst`, fsync, rename, then remove `src`.
pub fn move_into_place(src: &Path, dst: &Path) -> Result<(), FinalizeError> {
    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| FinalizeError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let moved = |source: io::Error| FinalizeError::Move {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source,
    };
    match std::fs::rename(src, dst) {
        Ok(()) => {}
        Err(e) if is_cross_device(&e) => copy_then_rename(src, dst).map_err(moved)?,
        Err(e) => return Err(moved(e)),
    }
    sync_parent(dst);
    Ok(())
}

fn copy_then_rename(src: &Path, dst: &Path) -> io::Result<()> {
    let tmp = hidden_temp(dst);
    let result = (|| {
        std::fs::copy(src, &tmp)?;
        File::open(&tmp)?.sync_all()?;
        std::fs::rename(&tmp, dst)
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result?;
    std::fs::remove_file(src)
}

/// `.name.mdq-tmp` in the destination directory.
fn hidden_temp(dst: &Path) -> PathBuf {
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dst.with_file_name(format!(".{}.mdq-tmp", name))
}

#[cfg(unix)]
fn is_cross_device(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn is_cross_device(_e: &io::Error) -> bool {
    false
}

/// Best effort: persist the directory entry of the renamed file.
#[cfg(unix)]
fn sync_parent(dst: &Path) {
    if let Some(parent) = dst.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent(_dst: &Path) {}
