//! Append-only writer for a job's staging file.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// The `.part` file a fetch streams into. Writes are positional at the
/// current length, so a resumed attempt continues where the last one stopped.
pub struct StagingFile {
    file: File,
    path: PathBuf,
    len: u64,
}

impl StagingFile {
    /// Open (creating if needed) without truncation. The file is trimmed to
    /// `resume_from` when it is longer, so bytes past the recorded progress
    /// are never trusted.
    pub fn open(path: &Path, resume_from: u64) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let on_disk = file.metadata()?.len();
        let mut staged = Self {
            file,
            path: path.to_path_buf(),
            len: on_disk,
        };
        if on_disk > resume_from {
            staged.truncate(resume_from)?;
        }
        Ok(staged)
    }

    /// Bytes currently staged.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop everything past `offset` (zero restarts the file).
    pub fn truncate(&mut self, offset: u64) -> io::Result<()> {
        self.file.set_len(offset)?;
        self.len = offset;
        Ok(())
    }

    /// Append `data` at the current end.
    #[cfg(unix)]
    pub fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all_at(data, self.len)?;
        self.len += data.len() as u64;
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn append(&mut self, data: &[u8]) -> io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        self.file.seek(SeekFrom::Start(self.len))?;
        self.file.write_all(data)?;
        self.len += data.len() as u64;
        Ok(())
    }

    /// Sync file data to disk. Called before postprocess/finalize.
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }
}
