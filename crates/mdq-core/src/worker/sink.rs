//! Chunk sink that writes into the staging file and is the fetch checkpoint.

use std::io;
use std::sync::Arc;

use crate::control::ControlToken;
use crate::events::ProgressThrottle;
use crate::fetch::{ChunkSink, SinkError, StreamInfo};
use crate::job::JobId;
use crate::storage::StagingFile;
use crate::store::QueueStore;

pub(super) struct StagingSink {
    id: JobId,
    store: QueueStore,
    token: Arc<ControlToken>,
    file: StagingFile,
    throttle: ProgressThrottle,
    total: Option<u64>,
}

impl StagingSink {
    pub(super) fn new(
        id: JobId,
        store: QueueStore,
        token: Arc<ControlToken>,
        file: StagingFile,
        throttle: ProgressThrottle,
    ) -> Self {
        Self {
            id,
            store,
            token,
            file,
            throttle,
            total: None,
        }
    }

    /// Flush the final progress value and sync the staged bytes. A finished
    /// stream of unknown size records what was written as its total.
    pub(super) fn finish(self, complete: bool) -> io::Result<()> {
        let written = self.file.len();
        let total = if complete {
            Some(self.total.unwrap_or(written))
        } else {
            None
        };
        self.report(written, total);
        self.file.sync()
    }

    fn report(&self, done: u64, total: Option<u64>) {
        if let Err(e) = self.store.update_progress(self.id, done, total) {
            tracing::warn!(job_id = self.id, error = %e, "progress update dropped");
        }
    }
}

impl ChunkSink for StagingSink {
    fn begin(&mut self, info: StreamInfo) -> Result<(), SinkError> {
        let staged = self.file.len();
        if info.offset > staged {
            return Err(SinkError::Storage(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "stream starts at byte {} but only {} bytes are staged",
                    info.offset, staged
                ),
            )));
        }
        if info.offset < staged {
            if staged > 0 && info.offset == 0 {
                tracing::info!(job_id = self.id, staged, "resume refused by source; restarting");
            }
            self.file.truncate(info.offset)?;
        }
        self.total = info.total_size;
        if let Err(e) = self
            .store
            .begin_transfer(self.id, info.offset, info.total_size)
        {
            tracing::warn!(job_id = self.id, error = %e, "transfer start not recorded");
        }
        self.throttle.reset(info.offset);
        Ok(())
    }

    fn chunk(&mut self, data: &[u8]) -> Result<(), SinkError> {
        self.file.append(data)?;
        let done = self.file.len();
        if self.throttle.should_report(done) {
            self.report(done, None);
        }
        match self.token.pending() {
            Some(signal) => Err(SinkError::Interrupted(signal)),
            None => Ok(()),
        }
    }
}
