//! Local file transport: `file://` URLs and plain paths.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

use super::{ChunkSink, FetchError, FetchTransport, StreamInfo};

/// Reads local files in chunks. Always honours resume offsets.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTransport;

impl FileTransport {
    /// Path named by a `file://` URL or a plain path.
    pub fn path_of(source: &str) -> Result<PathBuf, FetchError> {
        if source.starts_with("file:") {
            let url = url::Url::parse(source)
                .map_err(|e| FetchError::InvalidSource(format!("{}: {}", source, e)))?;
            return url
                .to_file_path()
                .map_err(|_| FetchError::InvalidSource(source.to_string()));
        }
        Ok(PathBuf::from(source))
    }
}

impl FetchTransport for FileTransport {
    fn fetch(
        &self,
        source: &str,
        offset: u64,
        chunk_size: usize,
        sink: &mut dyn ChunkSink,
    ) -> Result<(), FetchError> {
        let path = Self::path_of(source)?;
        let mut file = File::open(&path).map_err(FetchError::Io)?;
        let meta = file.metadata().map_err(FetchError::Io)?;
        if !meta.is_file() {
            return Err(FetchError::InvalidSource(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        let total = meta.len();
        // A staged file longer than the source cannot be continued.
        let start = if offset <= total { offset } else { 0 };
        file.seek(SeekFrom::Start(start)).map_err(FetchError::Io)?;
        sink.begin(StreamInfo {
            offset: start,
            total_size: Some(total),
        })?;

        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut received = 0u64;
        loop {
            let n = file.read(&mut buf).map_err(FetchError::Io)?;
            if n == 0 {
                break;
            }
            sink.chunk(&buf[..n])?;
            received += n as u64;
        }
        let expected = total - start;
        if received != expected {
            return Err(FetchError::PartialTransfer { expected, received });
        }
        Ok(())
    }
}
