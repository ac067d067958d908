//! Scheme-based dispatch between the curl and file transports.

use std::sync::Arc;

use super::{ChunkSink, CurlOptions, CurlTransport, FetchError, FetchTransport, FileTransport};

/// Sends `http`, `https` and `ftp` sources to libcurl and `file:` or plain
/// paths to the local reader.
#[derive(Clone)]
pub struct RoutingTransport {
    remote: Arc<dyn FetchTransport>,
    local: Arc<dyn FetchTransport>,
}

impl RoutingTransport {
    pub fn new(remote: Arc<dyn FetchTransport>, local: Arc<dyn FetchTransport>) -> Self {
        Self { remote, local }
    }

    pub fn with_curl(options: CurlOptions) -> Self {
        Self::new(Arc::new(CurlTransport::new(options)), Arc::new(FileTransport))
    }

    fn route(&self, source: &str) -> Result<&dyn FetchTransport, FetchError> {
        match url::Url::parse(source) {
            Ok(url) => match url.scheme() {
                "http" | "https" | "ftp" => Ok(self.remote.as_ref()),
                "file" => Ok(self.local.as_ref()),
                other => Err(FetchError::InvalidSource(format!(
                    "unsupported scheme '{}' in {}",
                    other, source
                ))),
            },
            Err(url::ParseError::RelativeUrlWithoutBase) => Ok(self.local.as_ref()),
            Err(e) => Err(FetchError::InvalidSource(format!("{}: {}", source, e))),
        }
    }
}

impl Default for RoutingTransport {
    fn default() -> Self {
        Self::with_curl(CurlOptions::default())
    }
}

impl FetchTransport for RoutingTransport {
    fn fetch(
        &self,
        source: &str,
        offset: u64,
        chunk_size: usize,
        sink: &mut dyn ChunkSink,
    ) -> Result<(), FetchError> {
        self.route(source)?.fetch(source, offset, chunk_size, sink)
    }
}
