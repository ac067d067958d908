//! Fetch transports: stream a source into a [`ChunkSink`].
//!
//! Transports are blocking and run on the blocking pool. They deliver the
//! body in chunks of at most `chunk_size` bytes; the sink is the worker's
//! checkpoint, so cancellation latency is bounded by one chunk.

mod error;
mod file;
mod http;
mod parse;
mod routing;

pub use http::{CurlOptions, CurlTransport};
pub use error::{FetchError, SinkError};
pub use file::FileTransport;
pub use routing::RoutingTransport;

/// What the transport learned about the stream before the first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    /// Byte offset the first chunk starts at. Zero when the transport could
    /// not honour a requested resume offset.
    pub offset: u64,
    /// Size of the whole resource, when known.
    pub total_size: Option<u64>,
}

/// Receiver of a fetched byte stream.
pub trait ChunkSink {
    /// Called once, before any chunk.
    fn begin(&mut self, info: StreamInfo) -> Result<(), SinkError>;
    /// Called for each chunk in order.
    fn chunk(&mut self, data: &[u8]) -> Result<(), SinkError>;
}

/// Source locator -> byte stream.
pub trait FetchTransport: Send + Sync {
    /// Stream `source` starting at `offset` into `sink`. Transports that
    /// cannot resume report `StreamInfo { offset: 0, .. }` to `begin`.
    fn fetch(
        &self,
        source: &str,
        offset: u64,
        chunk_size: usize,
        sink: &mut dyn ChunkSink,
    ) -> Result<(), FetchError>;
}
