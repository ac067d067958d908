//! HTTP(S) transport over libcurl with `Range` resumption.

use std::cell::{Cell, RefCell};
use std::str;
use std::time::Duration;

use super::parse::parse_headers;
use super::{ChunkSink, FetchError, FetchTransport, StreamInfo};

/// Low-level curl settings, from the `[fetch]` config table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    /// Abort when throughput stays below this many bytes/s ...
    pub low_speed_limit: u32,
    /// ... for this long.
    pub low_speed_time: Duration,
    /// Hard ceiling so a completely stuck transfer eventually fails.
    pub timeout: Duration,
    pub max_recv_speed: Option<u64>,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
            timeout: Duration::from_secs(3600),
            max_recv_speed: None,
        }
    }
}

/// libcurl's accepted receive buffer range.
const MIN_BUFFER: usize = 1024;
const MAX_BUFFER: usize = 512 * 1024;

#[derive(Debug, Clone, Default)]
pub struct CurlTransport {
    options: CurlOptions,
}

impl CurlTransport {
    pub fn new(options: CurlOptions) -> Self {
        Self { options }
    }

    fn easy(
        &self,
        url: &str,
        offset: u64,
        chunk_size: usize,
    ) -> Result<curl::easy::Easy, FetchError> {
        let opts = &self.options;
        let mut easy = curl::easy::Easy::new();
        easy.url(url)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(opts.connect_timeout)?;
        easy.low_speed_limit(opts.low_speed_limit)?;
        easy.low_speed_time(opts.low_speed_time)?;
        easy.timeout(opts.timeout)?;
        if let Some(speed) = opts.max_recv_speed {
            easy.max_recv_speed(speed)?;
        }
        easy.buffer_size(chunk_size.clamp(MIN_BUFFER, MAX_BUFFER))?;
        if offset > 0 {
            easy.range(&format!("{}-", offset))?;
        }
        Ok(easy)
    }
}

impl FetchTransport for CurlTransport {
    fn fetch(
        &self,
        source: &str,
        offset: u64,
        chunk_size: usize,
        sink: &mut dyn ChunkSink,
    ) -> Result<(), FetchError> {
        let mut easy = self.easy(source, offset, chunk_size)?;

        let header_lines: RefCell<Vec<String>> = RefCell::new(Vec::new());
        let stashed: RefCell<Option<FetchError>> = RefCell::new(None);
        let started: Cell<Option<StreamInfo>> = Cell::new(None);
        let discarding = Cell::new(false);
        let received = Cell::new(0u64);

        {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(line) = str::from_utf8(data) {
                    let line = line.trim_end();
                    let mut lines = header_lines.borrow_mut();
                    // Each redirect hop starts a fresh header block.
                    if line.starts_with("HTTP/") {
                        lines.clear();
                    }
                    lines.push(line.to_string());
                }
                true
            })?;
            transfer.write_function(|data| {
                if started.get().is_none() && !discarding.get() {
                    let head = parse_headers(&header_lines.borrow());
                    if !matches!(head.status, Some(200..=299)) {
                        // Error body; the status is reported after perform.
                        discarding.set(true);
                    } else {
                        let Some(info) = head.stream_info(offset) else {
                            stashed.replace(Some(FetchError::PartialTransfer {
                                expected: offset,
                                received: 0,
                            }));
                            return Ok(0);
                        };
                        if let Err(e) = sink.begin(info) {
                            stashed.replace(Some(e.into()));
                            return Ok(0);
                        }
                        started.set(Some(info));
                    }
                }
                if discarding.get() {
                    return Ok(data.len());
                }
                match sink.chunk(data) {
                    Ok(()) => {
                        received.set(received.get() + data.len() as u64);
                        Ok(data.len())
                    }
                    Err(e) => {
                        stashed.replace(Some(e.into()));
                        Ok(0) // abort transfer
                    }
                }
            })?;
            if let Err(e) = transfer.perform() {
                if e.is_write_error() {
                    if let Some(err) = stashed.borrow_mut().take() {
                        return Err(err);
                    }
                }
                return Err(FetchError::Curl(e));
            }
        }

        let code = easy.response_code()?;
        if !(200..300).contains(&code) {
            return Err(FetchError::Http(code));
        }

        let info = match started.get() {
            Some(info) => info,
            None => {
                // Empty body: the sink still learns where the stream stands.
                let head = parse_headers(&header_lines.borrow());
                let info = head.stream_info(offset).ok_or(FetchError::PartialTransfer {
                    expected: offset,
                    received: 0,
                })?;
                sink.begin(info)?;
                info
            }
        };

        if let Some(total) = info.total_size {
            let expected = total.saturating_sub(info.offset);
            let got = received.get();
            if got != expected {
                return Err(FetchError::PartialTransfer {
                    expected,
                    received: got,
                });
            }
        }
        Ok(())
    }
}
