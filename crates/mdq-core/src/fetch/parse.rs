//! Parse HTTP response header lines collected by the curl transport.

use super::StreamInfo;

/// Parsed `Content-Range: bytes start-end/total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: Option<u64>,
}

/// Status and size headers of the final response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ResponseHead {
    pub status: Option<u32>,
    pub content_length: Option<u64>,
    pub content_range: Option<ContentRange>,
}

impl ResponseHead {
    /// Where the body actually starts, given the offset we asked for.
    /// `None` when the server answered with a range that starts past it.
    pub fn stream_info(&self, requested: u64) -> Option<StreamInfo> {
        match (self.status, self.content_range) {
            (Some(206), Some(cr)) => {
                if cr.start > requested || cr.end < cr.start {
                    return None;
                }
                Some(StreamInfo {
                    offset: cr.start,
                    total_size: cr.total,
                })
            }
            // Full body: the range (if any) was ignored.
            _ => Some(StreamInfo {
                offset: 0,
                total_size: self.content_length,
            }),
        }
    }
}

/// Parse collected header lines. Only the last response block counts, so
/// redirect hops do not leak their headers into the result.
pub(crate) fn parse_headers(lines: &[String]) -> ResponseHead {
    let mut head = ResponseHead::default();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(status) = parse_status_line(line) {
            head = ResponseHead {
                status: Some(status),
                ..ResponseHead::default()
            };
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                if let Ok(n) = value.parse::<u64>() {
                    head.content_length = Some(n);
                }
            }
            if name.eq_ignore_ascii_case("content-range") {
                head.content_range = parse_content_range(value);
            }
        }
    }
    head
}

/// `HTTP/1.1 206 Partial Content` -> 206.
fn parse_status_line(line: &str) -> Option<u32> {
    let rest = line.strip_prefix("HTTP/")?;
    rest.split_whitespace().nth(1)?.parse().ok()
}

/// `bytes 100-199/1000` or `bytes 100-199/*`.
fn parse_content_range(value: &str) -> Option<ContentRange> {
    let spec = value.strip_prefix("bytes")?.trim();
    let (range, total) = spec.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = end.trim().parse().ok()?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some(ContentRange { start, end, total })
}
