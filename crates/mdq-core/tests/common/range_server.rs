//! Minimal HTTP/1.1 server with Range GET support for integration tests.
//!
//! Serves a single static body, optionally paced so a transfer can be paused
//! mid-stream, and records the start offset of every GET it answers.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// Answer every GET with this status and an empty body.
    pub fail_status: Option<u16>,
    /// Body is written in pieces of this size ...
    pub pace_bytes: usize,
    /// ... with this pause between them.
    pub pace_delay: Duration,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            support_ranges: true,
            fail_status: None,
            pace_bytes: 64 * 1024,
            pace_delay: Duration::ZERO,
        }
    }
}

/// Running server. Lives until the process exits.
pub struct RangeServer {
    pub url: String,
    requests: Arc<Mutex<Vec<u64>>>,
}

impl RangeServer {
    /// Range start of every GET so far (0 for a plain GET).
    pub fn range_starts(&self) -> Vec<u64> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let log = Arc::clone(&log);
            thread::spawn(move || handle(stream, &body, opts, &log));
        }
    });
    RangeServer {
        url: format!("http://127.0.0.1:{}/track.flac", port),
        requests,
    }
}

fn handle(mut stream: TcpStream, body: &[u8], opts: RangeServerOptions, log: &Mutex<Vec<u64>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let (method, range) = parse_request(request);
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }
    log.lock().unwrap().push(range.unwrap_or(0));

    if let Some(code) = opts.fail_status {
        let response = format!("HTTP/1.1 {} Failure\r\nContent-Length: 0\r\n\r\n", code);
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    let total = body.len();
    let (head, slice) = match range.filter(|_| opts.support_ranges) {
        Some(start) if start as usize >= total => {
            let head = format!(
                "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\n\r\n",
                total
            );
            (head, &body[0..0])
        }
        Some(start) => {
            let slice = &body[start as usize..];
            let head = format!(
                "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\nAccept-Ranges: bytes\r\n\r\n",
                slice.len(),
                start,
                total - 1,
                total
            );
            (head, slice)
        }
        None => {
            let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", total);
            (head, body)
        }
    };
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }
    for piece in slice.chunks(opts.pace_bytes.max(1)) {
        if stream.write_all(piece).is_err() {
            return;
        }
        if !opts.pace_delay.is_zero() {
            thread::sleep(opts.pace_delay);
        }
    }
}

/// Returns the method and the start of `Range: bytes=N-`, if any.
fn parse_request(request: &str) -> (&str, Option<u64>) {
    let mut lines = request.lines();
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("");
    let mut range = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                range = value
                    .trim()
                    .strip_prefix("bytes=")
                    .and_then(|v| v.split('-').next())
                    .and_then(|start| start.trim().parse::<u64>().ok());
            }
        }
    }
    (method, range)
}
