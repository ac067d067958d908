//! Fetch error type for retry classification.

use std::fmt;

use crate::control::Signal;
use crate::job::FailureKind;
use crate::retry::{classify_curl_error, classify_http_status, Retryable};

/// Why a sink refused a chunk.
#[derive(Debug)]
pub enum SinkError {
    /// Staging write failed (disk full, permission denied).
    Storage(std::io::Error),
    /// A pause or cancel was observed at the chunk checkpoint.
    Interrupted(Signal),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Storage(e) => write!(f, "storage: {}", e),
            SinkError::Interrupted(s) => write!(f, "{}", s),
        }
    }
}

impl std::error::Error for SinkError {}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError::Storage(e)
    }
}

/// Error returned by a fetch (curl failure, HTTP error, source or storage failure).
#[derive(Debug)]
pub enum FetchError {
    /// Curl reported an error (timeout, connection, etc.).
    Curl(curl::Error),
    /// HTTP response had a non-2xx status.
    Http(u32),
    /// Transfer ended before the advertised size was received.
    PartialTransfer { expected: u64, received: u64 },
    /// Staging write failed. Not retried.
    Storage(std::io::Error),
    /// Source locator is malformed or uses an unsupported scheme.
    InvalidSource(String),
    /// Reading a local source failed.
    Io(std::io::Error),
    /// The sink stopped the transfer on a control signal.
    Interrupted(Signal),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Curl(e) => write!(f, "{}", e),
            FetchError::Http(code) => write!(f, "HTTP {}", code),
            FetchError::PartialTransfer { expected, received } => {
                write!(f, "partial transfer: expected {} bytes, got {}", expected, received)
            }
            FetchError::Storage(e) => write!(f, "storage: {}", e),
            FetchError::InvalidSource(s) => write!(f, "invalid source: {}", s),
            FetchError::Io(e) => write!(f, "source read: {}", e),
            FetchError::Interrupted(s) => write!(f, "{}", s),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Curl(e) => Some(e),
            FetchError::Storage(e) | FetchError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<curl::Error> for FetchError {
    fn from(e: curl::Error) -> Self {
        FetchError::Curl(e)
    }
}

impl From<SinkError> for FetchError {
    fn from(e: SinkError) -> Self {
        match e {
            SinkError::Storage(e) => FetchError::Storage(e),
            SinkError::Interrupted(s) => FetchError::Interrupted(s),
        }
    }
}

impl Retryable for FetchError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            FetchError::Curl(e) => classify_curl_error(e).failure_kind(),
            FetchError::Http(code) => classify_http_status(*code).failure_kind(),
            FetchError::PartialTransfer { .. } => FailureKind::Transient,
            FetchError::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound
                | std::io::ErrorKind::PermissionDenied
                | std::io::ErrorKind::InvalidInput => FailureKind::Permanent,
                _ => FailureKind::Transient,
            },
            FetchError::Storage(_) | FetchError::InvalidSource(_) | FetchError::Interrupted(_) => {
                FailureKind::Permanent
            }
        }
    }
}
