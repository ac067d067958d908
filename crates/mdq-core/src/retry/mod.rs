//! Retry and backoff policy.
//!
//! This module encapsulates error classification (timeouts, throttling,
//! connection failures) and jittered exponential backoff so that the worker
//! (job-level requeue) and the postprocess stage (in-place retry) share one
//! policy.

mod classify;
mod policy;
mod run;

pub use classify::{classify_curl_error, classify_http_status, Retryable};
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
