//! Runtime settings of one engine instance.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::config::MdqConfig;
use crate::fetch::CurlOptions;
use crate::retry::RetryPolicy;

/// Resolved engine settings. Built from [`MdqConfig`] by the CLI, or
/// directly by embedders and tests.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum jobs Active at once.
    pub max_active: usize,
    pub staging_dir: PathBuf,
    /// Base for relative destinations.
    pub library_dir: PathBuf,
    /// Fetch read size; bounds how late a pause or cancel is observed.
    pub chunk_size: usize,
    pub progress_every_bytes: u64,
    pub progress_interval: Duration,
    /// Default buffer of [`crate::engine::Engine::subscribe`].
    pub event_buffer: usize,
    /// Job-level requeue policy.
    pub retry: RetryPolicy,
    /// In-place retry of a transient postprocess failure.
    pub postprocess_retry: RetryPolicy,
    pub postprocess_command: Option<Vec<String>>,
    pub curl: CurlOptions,
}

impl EngineConfig {
    /// Defaults with explicit directories.
    pub fn with_dirs(staging_dir: impl Into<PathBuf>, library_dir: impl Into<PathBuf>) -> Self {
        Self::resolve(&MdqConfig::default(), staging_dir.into(), library_dir.into())
    }

    pub fn from_config(cfg: &MdqConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self::resolve(cfg, cfg.staging_dir()?, cfg.library_dir()))
    }

    fn resolve(cfg: &MdqConfig, staging_dir: PathBuf, library_dir: PathBuf) -> Self {
        let retry = cfg.retry.policy();
        Self {
            max_active: cfg.max_active.max(1),
            staging_dir,
            library_dir,
            chunk_size: cfg.chunk_size_bytes.max(1),
            progress_every_bytes: cfg.progress_every_bytes,
            progress_interval: Duration::from_millis(cfg.progress_interval_ms),
            event_buffer: cfg.event_buffer.max(1),
            retry,
            postprocess_retry: RetryPolicy {
                max_attempts: cfg.postprocess.max_attempts.max(1),
                ..retry
            },
            postprocess_command: cfg.postprocess.command.clone(),
            curl: cfg.fetch.curl_options(),
        }
    }
}
