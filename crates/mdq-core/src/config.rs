use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::fetch::CurlOptions;
use crate::retry::RetryPolicy;

/// Job-level retry policy (`[retry]` in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per job (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff.
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
    /// Relative jitter applied to each delay (0.2 = ±20%).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 1.0,
            max_delay_secs: 60,
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    /// Reject values no delay can be computed from.
    pub fn validate(&self) -> Result<()> {
        if Duration::try_from_secs_f64(self.base_delay_secs).is_err() {
            bail!(
                "[retry] base_delay_secs must be a finite, non-negative number of seconds (got {})",
                self.base_delay_secs
            );
        }
        if !self.jitter.is_finite() {
            bail!("[retry] jitter must be a finite number (got {})", self.jitter);
        }
        Ok(())
    }

    /// Out-of-range values are clamped; call `validate` to reject them instead.
    pub fn policy(&self) -> RetryPolicy {
        let max_delay = Duration::from_secs(self.max_delay_secs);
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::try_from_secs_f64(self.base_delay_secs.max(0.0))
                .unwrap_or(max_delay),
            max_delay,
            jitter: if self.jitter.is_finite() {
                self.jitter.clamp(0.0, 1.0)
            } else {
                0.0
            },
        }
    }
}

/// External postprocess step (`[postprocess]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocessConfig {
    /// `[program, arg, ...]` with `{input}`, `{output}`, `{artist}`, `{title}`,
    /// `{album}` placeholders. None = keep fetched bytes as-is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// In-place attempts for a transient postprocess failure.
    pub max_attempts: u32,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            command: None,
            max_attempts: 2,
        }
    }
}

/// Fetch transport tuning (`[fetch]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub connect_timeout_secs: u64,
    /// Abort when throughput stays below this for `low_speed_time_secs`.
    pub low_speed_limit_bytes: u32,
    pub low_speed_time_secs: u64,
    /// Optional per-transfer bandwidth cap in bytes per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bytes_per_sec: Option<u64>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            low_speed_limit_bytes: 1024,
            low_speed_time_secs: 60,
            max_bytes_per_sec: None,
        }
    }
}

impl FetchConfig {
    pub fn curl_options(&self) -> CurlOptions {
        CurlOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            low_speed_limit: self.low_speed_limit_bytes,
            low_speed_time: Duration::from_secs(self.low_speed_time_secs),
            max_recv_speed: self.max_bytes_per_sec,
            ..CurlOptions::default()
        }
    }
}

/// Global configuration loaded from `~/.config/mdq/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MdqConfig {
    /// Maximum number of jobs Active at once.
    pub max_active: usize,
    /// Where relative destinations are placed. Default: XDG music dir or `~/Music`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_dir: Option<PathBuf>,
    /// Where partial files live until finalize. Default: `~/.local/state/mdq/staging`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,
    /// Read size of the fetch loop; bounds cancellation latency.
    pub chunk_size_bytes: usize,
    pub progress_interval_ms: u64,
    pub progress_every_bytes: u64,
    /// Per-subscriber event buffer.
    pub event_buffer: usize,
    pub retry: RetryConfig,
    pub postprocess: PostprocessConfig,
    pub fetch: FetchConfig,
}

impl Default for MdqConfig {
    fn default() -> Self {
        Self {
            max_active: 50,
            library_dir: None,
            staging_dir: None,
            chunk_size_bytes: 64 * 1024,
            progress_interval_ms: 250,
            progress_every_bytes: 1024 * 1024,
            event_buffer: 256,
            retry: RetryConfig::default(),
            postprocess: PostprocessConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl MdqConfig {
    /// Configured library dir, else `$HOME/Music`, else the current directory.
    pub fn library_dir(&self) -> PathBuf {
        self.library_dir.clone().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(|h| PathBuf::from(h).join("Music"))
                .unwrap_or_else(|| PathBuf::from("."))
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.retry.validate()
    }

    /// Configured staging dir, else `~/.local/state/mdq/staging`.
    pub fn staging_dir(&self) -> Result<PathBuf> {
        match &self.staging_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(state_dir()?.join("staging")),
        }
    }
}

/// `~/.local/state/mdq`: database, log, control socket, staging.
pub fn state_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mdq")?;
    Ok(xdg_dirs.get_state_home().join("mdq"))
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mdq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MdqConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = MdqConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let cfg: MdqConfig =
        toml::from_str(&data).with_context(|| format!("invalid config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
