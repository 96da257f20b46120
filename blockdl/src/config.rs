//! Download configuration.
//!
//! [`DownloadConfig`] carries every tunable used by the session and the block
//! workers. [`ConfigFile`] reads the same settings from an INI file:
//!
//! ```ini
//! [download]
//! blocks = 4
//! read_timeout_secs = 30
//! checkpoint_interval_ms = 1000
//!
//! [probe]
//! max_attempts = 5
//! initial_delay_secs = 3
//! max_delay_secs = 30
//!
//! [http]
//! user_agent = Mozilla/5.0 ...
//! accept_language = en-US,en;q=0.8
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};

use crate::error::{DownloadError, DownloadResult};

/// Default number of blocks per download.
pub const DEFAULT_BLOCKS: usize = 4;

/// Default read timeout for ranged requests.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default minimum interval between periodic checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on a single streamed read, in bytes.
pub const READ_CHUNK_SIZE: usize = 512;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
const DEFAULT_ACCEPT: &str = "*/*";
const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.8";

/// Bounded retry with capped exponential backoff for size discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (minimum 1).
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Delay ceiling.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Create a policy; `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
        }
    }

    /// A policy that tries once and never sleeps.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

/// Browser-like request headers sent with every ranged GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderProfile {
    pub accept: String,
    pub accept_language: String,
    pub user_agent: String,
}

impl Default for HeaderProfile {
    fn default() -> Self {
        Self {
            accept: DEFAULT_ACCEPT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Settings for one download session and its workers.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Number of blocks to split a file of known length into.
    pub blocks: usize,
    /// Connect/read timeout for HTTP requests.
    pub read_timeout: Duration,
    /// Minimum interval between periodic checkpoints.
    pub checkpoint_interval: Duration,
    /// Size discovery retry policy.
    pub probe_retry: RetryPolicy,
    /// Request headers.
    pub headers: HeaderProfile,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            blocks: DEFAULT_BLOCKS,
            read_timeout: DEFAULT_READ_TIMEOUT,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            probe_retry: RetryPolicy::default(),
            headers: HeaderProfile::default(),
        }
    }
}

impl DownloadConfig {
    /// Set the block count (minimum 1).
    pub fn with_blocks(mut self, blocks: usize) -> Self {
        self.blocks = blocks.max(1);
        self
    }

    /// Set the read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the checkpoint interval.
    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Set the size probe retry policy.
    pub fn with_probe_retry(mut self, policy: RetryPolicy) -> Self {
        self.probe_retry = policy;
        self
    }

    /// Set the request header profile.
    pub fn with_headers(mut self, headers: HeaderProfile) -> Self {
        self.headers = headers;
        self
    }
}

/// INI-backed configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub download: DownloadConfig,
}

impl ConfigFile {
    /// Default config file location (`<config dir>/blockdl/config.ini`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("blockdl").join("config.ini"))
    }

    /// Load from the default location, or defaults if the file does not exist.
    pub fn load() -> DownloadResult<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> DownloadResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DownloadError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content)
    }

    /// Parse INI text. Missing sections or keys keep their defaults.
    pub fn parse(content: &str) -> DownloadResult<Self> {
        let ini = Ini::load_from_str(content)
            .map_err(|e| DownloadError::Config(format!("malformed INI: {}", e)))?;
        let mut config = DownloadConfig::default();

        if let Some(section) = ini.section(Some("download")) {
            if let Some(blocks) = parse_key::<usize>(section, "download", "blocks")? {
                if blocks == 0 {
                    return Err(DownloadError::Config(
                        "download.blocks must be at least 1".to_string(),
                    ));
                }
                config.blocks = blocks;
            }
            if let Some(secs) = parse_key::<u64>(section, "download", "read_timeout_secs")? {
                config.read_timeout = Duration::from_secs(secs);
            }
            if let Some(ms) = parse_key::<u64>(section, "download", "checkpoint_interval_ms")? {
                config.checkpoint_interval = Duration::from_millis(ms);
            }
        }

        if let Some(section) = ini.section(Some("probe")) {
            let mut policy = config.probe_retry.clone();
            if let Some(attempts) = parse_key::<u32>(section, "probe", "max_attempts")? {
                policy.max_attempts = attempts.max(1);
            }
            if let Some(secs) = parse_key::<u64>(section, "probe", "initial_delay_secs")? {
                policy.initial_delay = Duration::from_secs(secs);
            }
            if let Some(secs) = parse_key::<u64>(section, "probe", "max_delay_secs")? {
                policy.max_delay = Duration::from_secs(secs);
            }
            config.probe_retry = policy;
        }

        if let Some(section) = ini.section(Some("http")) {
            if let Some(agent) = section.get("user_agent") {
                config.headers.user_agent = agent.to_string();
            }
            if let Some(language) = section.get("accept_language") {
                config.headers.accept_language = language.to_string();
            }
            if let Some(accept) = section.get("accept") {
                config.headers.accept = accept.to_string();
            }
        }

        Ok(Self { download: config })
    }
}

fn parse_key<T: FromStr>(
    section: &Properties,
    section_name: &str,
    key: &str,
) -> DownloadResult<Option<T>> {
    match section.get(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            DownloadError::Config(format!("{}.{}: invalid value '{}'", section_name, key, raw))
        }),
    }
}
