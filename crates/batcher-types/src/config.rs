//! Configuration loading for the index batcher.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/index-batcher/config.toml.

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Batching and retry behaviour of the buffered sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Queue length that triggers an immediate flush, and the largest
    /// number of actions sent in one request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Whether enqueueing schedules flushes on its own.
    /// When false, only explicit `flush()`/`close()` calls submit anything.
    #[serde(default = "default_auto_flush")]
    pub auto_flush: bool,

    /// Idle window before queued actions are flushed (ms).
    /// Zero or negative disables the idle timer; the size trigger still applies.
    #[serde(default = "default_auto_flush_interval")]
    pub auto_flush_interval_ms: i64,

    /// Maximum submission attempts for one action, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries_per_action: u32,

    /// First delay applied after a throttled response (ms). Zero disables throttling waits.
    #[serde(default = "default_throttling_delay")]
    pub throttling_delay_ms: u64,

    /// Upper bound for the throttling delay (ms).
    #[serde(default = "default_max_throttling_delay")]
    pub max_throttling_delay_ms: u64,

    /// When true, a flush that terminally failed any action returns an error.
    #[serde(default)]
    pub strict_flush: bool,
}

fn default_batch_size() -> usize {
    512
}

fn default_auto_flush() -> bool {
    true
}

fn default_auto_flush_interval() -> i64 {
    60_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_throttling_delay() -> u64 {
    800
}

fn default_max_throttling_delay() -> u64 {
    60_000
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            auto_flush: default_auto_flush(),
            auto_flush_interval_ms: default_auto_flush_interval(),
            max_retries_per_action: default_max_retries(),
            throttling_delay_ms: default_throttling_delay(),
            max_throttling_delay_ms: default_max_throttling_delay(),
            strict_flush: false,
        }
    }
}

impl SenderConfig {
    /// Set the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Enable or disable automatic flushing.
    pub fn with_auto_flush(mut self, enabled: bool) -> Self {
        self.auto_flush = enabled;
        self
    }

    /// Set the idle flush interval.
    pub fn with_auto_flush_interval(mut self, interval: Duration) -> Self {
        self.auto_flush_interval_ms = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
        self
    }

    /// Set the per-action attempt limit.
    pub fn with_max_retries_per_action(mut self, max: u32) -> Self {
        self.max_retries_per_action = max;
        self
    }

    /// Set the throttling delay range.
    pub fn with_throttling_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.throttling_delay_ms = u64::try_from(initial.as_millis()).unwrap_or(u64::MAX);
        self.max_throttling_delay_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enable or disable strict flush errors.
    pub fn with_strict_flush(mut self, strict: bool) -> Self {
        self.strict_flush = strict;
        self
    }

    /// Idle interval, or `None` when the idle timer is disabled.
    pub fn auto_flush_interval(&self) -> Option<Duration> {
        if self.auto_flush_interval_ms <= 0 {
            None
        } else {
            Some(Duration::from_millis(self.auto_flush_interval_ms as u64))
        }
    }

    /// Initial throttling delay.
    pub fn throttling_delay(&self) -> Duration {
        Duration::from_millis(self.throttling_delay_ms)
    }

    /// Maximum throttling delay.
    pub fn max_throttling_delay(&self) -> Duration {
        Duration::from_millis(self.max_throttling_delay_ms)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.batch_size == 0 {
            return Err(SettingsError::Invalid("batch_size must be > 0".to_string()));
        }
        if self.max_retries_per_action == 0 {
            return Err(SettingsError::Invalid(
                "max_retries_per_action must be > 0".to_string(),
            ));
        }
        if self.max_throttling_delay_ms < self.throttling_delay_ms {
            return Err(SettingsError::Invalid(format!(
                "max_throttling_delay_ms ({}) must be >= throttling_delay_ms ({})",
                self.max_throttling_delay_ms, self.throttling_delay_ms
            )));
        }
        Ok(())
    }
}

/// Connection settings for the remote indexing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Service base URL (e.g., "https://my-service.search.windows.net")
    #[serde(default)]
    pub endpoint: String,

    /// Target index name
    #[serde(default)]
    pub index_name: String,

    /// API version query parameter
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// API key (load from env var, keep out of config files)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_version() -> String {
    "2024-07-01".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            index_name: String::new(),
            api_version: default_api_version(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Sender batching/retry behaviour
    #[serde(default)]
    pub sender: SenderConfig,

    /// Remote service connection
    #[serde(default)]
    pub service: ServiceSettings,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sender: SenderConfig::default(),
            service: ServiceSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/index-batcher/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (BATCHER__SECTION__FIELD)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, SettingsError> {
        let config_dir = ProjectDirs::from("", "", "index-batcher")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())?
            .set_default("sender.batch_size", default_batch_size() as i64)?
            .set_default("sender.max_retries_per_action", default_max_retries() as i64)?
            .set_default("service.api_version", default_api_version())?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: BATCHER__SENDER__BATCH_SIZE, BATCHER__SERVICE__API_KEY, ...
        builder = builder.add_source(
            Environment::with_prefix("BATCHER")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.sender.validate()?;
        Ok(settings)
    }
}
