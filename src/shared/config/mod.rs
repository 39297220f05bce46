//! Application configuration module
//!
//! Provides configuration types for the daemon and the sync service.
//! Values come from an optional TOML file, then `ATTENDSYNC_*` environment
//! overrides, then builder calls.

use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "ATTENDSYNC_";

/// Sync engine tuning
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Run periodic passes while online
    pub auto_sync: bool,
    /// Interval between periodic passes while online
    pub sync_interval_seconds: u64,
    /// Base delay between items of one pass
    pub item_delay_ms: u64,
    /// Cap for the delay after consecutive transient failures
    pub max_item_delay_ms: u64,
    /// Bound on every remote write or query
    pub remote_timeout_seconds: u64,
    /// Concurrency guard window
    pub guard_window_seconds: u64,
    /// Operator locale offset, used for calendar days and the date column
    pub utc_offset_minutes: i32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_interval_seconds: 30,
            item_delay_ms: 1000,
            max_item_delay_ms: 8000,
            remote_timeout_seconds: 10,
            guard_window_seconds: 3,
            utc_offset_minutes: -180,
        }
    }
}

impl SyncConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_seconds)
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn max_item_delay(&self) -> Duration {
        Duration::from_millis(self.max_item_delay_ms.max(self.item_delay_ms))
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_seconds)
    }

    pub fn guard_window(&self) -> Duration {
        Duration::from_secs(self.guard_window_seconds)
    }

    /// Operator locale offset; falls back to UTC when out of range
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// Validate the values that bound a wait
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue("remote_timeout_seconds must be > 0"));
        }
        if self.guard_window_seconds == 0 {
            return Err(ConfigError::InvalidValue("guard_window_seconds must be > 0"));
        }
        if self.auto_sync && self.sync_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue("sync_interval_seconds must be > 0"));
        }
        if FixedOffset::east_opt(self.utc_offset_minutes * 60).is_none() {
            return Err(ConfigError::InvalidValue("utc_offset_minutes out of range"));
        }
        Ok(())
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Primary ledger endpoint
    pub ledger_url: Option<String>,
    /// Structured index base URL
    pub index_url: Option<String>,
    /// Structured index API key
    pub index_api_key: Option<String>,
    /// Structured index table
    pub index_table: Option<String>,
    /// Local SQLite file; defaults to the platform data dir
    pub database_path: Option<PathBuf>,
    /// Reference snapshot (JSON)
    pub reference_data_path: Option<PathBuf>,
    /// Reachability probe target
    pub probe_url: Option<String>,
    /// Probe interval
    pub probe_interval_seconds: Option<u64>,
    /// Default tracing filter when RUST_LOG is unset
    pub log_filter: Option<String>,
    /// Sync engine tuning
    pub sync: SyncConfig,
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Parses a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file, applies environment overrides and validates
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
                toml::from_str::<AppConfig>(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
            None => AppConfig::default(),
        };
        config.apply_env(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from `lookup` (keys without the prefix)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("LEDGER_URL") {
            self.ledger_url = Some(value);
        }
        if let Some(value) = lookup("INDEX_URL") {
            self.index_url = Some(value);
        }
        if let Some(value) = lookup("INDEX_API_KEY") {
            self.index_api_key = Some(value);
        }
        if let Some(value) = lookup("INDEX_TABLE") {
            self.index_table = Some(value);
        }
        if let Some(value) = lookup("DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("REFERENCE_DATA_PATH") {
            self.reference_data_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("PROBE_URL") {
            self.probe_url = Some(value);
        }
        if let Some(value) = lookup("SYNC_INTERVAL_SECONDS") {
            self.sync.sync_interval_seconds = parse_number("SYNC_INTERVAL_SECONDS", &value)?;
        }
        if let Some(value) = lookup("REMOTE_TIMEOUT_SECONDS") {
            self.sync.remote_timeout_seconds = parse_number("REMOTE_TIMEOUT_SECONDS", &value)?;
        }
        if let Some(value) = lookup("ITEM_DELAY_MS") {
            self.sync.item_delay_ms = parse_number("ITEM_DELAY_MS", &value)?;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for url in [&self.ledger_url, &self.index_url, &self.probe_url].into_iter().flatten() {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl(url.clone()));
            }
        }
        self.sync.validate()
    }

    /// Ledger URL or an error naming the missing key
    pub fn require_ledger_url(&self) -> Result<&str, ConfigError> {
        self.ledger_url.as_deref().ok_or(ConfigError::MissingValue("ledger_url"))
    }

    /// Index URL or an error naming the missing key
    pub fn require_index_url(&self) -> Result<&str, ConfigError> {
        self.index_url.as_deref().ok_or(ConfigError::MissingValue("index_url"))
    }

    /// Database path, defaulting to `<data dir>/attendsync/queue.db`
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
            path.push("attendsync");
            path.push("queue.db");
            path
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber(key, value.to_string()))
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    pub fn ledger_url(mut self, url: impl Into<String>) -> Self {
        self.config.ledger_url = Some(url.into());
        self
    }

    pub fn index_url(mut self, url: impl Into<String>) -> Self {
        self.config.index_url = Some(url.into());
        self
    }

    pub fn index_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.index_api_key = Some(key.into());
        self
    }

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = Some(path.into());
        self
    }

    pub fn reference_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.reference_data_path = Some(path.into());
        self
    }

    pub fn sync(mut self, sync: SyncConfig) -> Self {
        self.config.sync = sync;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
    #[error("invalid number for {0}: {1}")]
    InvalidNumber(&'static str, String),
    #[error("failed to read config: {0}")]
    Io(String),
    #[error("failed to parse config: {0}")]
    Parse(String),
}
