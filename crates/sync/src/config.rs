// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration.
//!
//! Loaded from a TOML file. Every field has a default, so an empty file is a
//! valid configuration:
//!
//! ```toml
//! server_url = "ws://localhost:7890"
//! database = "chat.db"
//!
//! [reconnect]
//! max_retries = 0
//!
//! [scheduler]
//! retry_mode = "independent"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid server URL '{0}'\n  hint: the URL must start with ws:// or wss://")]
    InvalidUrl(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// WebSocket URL of the chat server.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Database path. Relative paths resolve against the config file's directory.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Reconnection and heartbeat settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Connection attempts per round before pausing (0 = unlimited).
    #[serde(default)]
    pub max_retries: u32,
    /// Initial delay for exponential backoff (milliseconds).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Maximum delay between attempts (seconds).
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// Ping interval in milliseconds. 0 = disabled.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Max time to wait for a pong in milliseconds.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
}

/// How failed requests wait out their backoff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryMode {
    /// Each retry waits on its own timer; other requests keep flowing.
    #[default]
    Independent,
    /// The worker sleeps through the backoff, holding up the whole queue.
    StrictFifo,
}

/// Outbound scheduler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub retry_mode: RetryMode,
    /// Upper bound on the retry backoff (seconds).
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// Failures after which a request is abandoned. Absent = retry forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fail_count: Option<u32>,
    /// Reclassify requests left `in_flight` by a previous run as failed.
    #[serde(default = "default_true")]
    pub recover_in_flight: bool,
}

fn default_server_url() -> String {
    "ws://localhost:7890".to_string()
}

fn default_database() -> PathBuf {
    PathBuf::from("chat.db")
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_secs() -> u64 {
    30
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

fn default_max_backoff_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            max_retries: 0,
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnect attempt `attempt + 1`, after `attempt` failures.
    ///
    /// Doubles from `initial_delay_ms`, capped at `max_delay_secs`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let cap_ms = self.max_delay_secs.saturating_mul(1000);
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        Duration::from_millis(self.initial_delay_ms.saturating_mul(factor).min(cap_ms))
    }

    pub fn heartbeat_enabled(&self) -> bool {
        self.heartbeat_interval_ms > 0
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            retry_mode: RetryMode::default(),
            max_backoff_secs: default_max_backoff_secs(),
            max_fail_count: None,
            recover_in_flight: true,
        }
    }
}

impl SchedulerConfig {
    /// Wait before retrying a request that has failed `fail_count` times:
    /// `2^fail_count` seconds, capped at `max_backoff_secs`.
    pub fn backoff(&self, fail_count: u32) -> Duration {
        let secs = 1u64.checked_shl(fail_count).unwrap_or(u64::MAX);
        Duration::from_secs(secs.min(self.max_backoff_secs))
    }

    /// Whether a request with this many failures has used up its retries.
    pub fn is_exhausted(&self, fail_count: u32) -> bool {
        self.max_fail_count.is_some_and(|max| fail_count >= max)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            server_url: default_server_url(),
            database: default_database(),
            reconnect: ReconnectConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a config file. A relative `database` path is resolved against
    /// the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        if config.database.is_relative() {
            if let Some(dir) = path.parent() {
                config.database = dir.join(&config.database);
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.server_url;
        let host = url
            .strip_prefix("ws://")
            .or_else(|| url.strip_prefix("wss://"))
            .ok_or_else(|| ConfigError::InvalidUrl(url.clone()))?;
        if host.is_empty() {
            return Err(ConfigError::InvalidUrl(url.clone()));
        }
        if self.reconnect.initial_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "reconnect.initial_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.reconnect.heartbeat_enabled() && self.reconnect.heartbeat_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "reconnect.heartbeat_timeout_ms must be greater than 0 when heartbeats are enabled"
                    .to_string(),
            ));
        }
        if self.scheduler.max_backoff_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.max_backoff_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Serializes to TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
