//! Configuration management for the session engine.

use crate::{ConfigError, ConfigResult, Paths, ProviderConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default auth API base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api/auth";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Interval used when periodic refresh is enabled with `true`.
const DEFAULT_PERIODIC_INTERVAL_MS: u64 = 1000;

/// Longest accepted periodic refresh interval (one day).
pub const MAX_PERIODIC_INTERVAL_MS: u64 = 24 * 60 * 60 * 1000;

/// Periodic refresh switch: `false`, `true` (every second) or an interval in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Periodic {
    Enabled(bool),
    Millis(u64),
}

impl Default for Periodic {
    fn default() -> Self {
        Periodic::Enabled(false)
    }
}

/// Session refresh triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionRefreshConfig {
    pub enable_periodically: Periodic,
    pub enable_on_window_focus: bool,
}

impl Default for SessionRefreshConfig {
    fn default() -> Self {
        Self {
            enable_periodically: Periodic::default(),
            enable_on_window_focus: true,
        }
    }
}

impl SessionRefreshConfig {
    /// Periodic refresh interval, if enabled.
    pub fn interval(&self) -> Option<Duration> {
        match self.enable_periodically {
            Periodic::Enabled(false) => None,
            Periodic::Enabled(true) => Some(Duration::from_millis(DEFAULT_PERIODIC_INTERVAL_MS)),
            Periodic::Millis(0) => None,
            Periodic::Millis(ms) => Some(Duration::from_millis(ms)),
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if let Periodic::Millis(ms) = self.enable_periodically {
            if ms > MAX_PERIODIC_INTERVAL_MS {
                return Err(ConfigError::Invalid(format!(
                    "session_refresh.enable_periodically must be at most {} ms, got {}",
                    MAX_PERIODIC_INTERVAL_MS, ms
                )));
            }
        }
        Ok(())
    }
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL every provider endpoint is resolved against.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Active provider and its endpoint contract.
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub session_refresh: SessionRefreshConfig,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            provider: ProviderConfig::default(),
            session_refresh: SessionRefreshConfig::default(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    /// Environment variables win over the file.
    pub fn load(paths: &Paths) -> ConfigResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> ConfigResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `AUTHSTATE_BASE_URL` and `AUTHSTATE_LOG_LEVEL` from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base_url) = lookup("AUTHSTATE_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.base_url = base_url.trim().to_string();
        }
        if let Some(log_level) = lookup("AUTHSTATE_LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
            self.log_level = log_level.trim().to_string();
        }
    }

    /// Get the base URL as a parsed URL.
    pub fn base_url(&self) -> ConfigResult<Url> {
        Url::parse(&self.base_url).map_err(ConfigError::from)
    }

    /// Validate the whole configuration. Called once before the engine starts.
    pub fn validate(&self) -> ConfigResult<()> {
        let url = self.base_url()?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!(
                "base_url {:?} cannot be used as a base",
                self.base_url
            )));
        }
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "base_url must be http or https, got {}",
                url.scheme()
            )));
        }
        self.session_refresh.validate()?;
        self.provider.validate()
    }
}
