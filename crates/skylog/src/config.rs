//! Configuration management for skylog.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Datelike;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "skylog";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "skylog.db";

/// Default storage key for the saved-log collection.
pub const DEFAULT_SAVED_LOGS_KEY: &str = "skylog_saved_logs";

/// Prefix of environment variables read as configuration.
const ENV_PREFIX: &str = "SKYLOG_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SKYLOG_`, sections split on `__`)
/// 2. TOML config file at `~/.config/skylog/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Auto-save configuration.
    pub autosave: AutosaveConfig,
    /// Undo history configuration.
    pub history: HistoryConfig,
    /// Logbook defaults.
    pub logbook: LogbookConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/skylog/skylog.db`
    pub database_path: Option<PathBuf>,
    /// Key under which the saved-log collection is stored.
    pub saved_logs_key: String,
}

/// Auto-save configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Save automatically after changes to an already-saved log.
    pub enabled: bool,
    /// Quiet period after the last change before saving, in milliseconds.
    pub delay_ms: u64,
    /// How long the saving indicator stays up, in milliseconds.
    pub indicator_ms: u64,
}

/// Undo history configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Number of undo steps kept.
    pub capacity: usize,
}

/// Logbook defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogbookConfig {
    /// Year used for new logs. Defaults to the current year.
    pub default_year: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            saved_logs_key: DEFAULT_SAVED_LOGS_KEY.to_string(),
        }
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: 3000,
            indicator_ms: 800,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: crate::history::DEFAULT_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(Error::ConfigValidation { message });

        if self.storage.saved_logs_key.trim().is_empty() {
            return invalid("saved_logs_key must not be empty".to_string());
        }

        if self.autosave.delay_ms == 0 {
            return invalid("delay_ms must be greater than 0".to_string());
        }

        if self.autosave.indicator_ms == 0 {
            return invalid("indicator_ms must be greater than 0".to_string());
        }

        if self.history.capacity == 0 {
            return invalid("history capacity must be greater than 0".to_string());
        }

        if let Some(year) = &self.logbook.default_year {
            if !is_valid_year(year) {
                return invalid(format!("default_year must be a four-digit year: {year}"));
            }
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the auto-save quiet period as a Duration.
    #[must_use]
    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave.delay_ms)
    }

    /// Get the saving-indicator duration as a Duration.
    #[must_use]
    pub fn indicator_duration(&self) -> Duration {
        Duration::from_millis(self.autosave.indicator_ms)
    }

    /// The year given to new logs.
    #[must_use]
    pub fn default_year(&self) -> String {
        self.logbook
            .default_year
            .clone()
            .unwrap_or_else(|| chrono::Local::now().year().to_string())
    }
}

/// Whether `year` is a four-digit year.
#[must_use]
pub fn is_valid_year(year: &str) -> bool {
    year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit())
}
