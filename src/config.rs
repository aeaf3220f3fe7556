//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section may be omitted; missing fields fall back to their defaults.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FpvAidError, Result};
use crate::settings::Settings;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sensor liveness configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_stale_check_interval_ms")]
    pub stale_check_interval_ms: u64,

    #[serde(default = "default_stale_threshold_ms")]
    pub stale_threshold_ms: u64,
}

/// Flight probe configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ProbeConfig {
    #[serde(default = "default_throttle_poll_ms")]
    pub throttle_poll_ms: u64,
}

/// Batch recorder configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RecorderConfig {
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    #[serde(default = "default_stick_sample_interval_ms")]
    pub stick_sample_interval_ms: u64,
}

/// SQLite store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily-rotated log files (console only when unset)
    #[serde(default)]
    pub file_dir: Option<PathBuf>,
}

// Default value functions
fn default_stale_check_interval_ms() -> u64 { 2000 }
fn default_stale_threshold_ms() -> u64 { 3000 }

fn default_throttle_poll_ms() -> u64 { 100 }

fn default_flush_interval_ms() -> u64 { 2000 }
fn default_stick_sample_interval_ms() -> u64 { 20 }

fn default_store_path() -> PathBuf { PathBuf::from("./data/fpv-aid.db") }

fn default_log_level() -> String { "info".to_string() }

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            stale_check_interval_ms: default_stale_check_interval_ms(),
            stale_threshold_ms: default_stale_threshold_ms(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { throttle_poll_ms: default_throttle_poll_ms() }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            stick_sample_interval_ms: default_stick_sample_interval_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), file_dir: None }
    }
}

impl TelemetryConfig {
    pub fn stale_check_interval(&self) -> Duration {
        Duration::from_millis(self.stale_check_interval_ms)
    }
}

impl ProbeConfig {
    pub fn throttle_poll(&self) -> Duration {
        Duration::from_millis(self.throttle_poll_ms)
    }
}

impl RecorderConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn stick_sample_interval(&self) -> Duration {
        Duration::from_millis(self.stick_sample_interval_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use fpv_aid::config::Config;
    ///
    /// let config = Config::load("fpv-aid.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        self.settings.validate()?;

        if self.telemetry.stale_check_interval_ms == 0 || self.telemetry.stale_check_interval_ms > 60000 {
            return Err(FpvAidError::InvalidSettings(
                "stale_check_interval_ms must be between 1 and 60000".into(),
            ));
        }

        if self.telemetry.stale_threshold_ms == 0 {
            return Err(FpvAidError::InvalidSettings(
                "stale_threshold_ms must be greater than 0".into(),
            ));
        }

        if self.probe.throttle_poll_ms == 0 || self.probe.throttle_poll_ms > 10000 {
            return Err(FpvAidError::InvalidSettings(
                "throttle_poll_ms must be between 1 and 10000".into(),
            ));
        }

        if self.recorder.flush_interval_ms == 0 || self.recorder.flush_interval_ms > 60000 {
            return Err(FpvAidError::InvalidSettings(
                "flush_interval_ms must be between 1 and 60000".into(),
            ));
        }

        if self.recorder.stick_sample_interval_ms == 0
            || self.recorder.stick_sample_interval_ms > self.recorder.flush_interval_ms
        {
            return Err(FpvAidError::InvalidSettings(
                "stick_sample_interval_ms must be between 1 and flush_interval_ms".into(),
            ));
        }

        if self.store.path.as_os_str().is_empty() {
            return Err(FpvAidError::InvalidSettings("store path cannot be empty".into()));
        }

        if self.logging.level.trim().is_empty() {
            return Err(FpvAidError::InvalidSettings("logging level cannot be empty".into()));
        }

        Ok(())
    }
}
