// SPDX-License-Identifier: MPL-2.0
//! This module handles the crate's configuration, including loading and saving
//! tuning values to a `settings.toml` file.
//!
//! # Examples
//!
//! ```no_run
//! use app_vitals::config::{self, Config};
//! use app_vitals::domain::diagnostics::BufferCapacity;
//! use std::path::PathBuf;
//!
//! // Load existing configuration
//! let mut config = config::load().unwrap_or_default();
//!
//! // Modify a setting
//! config.logger_capacity = BufferCapacity::new(500);
//!
//! // Save the modified configuration
//! config::save(&config).expect("Failed to save config");
//!
//! // To load/save from a specific path (e.g., for testing)
//! let temp_dir = PathBuf::from("./temp_config_dir");
//! std::fs::create_dir_all(&temp_dir).unwrap();
//! let temp_file = temp_dir.join("test_settings.toml");
//! config::save_to_path(&config, &temp_file).expect("Failed to save to path");
//! let loaded_config = config::load_from_path(&temp_file).expect("Failed to load from path");
//! assert_eq!(loaded_config.logger_capacity.value(), 500);
//! std::fs::remove_dir_all(&temp_dir).unwrap();
//! ```

mod defaults;

pub use defaults::*;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::paths;
use crate::diagnostics::{DuplicateTracePolicy, RedactionPolicy};
use crate::domain::diagnostics::{BufferCapacity, LogLevel};
use crate::error::Result;

const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logger_capacity: BufferCapacity,
    pub error_capacity: BufferCapacity,
    pub performance_capacity: BufferCapacity,
    /// Minimum level used until a persisted logger setting overrides it.
    pub default_log_level: LogLevel,
    pub recent_error_window_secs: u64,
    pub recent_error_threshold: usize,
    pub memory_usage_threshold_percent: f32,
    pub recovery_log_threshold: usize,
    pub recovery_error_threshold: usize,
    /// Active traces older than this are dropped on the next `start_trace`.
    pub stale_trace_max_age_secs: Option<u64>,
    pub duplicate_trace_policy: DuplicateTracePolicy,
    pub export_redaction: RedactionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logger_capacity: BufferCapacity::new(DEFAULT_LOG_CAPACITY),
            error_capacity: BufferCapacity::new(DEFAULT_ERROR_CAPACITY),
            performance_capacity: BufferCapacity::new(DEFAULT_METRIC_CAPACITY),
            default_log_level: LogLevel::Debug,
            recent_error_window_secs: DEFAULT_RECENT_ERROR_WINDOW_SECS,
            recent_error_threshold: DEFAULT_RECENT_ERROR_THRESHOLD,
            memory_usage_threshold_percent: DEFAULT_MEMORY_USAGE_THRESHOLD_PERCENT,
            recovery_log_threshold: DEFAULT_RECOVERY_LOG_THRESHOLD,
            recovery_error_threshold: DEFAULT_RECOVERY_ERROR_THRESHOLD,
            stale_trace_max_age_secs: None,
            duplicate_trace_policy: DuplicateTracePolicy::default(),
            export_redaction: RedactionPolicy::default(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn recent_error_window(&self) -> Duration {
        Duration::from_secs(self.recent_error_window_secs)
    }

    #[must_use]
    pub fn stale_trace_max_age(&self) -> Option<Duration> {
        self.stale_trace_max_age_secs.map(Duration::from_secs)
    }
}

fn get_default_config_path() -> Option<PathBuf> {
    paths::get_app_config_dir().map(|mut path| {
        path.push(CONFIG_FILE);
        path
    })
}

pub fn load() -> Result<Config> {
    if let Some(path) = get_default_config_path() {
        if path.exists() {
            return load_from_path(&path);
        }
    }
    Ok(Config::default())
}

pub fn save(config: &Config) -> Result<()> {
    if let Some(path) = get_default_config_path() {
        return save_to_path(config, &path);
    }
    Ok(())
}

pub fn load_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    match toml::from_str(&content) {
        Ok(config) => Ok(config),
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "invalid config file, using defaults");
            Ok(Config::default())
        }
    }
}

pub fn save_to_path(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}
