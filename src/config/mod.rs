//! Configuration loading
//!
//! `config.toml` lives in the data directory next to the storage blob.
//! Loading merges the file over built-in defaults one optional section at
//! a time; a missing or unparseable file just means defaults. An example
//! config is written on first run so users have something to edit.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::nav::{UrlClassifier, DEFAULT_APP_HOST};
use crate::track::{WatchdogConfig, DEFAULT_SEND_PATTERNS};
use crate::util::paths::config_path;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// App host the tracker accepts URLs from. `None` disables host
    /// checking entirely.
    pub host: Option<String>,
    /// Send-button descriptor patterns, defaults plus any from the config
    /// file.
    pub send_patterns: Vec<String>,
    /// Crash detector timing
    pub watchdog: WatchdogConfig,
    /// Default log level, used when storage carries no `logConfig`
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: Some(DEFAULT_APP_HOST.to_string()),
            send_patterns: DEFAULT_SEND_PATTERNS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
            watchdog: WatchdogConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, merging with defaults
    pub fn load() -> Self {
        let mut config = Config::default();

        let config_file = config_path();

        // Create example config on first run
        if !config_file.exists() {
            Self::create_default_config(&config_file);
        }

        if config_file.exists() {
            if let Ok(contents) = fs::read_to_string(&config_file) {
                match toml::from_str::<TomlConfig>(&contents) {
                    Ok(toml_config) => config.merge(toml_config),
                    Err(e) => {
                        tracing::warn!(
                            path = %config_file.display(),
                            "Ignoring unparseable config file: {e}"
                        );
                    }
                }
            }
        }

        config
    }

    fn merge(&mut self, toml_config: TomlConfig) {
        if let Some(tracker) = toml_config.tracker {
            if let Some(host) = tracker.host {
                // An empty host string disables host checking
                self.host = if host.is_empty() { None } else { Some(host) };
            }
            if let Some(extra) = tracker.send_patterns {
                self.send_patterns.extend(extra);
            }
        }

        if let Some(watchdog) = toml_config.watchdog {
            if let Some(secs) = watchdog.check_interval_secs {
                self.watchdog.check_interval = Duration::from_secs(secs);
            }
            if let Some(secs) = watchdog.stall_secs {
                self.watchdog.stall_after = Duration::from_secs(secs);
            }
        }

        if let Some(logging) = toml_config.logging {
            if let Some(level) = logging.level {
                self.log_level = level;
            }
        }
    }

    /// Classifier over the configured host.
    pub fn classifier(&self) -> UrlClassifier {
        match &self.host {
            Some(host) => UrlClassifier::with_host(host),
            None => UrlClassifier::any_host(),
        }
    }

    /// Create the default config file from the bundled example
    fn create_default_config(path: &PathBuf) {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    eprintln!("Failed to create config directory: {}", e);
                    return;
                }
            }
        }

        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            eprintln!("Failed to write default config: {}", e);
        }
    }
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub tracker: Option<TomlTrackerConfig>,
    pub watchdog: Option<TomlWatchdogConfig>,
    pub logging: Option<TomlLoggingConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlTrackerConfig {
    pub host: Option<String>,
    pub send_patterns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlWatchdogConfig {
    pub check_interval_secs: Option<u64>,
    pub stall_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlLoggingConfig {
    pub level: Option<String>,
}
