//! Path utilities for gemwatch data directories

use std::path::PathBuf;
use std::sync::OnceLock;

/// Global storage for custom data directory path
static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Initialize the data directory with an optional custom path.
/// Must be called early in main() before any other path functions are used.
/// If custom_path is None, uses the default ~/.gemwatch location.
pub fn init_data_dir(custom_path: Option<PathBuf>) {
    let path = custom_path.unwrap_or_else(default_data_dir);
    // Ignore error if already set (shouldn't happen in normal usage)
    if DATA_DIR.set(path.clone()).is_err() {
        let existing = DATA_DIR
            .get()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        tracing::debug!(
            path = %path.display(),
            existing = %existing,
            "Data directory already initialized"
        );
    }
}

/// Get the default data directory path (~/.gemwatch)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".gemwatch"))
        .unwrap_or_else(|| PathBuf::from(".gemwatch"))
}

/// Get the base gemwatch data directory.
/// Returns the custom path if set via init_data_dir(), otherwise ~/.gemwatch
pub fn data_dir() -> PathBuf {
    DATA_DIR.get().cloned().unwrap_or_else(default_data_dir)
}

/// Get the storage blob path (~/.gemwatch/storage.json)
pub fn storage_path() -> PathBuf {
    data_dir().join("storage.json")
}

/// Get the logs directory (~/.gemwatch/logs)
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Get the default log file path (~/.gemwatch/logs/gemwatch.log)
pub fn log_file_path() -> PathBuf {
    logs_dir().join("gemwatch.log")
}

/// Get the config file path (~/.gemwatch/config.toml)
pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

/// Get the default directory for history exports (~/.gemwatch/exports)
pub fn exports_dir() -> PathBuf {
    data_dir().join("exports")
}
