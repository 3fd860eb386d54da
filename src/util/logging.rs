//! Logging setup with a runtime-reloadable level
//!
//! The subscriber writes to `<data-dir>/logs/gemwatch.log` with ANSI
//! disabled. The level filter sits behind a reload handle so the embedder
//! can change verbosity at runtime through the `logConfig` storage key
//! without restarting the tracker.

use std::fs::OpenOptions;
use std::io;
use std::sync::Arc;
use std::sync::OnceLock;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

use crate::store::KvStore;

/// Storage key holding the user's log configuration.
pub const LOG_CONFIG_KEY: &str = "logConfig";

/// Log configuration as stored under [`LOG_CONFIG_KEY`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// An `EnvFilter` directive, e.g. "debug" or "gemwatch=trace".
    pub level: String,
}

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Initialize the global subscriber, writing to the log file.
///
/// `RUST_LOG` overrides `default_level` at startup; once running, the
/// storage-backed config applied through [`LogCache::apply`] takes
/// precedence over both. Call once from the binary entry point.
pub fn init_logging(default_level: &str) -> io::Result<()> {
    std::fs::create_dir_all(crate::util::logs_dir())?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(crate::util::log_file_path())?;

    let filter = match std::env::var("RUST_LOG") {
        Ok(env) => EnvFilter::try_new(env),
        Err(_) => EnvFilter::try_new(default_level),
    }
    .unwrap_or_else(|_| EnvFilter::new("info"));

    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(log_file)
                .with_ansi(false), // Disable ANSI colors in log file
        )
        .init();

    let _ = FILTER_HANDLE.set(handle);
    Ok(())
}

/// Read-through cache over the stored log config.
///
/// Reads hit storage only while the cache is empty; `invalidate` empties
/// it, which is what the `invalidateLogConfigCache` action and a
/// `logConfig` change notice do.
#[derive(Debug, Clone, Default)]
pub struct LogCache {
    cached: Arc<Mutex<Option<LogConfig>>>,
}

impl LogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the log level from storage, reading through the cache.
    ///
    /// Falls back to `fallback_level` when storage has no `logConfig`
    /// key. An unparseable stored level is logged and ignored, keeping
    /// the current filter. Returns the config that ended up applied.
    pub fn apply(&self, store: &KvStore, fallback_level: &str) -> LogConfig {
        let cached = self.cached.lock().clone();
        let config = match cached {
            Some(config) => config,
            None => {
                let fresh = match store.get_as::<LogConfig>(LOG_CONFIG_KEY) {
                    Ok(Some(config)) => config,
                    Ok(None) => LogConfig {
                        level: fallback_level.to_string(),
                    },
                    Err(e) => {
                        tracing::warn!("Failed to read {LOG_CONFIG_KEY} from storage: {e}");
                        LogConfig {
                            level: fallback_level.to_string(),
                        }
                    }
                };
                *self.cached.lock() = Some(fresh.clone());
                fresh
            }
        };

        if let Some(handle) = FILTER_HANDLE.get() {
            match EnvFilter::try_new(&config.level) {
                Ok(filter) => {
                    if let Err(e) = handle.reload(filter) {
                        tracing::warn!("Failed to swap log filter: {e}");
                    } else {
                        tracing::debug!(level = %config.level, "log filter applied");
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        level = %config.level,
                        "Ignoring invalid log level from storage: {e}"
                    );
                }
            }
        }

        config
    }

    /// Drop the cached config so the next [`LogCache::apply`] re-reads
    /// storage.
    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }

    /// The config currently cached, if any has been read.
    pub fn cached(&self) -> Option<LogConfig> {
        self.cached.lock().clone()
    }
}
