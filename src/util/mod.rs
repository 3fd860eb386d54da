//! Utility modules

pub mod logging;
pub mod paths;

pub use logging::{init_logging, LogCache, LogConfig, LOG_CONFIG_KEY};
pub use paths::{
    config_path, data_dir, exports_dir, init_data_dir, log_file_path, logs_dir, storage_path,
};
