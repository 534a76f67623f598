//! Structured logging configuration.
//!
//! Thin wrapper over `tracing-subscriber` driven by
//! [`LoggingConfig`](crate::config::LoggingConfig). Honors `RUST_LOG` when
//! set, falling back to the configured level.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{BusError, Result};

/// Initialize the global tracing subscriber from `config`.
///
/// Returns an error if a subscriber is already installed or the log file
/// cannot be opened.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if config.log_to_file {
        let path = config
            .log_file_path
            .as_deref()
            .ok_or_else(|| BusError::ConfigError("log_file_path not set".to_string()))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| BusError::ConfigError(format!("Failed to open log file: {e}")))?;
        if config.json_format {
            builder.json().with_writer(Mutex::new(file)).try_init()
        } else {
            builder.with_writer(Mutex::new(file)).try_init()
        }
    } else if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| BusError::ConfigError(format!("Failed to install subscriber: {e}")))?;

    info!(app = %config.app_name, "logging initialized");
    Ok(())
}
