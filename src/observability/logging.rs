//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` takes precedence;
//! otherwise the configured level applies to every target. Output is JSON
//! for log shipping or a human-readable format for local runs.

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::config::LoggingConfig;
use crate::core::error::{ProxyError, ProxyResult};

/// Build the filter: `RUST_LOG` when set, else the configured level
pub fn env_filter(config: &LoggingConfig) -> ProxyResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| ProxyError::config(format!("Invalid log level '{}': {}", config.level, e))),
    }
}

/// Initialize the global subscriber
///
/// Fails if a subscriber has already been installed.
pub fn init_logging(config: &LoggingConfig) -> ProxyResult<()> {
    let filter = env_filter(config)?;

    let result = match config.format.as_str() {
        "pretty" => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).pretty())
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
    };

    result.map_err(|e| ProxyError::internal(format!("Failed to initialize logging: {}", e)))?;

    info!(format = %config.format, "📊 Logging initialized");
    Ok(())
}
