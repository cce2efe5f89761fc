//! Logging initialization
//!
//! Structured `tracing` output to the console, optionally mirrored to a
//! daily-rotated log file. The filter comes from the config but
//! `RUST_LOG` wins, so operators can turn on debug output without a
//! config change.

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::core::config::LoggingSettings;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to initialize logging: {reason}")]
    Init { reason: String },

    #[error("Failed to create log directory: {0}")]
    Directory(#[from] std::io::Error),
}

/// Initialize the global subscriber
///
/// Returns the file writer's guard when file output is enabled; drop it
/// only at process exit or buffered log lines are lost.
pub fn init(settings: &LoggingSettings) -> Result<Option<WorkerGuard>, LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.clone()));

    let console_layer = if settings.json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    match &settings.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = rolling::daily(dir, "chimera-store.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_ansi(false).with_writer(writer);
            registry
                .with(file_layer)
                .try_init()
                .map_err(|e| LoggingError::Init {
                    reason: e.to_string(),
                })?;
            Ok(Some(guard))
        }
        None => {
            registry.try_init().map_err(|e| LoggingError::Init {
                reason: e.to_string(),
            })?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests;
