//! Logging setup
//!
//! `RUST_LOG` wins over the configured level; `--debug` wins over both.
//! When a log directory is configured a second, plain-text layer writes to
//! a daily-rolling file through a non-blocking writer. Keep the returned
//! guard alive for the lifetime of the process or buffered lines are lost.

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{PetkitError, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

const LOG_FILE_PREFIX: &str = "petkit-monitor.log";

/// Build the filter from `--debug`, `RUST_LOG` and the configured level
pub fn build_filter(config: &LoggingConfig, debug: bool) -> Result<EnvFilter> {
    if debug {
        return Ok(EnvFilter::new("debug"));
    }
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            PetkitError::config(format!("Invalid log level '{}': {e}", config.level))
        }),
    }
}

/// Install the global subscriber
pub fn init_logging(config: &LoggingConfig, debug: bool) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(config, debug)?;

    let console: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Compact => fmt::layer().compact().boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
    };

    let (file_layer, guard) = match &config.file {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .with(filter)
        .try_init()
        .map_err(|e| PetkitError::config(format!("Failed to initialise logging: {e}")))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_debug_flag_overrides_level() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            ..LoggingConfig::default()
        };
        let filter = build_filter(&config, true).unwrap();
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    #[serial]
    fn test_configured_level_used_without_rust_log() {
        temp_env::with_var_unset("RUST_LOG", || {
            let config = LoggingConfig {
                level: "petkit_feeder_rust=trace,warn".to_string(),
                ..LoggingConfig::default()
            };
            let filter = build_filter(&config, false).unwrap();
            assert!(filter.to_string().contains("petkit_feeder_rust=trace"));
        });
    }
}
