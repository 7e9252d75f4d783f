//! Logging initialisation and configuration.
//!
//! # Design
//! - Centralises logging setup (fmt or JSON) with a single entry point.
//! - `RUST_LOG` always wins over the configured level.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

/// Default logging target when `RUST_LOG` is not provided.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Log level string (e.g., `info`, `debug`).
    pub level: &'a str,
    /// Output format selection for the tracing subscriber.
    pub format: LogFormat,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
        }
    }
}

/// Available output formats for the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output.
    Full,
    /// Structured JSON output for log shippers.
    Json,
}

impl LogFormat {
    /// Pick JSON when stdout is not a terminal, human output otherwise.
    #[must_use]
    pub fn infer() -> Self {
        if std::io::IsTerminal::is_terminal(&std::io::stdout()) {
            Self::Full
        } else {
            Self::Json
        }
    }
}

/// Configure and install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the tracing subscriber cannot be installed (for
/// example, because another subscriber has already been set globally).
pub fn init_logging(config: &LoggingConfig<'_>) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level));

    let builder = fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true);

    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Full => builder.try_init(),
    };

    result.map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_info_level() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn infer_picks_a_format_without_panicking() {
        let format = LogFormat::infer();
        assert!(matches!(format, LogFormat::Full | LogFormat::Json));
    }
}
