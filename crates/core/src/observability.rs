//! Structured logging setup
//!
//! Library code only emits `tracing` events; binaries call [`init_logging`] once
//! at startup to install a `tracing-subscriber` formatter.
//!
//! # Environment Variables
//!
//! - `LATENT_RANK_LOG_LEVEL` (optional): One of `trace`, `debug`, `info`, `warn`
//!   or `error` (default: "info"). Per-target filter directives go in `RUST_LOG`,
//!   which takes precedence when set.
//! - `LATENT_RANK_LOG_FORMAT` (optional): `json` or `pretty` (default: "pretty")

use crate::config::{env_key, ConfigLoader};
use crate::error::LatentRankError;
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Output format of the log formatter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event
    Json,
    /// Human readable multi-line output
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl ConfigLoader for LogConfig {
    fn from_env() -> Result<Self, LatentRankError> {
        let level = std::env::var(env_key("LOG_LEVEL")).unwrap_or_else(|_| LogConfig::default().level);

        let format = match std::env::var(env_key("LOG_FORMAT")) {
            Ok(raw) => raw
                .parse::<LogFormat>()
                .map_err(|e| LatentRankError::config(e, &env_key("LOG_FORMAT")))?,
            Err(_) => LogConfig::default().format,
        };

        Ok(Self { level, format })
    }

    fn validate(&self) -> Result<(), LatentRankError> {
        if !VALID_LOG_LEVELS.contains(&self.level.to_lowercase().as_str()) {
            return Err(LatentRankError::config(
                format!(
                    "Invalid log_level '{}'. Must be one of: {}",
                    self.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
                &env_key("LOG_LEVEL"),
            ));
        }

        Ok(())
    }
}

/// Install the global tracing subscriber
///
/// Returns `Ok(false)` when a global subscriber was already installed (tests and
/// embedding applications commonly do this), `Ok(true)` otherwise.
pub fn init_logging(config: &LogConfig) -> Result<bool, LatentRankError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            LatentRankError::config(
                format!("Invalid log filter '{}': {}", config.level, e),
                &env_key("LOG_LEVEL"),
            )
        })?,
    };

    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
            .is_ok(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
            .is_ok(),
    };

    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_log_config_rejects_filter_directive() {
        let config = LogConfig {
            level: "latent_rank_bpr=debug".to_string(),
            format: LogFormat::Pretty,
        };
        assert!(matches!(
            config.validate(),
            Err(LatentRankError::ConfigurationError { .. })
        ));
    }

    #[test]
    fn test_log_config_validation_invalid_level() {
        let config = LogConfig {
            level: "verbose".to_string(),
            format: LogFormat::Json,
        };

        match config.validate().unwrap_err() {
            LatentRankError::ConfigurationError { message, .. } => {
                assert!(message.contains("Invalid log_level"));
            }
            _ => panic!("Expected ConfigurationError"),
        }
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        let config = LogConfig::default();
        let _ = init_logging(&config).unwrap();
        assert!(!init_logging(&config).unwrap());
    }
}
