//! # Logging
//!
//! Sets up an `env_logger` backend for the `log` facade from a [`LogConfig`],
//! with per-module levels for the engine's own modules.

pub mod config;

pub use config::LogConfig;

use config::parse_level;
use once_cell::sync::OnceCell;
use std::io::Write;

/// Configuration the logger was initialized with
static LOGGING_CONFIG: OnceCell<LogConfig> = OnceCell::new();

pub struct LoggingSystem;

impl LoggingSystem {
    /// Initialize logging from `FOLD_TRANSFORM_LOG_*` variables and defaults
    pub fn init_default() -> Result<(), LoggingError> {
        Self::init_with_config(LogConfig::from_env()?)
    }

    /// Initialize logging with a custom configuration
    pub fn init_with_config(config: LogConfig) -> Result<(), LoggingError> {
        config.validate()?;
        let default_level = parse_level(&config.general.default_level)
            .unwrap_or(log::LevelFilter::Info);

        let mut builder = env_logger::Builder::new();
        builder.filter_level(default_level);
        for (feature, level) in &config.features {
            if let Some(level) = parse_level(level) {
                builder.filter_module(&format!("{}::{}", env!("CARGO_CRATE_NAME"), feature), level);
            }
        }

        let include_timestamp = config.console.include_timestamp;
        let include_module = config.console.include_module;
        builder.format(move |buf, record| {
            if include_timestamp {
                write!(buf, "{} ", buf.timestamp())?;
            }
            write!(buf, "{:<5} ", record.level())?;
            if include_module {
                write!(buf, "[{}] ", record.module_path().unwrap_or_default())?;
            }
            writeln!(buf, "{}", record.args())
        });
        builder
            .try_init()
            .map_err(|_| LoggingError::AlreadyInitialized)?;

        LOGGING_CONFIG
            .set(config)
            .map_err(|_| LoggingError::AlreadyInitialized)?;
        Ok(())
    }

    /// The configuration logging was initialized with
    pub fn get_config() -> Option<&'static LogConfig> {
        LOGGING_CONFIG.get()
    }
}

/// Logging system errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Logging system already initialized")]
    AlreadyInitialized,
    #[error("Config error: {0}")]
    ConfigError(#[from] config::ConfigError),
}

/// Initialize logging from a TOML file when given, else from the environment.
pub fn init(config_path: Option<&str>) -> Result<(), LoggingError> {
    match config_path {
        Some(path) => LoggingSystem::init_with_config(LogConfig::from_file(path)?),
        None => LoggingSystem::init_default(),
    }
}
