//! Logging setup and the default error handler.
//!
//! The engine logs through `tracing`. [`Logger`] installs a `fmt`
//! subscriber whose level can be changed while running.

use async_trait::async_trait;
use hataori_core::{Context, ErrorHandler, WorkflowError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt as tracing_fmt, reload, Registry};

/// Severity of a log message, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Lifecycle progress.
    #[default]
    Info,
    /// Ignored or suspicious operations.
    Warn,
    /// Failures.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(WorkflowError::Configuration(format!(
                "unknown log level '{}'",
                other
            ))),
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// Process-wide log output with an adjustable threshold.
///
/// Only messages at or above the configured level are emitted.
pub struct Logger {
    handle: reload::Handle<LevelFilter, Registry>,
    level: Mutex<LogLevel>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("level", &self.level()).finish()
    }
}

impl Logger {
    /// Installs the global subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Configuration`] if a global subscriber is
    /// already installed.
    pub fn install(level: LogLevel) -> Result<Self, WorkflowError> {
        let (filter, handle) = reload::Layer::new(LevelFilter::from(level));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_fmt::layer())
            .try_init()
            .map_err(|e| {
                WorkflowError::Configuration(format!("logger already installed: {}", e))
            })?;
        Ok(Self {
            handle,
            level: Mutex::new(level),
        })
    }

    /// Returns the current threshold.
    pub fn level(&self) -> LogLevel {
        *self.level.lock()
    }

    /// Changes the threshold.
    pub fn set_level(&self, level: LogLevel) -> Result<(), WorkflowError> {
        self.handle
            .modify(|filter| *filter = LevelFilter::from(level))
            .map_err(|e| WorkflowError::Configuration(format!("cannot change log level: {}", e)))?;
        *self.level.lock() = level;
        Ok(())
    }

    /// Logs `message` at `level`.
    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => debug!("{}", message),
            LogLevel::Info => info!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }
    }

    /// Logs at debug level.
    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    /// Logs at info level.
    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Logs at warn level.
    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    /// Logs at error level.
    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Error handler that writes every failure to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingErrorHandler;

#[async_trait]
impl ErrorHandler for LoggingErrorHandler {
    async fn handle_error(&self, error: &WorkflowError, ctx: &Context) {
        error!(elapsed = ?ctx.elapsed(), "{}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("verbose".parse::<LogLevel>().is_err());

        let level: LogLevel = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(level, LogLevel::Error);
    }

    #[test]
    fn test_install_and_set_level() {
        let logger = Logger::install(LogLevel::Warn).unwrap();
        assert_eq!(logger.level(), LogLevel::Warn);

        logger.set_level(LogLevel::Debug).unwrap();
        assert_eq!(logger.level(), LogLevel::Debug);
        logger.debug("visible at debug level");

        assert!(matches!(
            Logger::install(LogLevel::Info),
            Err(WorkflowError::Configuration(_))
        ));
    }
}
