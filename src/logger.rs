//! Structured logger handle.
//!
//! Library code never touches a global logger. Each component receives a
//! [`Logger`] at construction, names itself with [`Logger::named`] and binds
//! per-request context with [`Logger::with`]. Records go through the `log`
//! facade; the binary installs the subscriber once with [`init`] and calls
//! [`Logger::flush`] on shutdown.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::{Level, LevelFilter};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Root log target for the crate.
pub const ROOT_TARGET: &str = "whatsmeow_webhook";

/// Logger setup errors.
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("invalid log level: {0}")]
    InvalidLevel(String),
    #[error("invalid log format: {0} (expected \"text\" or \"json\")")]
    InvalidFormat(String),
    #[error("logger already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "console" | "" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(LoggerError::InvalidFormat(other.to_string())),
        }
    }
}

/// Cheap, cloneable logging handle with a target and bound fields.
#[derive(Debug, Clone)]
pub struct Logger {
    target: Arc<str>,
    context: Arc<[(String, String)]>,
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            target: Arc::from(ROOT_TARGET),
            context: Arc::from(Vec::new()),
        }
    }
}

impl Logger {
    /// Root logger for the crate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Child logger whose target is `<parent>::<name>`.
    pub fn named(&self, name: &str) -> Self {
        Self {
            target: Arc::from(format!("{}::{}", self.target, name)),
            context: Arc::clone(&self.context),
        }
    }

    /// Child logger with one more bound field.
    pub fn with(&self, key: &str, value: impl fmt::Display) -> Self {
        let mut context = self.context.to_vec();
        context.push((key.to_string(), value.to_string()));
        Self {
            target: Arc::clone(&self.target),
            context: Arc::from(context),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn log(&self, level: Level, message: fmt::Arguments<'_>) {
        if level > log::max_level() {
            return;
        }
        log::log!(target: &*self.target, level, "{}{}", message, Fields(&self.context));
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Level::Debug, format_args!("{message}"));
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.log(Level::Info, format_args!("{message}"));
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.log(Level::Warn, format_args!("{message}"));
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.log(Level::Error, format_args!("{message}"));
    }

    /// Flush buffered records. Called once at shutdown.
    pub fn flush(&self) {
        log::logger().flush();
    }
}

struct Fields<'a>(&'a [(String, String)]);

impl fmt::Display for Fields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in self.0 {
            if value.contains(char::is_whitespace) || value.is_empty() {
                write!(f, " {key}={value:?}")?;
            } else {
                write!(f, " {key}={value}")?;
            }
        }
        Ok(())
    }
}

/// Install the process-wide subscriber and return the root logger.
///
/// `RUST_LOG` takes precedence over `level` when set. `log` records from
/// dependencies are captured by the same subscriber.
pub fn init(level: &str, format: &str) -> Result<Logger, LoggerError> {
    let level_filter =
        LevelFilter::from_str(level).map_err(|_| LoggerError::InvalidLevel(level.to_string()))?;
    let format = LogFormat::from_str(format)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_filter.to_string().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false);

    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| LoggerError::AlreadyInitialized(e.to_string()))?;

    Ok(Logger::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_logger_target() {
        let logger = Logger::new().named("bridge").named("relay");
        assert_eq!(logger.target(), "whatsmeow_webhook::bridge::relay");
    }

    #[test]
    fn test_bound_fields_render() {
        let logger = Logger::new()
            .with("phone", "+6281234")
            .with("msg_id", "ABC")
            .with("reason", "not found");
        assert_eq!(
            Fields(&logger.context).to_string(),
            " phone=+6281234 msg_id=ABC reason=\"not found\""
        );
    }

    #[test]
    fn test_with_does_not_mutate_parent() {
        let parent = Logger::new();
        let _child = parent.with("phone", "1");
        assert!(parent.context.is_empty());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("TEXT".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(LoggerError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_init_rejects_bad_level() {
        assert!(matches!(
            init("loud", "text"),
            Err(LoggerError::InvalidLevel(_))
        ));
    }
}
