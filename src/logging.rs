/// Structured logging for the alert pipeline
///
/// Provides context-rich logging with a component tag, an optional context
/// identifier (endpoint, stream session, device id), timestamps, and
/// severity levels. Supports both console output and file-based logging for
/// daemon operations.

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::str::FromStr;
use std::sync::Mutex;

use crate::model::ApiError;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Preferences,
    Stream,
    Evaluator,
    Telemetry,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Preferences => write!(f, "PREFS"),
            Component::Stream => write!(f, "STREAM"),
            Component::Evaluator => write!(f, "ALERT"),
            Component::Telemetry => write!(f, "AQI"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - e.g. no token configured, alerts simply stay off
    Expected,
    /// Unexpected failure - indicates backend degradation or an API change
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) {
        let logger = Logger {
            min_level,
            log_file,
            console_timestamps,
        };

        if let Ok(mut slot) = LOGGER.lock() {
            *slot = Some(logger);
        }
    }

    fn log(&self, level: LogLevel, component: Component, context: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let context_part = context.map(|c| format!(" [{}]", c)).unwrap_or_default();
        let log_entry = format_entry(&timestamp.to_string(), level, component, context, message);

        if self.console_timestamps {
            match level {
                LogLevel::Error | LogLevel::Warning => eprintln!("{}", log_entry),
                LogLevel::Info | LogLevel::Debug => println!("{}", log_entry),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", component, context_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", component, context_part, message),
                LogLevel::Info => println!("   {}{}: {}", component, context_part, message),
                LogLevel::Debug => println!("   [DEBUG] {}{}: {}", component, context_part, message),
            }
        }

        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

/// Single-line file/console form: `<ts> <LEVEL> <COMPONENT> [<context>]: <message>`
fn format_entry(
    timestamp: &str,
    level: LogLevel,
    component: Component,
    context: Option<&str>,
    message: &str,
) -> String {
    let context_part = context.map(|c| format!(" [{}]", c)).unwrap_or_default();
    format!("{} {} {}{}: {}", timestamp, level, component, context_part, message)
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file.map(String::from), console_timestamps);
}

fn dispatch(level: LogLevel, component: Component, context: Option<&str>, message: &str) {
    if let Ok(guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_ref() {
            logger.log(level, component, context, message);
        }
    }
}

/// Log a general informational message
pub fn info(component: Component, context: Option<&str>, message: &str) {
    dispatch(LogLevel::Info, component, context, message);
}

/// Log a warning message
pub fn warn(component: Component, context: Option<&str>, message: &str) {
    dispatch(LogLevel::Warning, component, context, message);
}

/// Log an error message
pub fn error(component: Component, context: Option<&str>, message: &str) {
    dispatch(LogLevel::Error, component, context, message);
}

/// Log a debug message
pub fn debug(component: Component, context: Option<&str>, message: &str) {
    dispatch(LogLevel::Debug, component, context, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a backend failure.
///
/// A missing token is a configuration state rather than a fault: the
/// pipeline just never opens the stream. 5xx/parse failures point at the
/// backend; transport errors may be a flaky network and are left Unknown.
pub fn classify_api_failure(err: &ApiError) -> FailureType {
    match err {
        ApiError::MissingToken => FailureType::Expected,
        ApiError::Unauthorized => FailureType::Unexpected,
        ApiError::HttpError(code) if *code >= 500 => FailureType::Unexpected,
        ApiError::HttpError(_) => FailureType::Unknown,
        ApiError::ParseError(_) => FailureType::Unexpected,
        ApiError::Transport(_) => FailureType::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a backend failure with automatic classification
pub fn log_api_failure(component: Component, context: Option<&str>, operation: &str, err: &ApiError) {
    let failure_type = classify_api_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(component, context, &message),
        FailureType::Unexpected => error(component, context, &message),
        FailureType::Unknown => warn(component, context, &message),
    }
}

// ---------------------------------------------------------------------------
// Stream Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one alert stream session once it ends
pub fn log_stream_summary(session: u64, chunks: usize, forwarded: usize, dropped: usize) {
    let context = format!("session {}", session);
    let message = format!(
        "Stream closed: {} chunks read, {} frames forwarded, {} dropped",
        chunks, forwarded, dropped
    );

    if dropped == 0 {
        info(Component::Stream, Some(&context), &message);
    } else if forwarded == 0 {
        error(Component::Stream, Some(&context), &message);
    } else {
        warn(Component::Stream, Some(&context), &message);
    }
}
