//! # Logging Utilities
//!
//! Logging infrastructure for pwnview using `tracing`.
//!
//! This module provides structured logging with support for:
//! - Pretty output for development and JSON for machine consumption
//! - Environment variable configuration
//! - Optional file output through a non-blocking appender
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pwnview_utils::init_logging;
//!
//! // Keep the guard alive for as long as you log; dropping it flushes the file writer
//! let _guard = init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("Session started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Log filter (e.g., `RUST_LOG=debug`, `RUST_LOG=pwnview_core::demux=trace`)
//! - `PWNVIEW_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
//! - `PWNVIEW_LOG_FILE`: Optional path of an additional, daily rotated log file
//!
//! ## Interactive use
//!
//! The interactive front end prints pane contents to the terminal, so it logs
//! to a dated file instead ([`init_logging_to_file`]).

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fs, io};

use chrono::{Local, NaiveDate};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default)
    #[default]
    Pretty,
    /// JSON format, one object per line
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(format!("{s}. Use 'pretty' or 'json'"))),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    Info,
    /// Debug level: state transitions and routed payloads
    Debug,
    /// Trace level: every MI record in both directions
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim().to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(format!(
                "{s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            ))),
        }
    }
}

/// Keeps the background file writer alive.
///
/// Dropping the guard flushes buffered lines; hold it until the program exits.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug, Default)]
pub struct LoggingGuard
{
    _file: Option<WorkerGuard>,
}

/// Initialize logging with default settings
///
/// Reads configuration from `RUST_LOG`, `PWNVIEW_LOG_FORMAT` and
/// `PWNVIEW_LOG_FILE`. Console output goes to stderr.
///
/// ## Errors
///
/// Returns an error if:
/// - Logging is already initialized
/// - `PWNVIEW_LOG_FORMAT` holds an unknown format
/// - The log file directory cannot be created
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    let format = match env::var("PWNVIEW_LOG_FORMAT") {
        Ok(value) => value.parse()?,
        Err(_) => LogFormat::default(),
    };
    init(format, build_filter(None))
}

/// Initialize logging with explicit level and format
///
/// `PWNVIEW_LOG_FILE` is still honoured.
///
/// ## Example
///
/// ```rust,no_run
/// use pwnview_utils::{LogFormat, LogLevel, init_logging_with_level};
///
/// let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Pretty)
///     .expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// Returns an error if logging is already initialized or file logging fails.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    init(format, build_filter(Some(level.into())))
}

/// Initialize file-only logging for the interactive front end
///
/// Logs go to `~/.pwnview/YYYY-MM-DD-pwnview.log`, or to the system temp
/// directory if `HOME` is not set. Returns the path so it can be shown to the
/// user.
///
/// ## Arguments
///
/// * `level` - Optional log level. If `None`, uses `RUST_LOG` or defaults to `INFO`.
///
/// ## Errors
///
/// Returns an error if logging is already initialized or the log directory
/// cannot be created.
pub fn init_logging_to_file(level: Option<LogLevel>) -> Result<(PathBuf, LoggingGuard), LoggingError>
{
    let dir = env::var("HOME").map_or_else(|_| env::temp_dir(), |home| PathBuf::from(home).join(".pwnview"));
    fs::create_dir_all(&dir)?;
    let log_file = dated_log_file(&dir, Local::now().date_naive());

    // The date is already in the file name, so never rotate
    let appender = tracing_appender::rolling::never(&dir, file_name(&log_file));
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(build_filter(level.map(Into::into)))
        .with(format_layer(LogFormat::Pretty, writer, false))
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;

    Ok((log_file, LoggingGuard { _file: Some(guard) }))
}

/// `<dir>/YYYY-MM-DD-pwnview.log`
#[must_use]
pub fn dated_log_file(dir: &Path, date: NaiveDate) -> PathBuf
{
    dir.join(format!("{}-pwnview.log", date.format("%Y-%m-%d")))
}

fn file_name(path: &Path) -> &std::ffi::OsStr
{
    path.file_name().unwrap_or_default()
}

/// Filter priority:
/// 1. An explicit level (from the `--log-level` flag)
/// 2. `RUST_LOG`, which allows per-module filters like `pwnview_core=debug`
/// 3. `INFO`
fn build_filter(explicit_level: Option<Level>) -> EnvFilter
{
    if let Some(level) = explicit_level {
        return EnvFilter::new(level.to_string());
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()))
}

fn format_layer<S, W>(format: LogFormat, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339());

    match format {
        LogFormat::Pretty => layer.with_ansi(ansi).boxed(),
        LogFormat::Json => layer.json().with_current_span(true).with_span_list(true).boxed(),
    }
}

fn init(format: LogFormat, filter: EnvFilter) -> Result<LoggingGuard, LoggingError>
{
    let (file_layer, guard) = match env::var("PWNVIEW_LOG_FILE").ok().map(PathBuf::from) {
        Some(path) => {
            let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or(Path::new("."));
            fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, file_name(&path));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(format_layer(format, writer, false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(format_layer(format, io::stderr, true))
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;

    Ok(LoggingGuard { _file: guard })
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("dev").unwrap(), LogFormat::Pretty);
        assert!(matches!(LogFormat::from_str("xml"), Err(LoggingError::InvalidFormat(_))));
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("error").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str(" info ").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("dbg").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert!(matches!(LogLevel::from_str("loud"), Err(LoggingError::InvalidLevel(_))));
    }

    #[test]
    fn test_log_level_to_tracing_level()
    {
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(LogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn test_dated_log_file()
    {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            dated_log_file(Path::new("/home/user/.pwnview"), date),
            PathBuf::from("/home/user/.pwnview/2024-03-09-pwnview.log")
        );
    }
}
