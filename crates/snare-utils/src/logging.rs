//! # Logging Utilities
//!
//! Logging for snare built on `tracing`.
//!
//! Engine crates only emit events through the `tracing` macros; binaries pick
//! where those events go by calling [`init_logging`] once at startup.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snare_utils::{init_logging, LoggingConfig};
//!
//! let config = LoggingConfig::from_env()?;
//! let _guard = init_logging(&config)?;
//! tracing::info!("snare started");
//! # Ok::<(), snare_utils::LoggingError>(())
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: filter directives (e.g. `debug`, `snare_core=trace`)
//! - `SNARE_LOG_FORMAT`: `pretty` (default), `compact` or `json`
//! - `SNARE_LOG_FILE`: also write events to this file, without colours
//!
//! Console output goes to stderr so that command output on stdout stays
//! machine-readable.

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const FORMAT_VAR: &str = "SNARE_LOG_FORMAT";
const FILE_VAR: &str = "SNARE_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat
{
    /// Multi-field human-readable lines (default)
    #[default]
    Pretty,
    /// One short line per event, no timestamps
    Compact,
    /// Newline-delimited JSON objects
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "dev" => Ok(LogFormat::Pretty),
            "compact" | "short" => Ok(LogFormat::Compact),
            "json" | "prod" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    /// Most verbose; includes every scripted instruction and trap
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
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

/// Where and how log events are written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig
{
    /// Explicit level; overrides `RUST_LOG` when set
    pub level: Option<LogLevel>,
    /// Filter directives from `RUST_LOG`
    pub directives: Option<String>,
    pub format: LogFormat,
    /// Optional file receiving a copy of every event
    pub file: Option<PathBuf>,
    /// Colour console output
    pub ansi: bool,
}

impl LoggingConfig
{
    /// Configuration from the process environment.
    ///
    /// ## Errors
    ///
    /// `InvalidFormat` if `SNARE_LOG_FORMAT` is set to an unknown format.
    pub fn from_env() -> Result<Self, LoggingError>
    {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Configuration from an arbitrary variable lookup.
    ///
    /// ## Errors
    ///
    /// `InvalidFormat` if `SNARE_LOG_FORMAT` names an unknown format.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LoggingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let format = match lookup(FORMAT_VAR) {
            Some(value) => value.parse()?,
            None => LogFormat::default(),
        };
        Ok(Self {
            level: None,
            directives: lookup("RUST_LOG").filter(|value| !value.trim().is_empty()),
            format,
            file: lookup(FILE_VAR)
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from),
            ansi: true,
        })
    }

    /// Set an explicit level, as the `--log-level` flag does.
    #[must_use]
    pub fn with_level(mut self, level: Option<LogLevel>) -> Self
    {
        if level.is_some() {
            self.level = level;
        }
        self
    }

    /// Filter directives in effect: the explicit level, else `RUST_LOG`, else `info`.
    #[must_use]
    pub fn filter_directives(&self) -> String
    {
        match (self.level, &self.directives) {
            (Some(level), _) => Level::from(level).to_string().to_lowercase(),
            (None, Some(directives)) => directives.clone(),
            (None, None) => "info".to_string(),
        }
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError>
    {
        let directives = self.filter_directives();
        EnvFilter::try_new(&directives).map_err(|err| LoggingError::InvalidLevel(format!("{directives}: {err}")))
    }
}

/// Keeps the background file writer alive; drop it last.
#[derive(Debug)]
pub struct LoggingGuard
{
    _writer: Option<WorkerGuard>,
    file: Option<PathBuf>,
}

impl LoggingGuard
{
    /// File receiving log events, if any.
    #[must_use]
    pub fn log_file(&self) -> Option<&Path>
    {
        self.file.as_deref()
    }
}

/// Install the global subscriber.
///
/// ## Example
///
/// ```rust,no_run
/// use snare_utils::{init_logging, LogFormat, LogLevel, LoggingConfig};
///
/// let config = LoggingConfig {
///     level: Some(LogLevel::Debug),
///     format: LogFormat::Compact,
///     ..LoggingConfig::default()
/// };
/// let _guard = init_logging(&config)?;
/// # Ok::<(), snare_utils::LoggingError>(())
/// ```
///
/// ## Errors
///
/// - `InvalidLevel` for filter directives `EnvFilter` rejects
/// - `FileError` if the log file's directory cannot be created
/// - `InitializationFailed` if a global subscriber is already installed
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError>
{
    let mut layers: Vec<BoxedLayer> = vec![console_layer(config.format, config.ansi, config.filter()?)];

    let mut writer_guard = None;
    if let Some(path) = &config.file {
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&directory)?;
        let file_name = path
            .file_name()
            .ok_or_else(|| LoggingError::InitializationFailed(format!("{} is not a file path", path.display())))?;
        let appender = tracing_appender::rolling::never(&directory, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        writer_guard = Some(guard);
        layers.push(file_layer(config.format, writer, config.filter()?));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;

    Ok(LoggingGuard {
        _writer: writer_guard,
        file: config.file.clone(),
    })
}

/// `~/.snare/YYYY-MM-DD-snare.log`, or the same name under the temp directory
/// when `HOME` is not set.
#[must_use]
pub fn default_log_file() -> PathBuf
{
    let name = format!("{}-snare.log", Utc::now().format("%Y-%m-%d"));
    match env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".snare").join(name),
        None => env::temp_dir().join(name),
    }
}

fn console_layer(format: LogFormat, ansi: bool, filter: EnvFilter) -> BoxedLayer
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(ansi)
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .without_time()
            .with_target(false)
            .with_ansi(ansi)
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed(),
    }
}

fn file_layer(format: LogFormat, writer: tracing_appender::non_blocking::NonBlocking, filter: EnvFilter) -> BoxedLayer
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty | LogFormat::Compact => fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
    }
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    #[error("Unknown log format '{0}'; use 'pretty', 'compact' or 'json'")]
    InvalidFormat(String),

    #[error("Invalid log level or filter '{0}'")]
    InvalidLevel(String),

    /// A global subscriber was already installed, or the file path is unusable
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
