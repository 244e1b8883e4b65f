//! Logging setup
//!
//! Installs a global `tracing` subscriber writing to stderr and/or a file,
//! and hands out named [`Logger`] handles.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer, Registry};

/// Default logger name
pub const DEFAULT_LOGGER: &str = "fastcms";

static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Logging error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid logging level: {0}")]
    InvalidLevel(String),
    #[error("Failed to open log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Json,
}

/// How an existing log file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileMode {
    #[default]
    Append,
    Truncate,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// DEBUG, INFO, WARNING, ERROR or CRITICAL
    pub level: String,
    /// Write to stderr
    pub stream: bool,
    /// Also write to this file
    pub file: Option<PathBuf>,
    pub mode: FileMode,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            stream: true,
            file: None,
            mode: FileMode::Append,
            format: LogFormat::Full,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>, mode: FileMode) -> Self {
        self.file = Some(file.into());
        self.mode = mode;
        self
    }
}

/// Parse a level name, case-insensitively
pub fn parse_level(level: &str) -> Result<Level, LoggingError> {
    match level.trim().to_uppercase().as_str() {
        "TRACE" => Ok(Level::TRACE),
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARNING" | "WARN" => Ok(Level::WARN),
        "ERROR" | "CRITICAL" => Ok(Level::ERROR),
        _ => Err(LoggingError::InvalidLevel(level.to_string())),
    }
}

fn format_layer<W>(writer: W, format: LogFormat, ansi: bool) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
    match format {
        LogFormat::Full => layer.boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

fn open_log_file(path: &Path, mode: FileMode) -> Result<File, LoggingError> {
    let mut options = OpenOptions::new();
    options.create(true);
    match mode {
        FileMode::Append => options.append(true),
        FileMode::Truncate => options.write(true).truncate(true),
    };

    options.open(path).map_err(|source| LoggingError::File {
        path: path.to_path_buf(),
        source,
    })
}

/// Install the global subscriber.
///
/// Only the first successful call has an effect; later calls return `Ok`.
pub fn setup_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    if INITIALIZED.get().is_some() {
        return Ok(());
    }

    let level = parse_level(&config.level)?;
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.stream {
        layers.push(format_layer(std::io::stderr, config.format, true));
    }
    if let Some(path) = &config.file {
        let file = open_log_file(path, config.mode)?;
        layers.push(format_layer(Mutex::new(file), config.format, false));
    }

    tracing_subscriber::registry()
        .with(layers.with_filter(LevelFilter::from_level(level)))
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    let _ = INITIALIZED.set(());
    tracing::debug!(level = %level, "Logging initialized");
    Ok(())
}

/// Whether [`setup_logging`] has installed the subscriber
pub fn is_initialized() -> bool {
    INITIALIZED.get().is_some()
}

/// A named logger. Every event carries a `logger` field with its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logger {
    name: String,
}

impl Default for Logger {
    fn default() -> Self {
        get_logger(DEFAULT_LOGGER)
    }
}

impl Logger {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!(logger = %self.name, "{}", message);
    }

    pub fn info(&self, message: &str) {
        tracing::info!(logger = %self.name, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(logger = %self.name, "{}", message);
    }

    pub fn error(&self, message: &str) {
        tracing::error!(logger = %self.name, "{}", message);
    }
}

/// Get a logger by name
pub fn get_logger(name: &str) -> Logger {
    Logger {
        name: name.to_string(),
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("Unknown log format: {}", other)),
        }
    }
}
