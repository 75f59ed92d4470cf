/// Structured logging for the HAB sync service.
///
/// Provides context-rich logging with location identifiers, timestamps, and
/// severity levels, plus optional file output for scheduled runs. Fallback
/// decisions are logged with enough context (location, error kind, resolving
/// tier) to reconstruct after the fact why a default was used.

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use crate::model::{HabError, SourceTier};

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

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Fwc,
    Sheets,
    Cms,
    System,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Fwc => write!(f, "FWC"),
            DataSource::Sheets => write!(f, "SHEETS"),
            DataSource::Cms => write!(f, "CMS"),
            DataSource::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - a site may simply have no recent samples.
    Expected,
    /// Unexpected failure - indicates service degradation or a contract change.
    Unexpected,
    /// Cannot determine whether this is expected or not.
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

/// Classifies a fetch-layer failure for log severity routing.
pub fn classify_failure(error: &HabError) -> FailureType {
    match error {
        // A shape change or structured service error means something on the
        // other end changed; that needs eyes on it.
        HabError::MalformedResponse(_) => FailureType::Unexpected,
        HabError::UpstreamService { code: Some(429), .. } => FailureType::Expected,
        HabError::UpstreamService { .. } => FailureType::Unexpected,
        // Networks flake; a single transport failure is not alarming.
        HabError::Transport(_) => FailureType::Unknown,
        HabError::Configuration(_) | HabError::FieldKindMismatch { .. } => FailureType::Unexpected,
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
}

impl Logger {
    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<String>) {
        let logger = Logger { min_level, log_file };
        *LOGGER.lock().unwrap() = Some(logger);
    }

    fn log(&self, level: LogLevel, source: DataSource, location: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let location_part = location.map(|l| format!(" [{}]", l)).unwrap_or_default();
        let log_entry = format!("{} {} {}{}: {}", timestamp, level, source, location_part, message);

        match level {
            LogLevel::Error => eprintln!("   ✗ {}{}: {}", source, location_part, message),
            LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", source, location_part, message),
            LogLevel::Info => println!("   {}", message),
            LogLevel::Debug => println!("   [DEBUG] {}", message),
        }

        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>) {
    Logger::init(min_level, log_file.map(String::from));
}

pub fn info(source: DataSource, location: Option<&str>, message: &str) {
    if let Some(logger) = LOGGER.lock().unwrap().as_ref() {
        logger.log(LogLevel::Info, source, location, message);
    }
}

pub fn warn(source: DataSource, location: Option<&str>, message: &str) {
    if let Some(logger) = LOGGER.lock().unwrap().as_ref() {
        logger.log(LogLevel::Warning, source, location, message);
    }
}

pub fn error(source: DataSource, location: Option<&str>, message: &str) {
    if let Some(logger) = LOGGER.lock().unwrap().as_ref() {
        logger.log(LogLevel::Error, source, location, message);
    }
}

pub fn debug(source: DataSource, location: Option<&str>, message: &str) {
    if let Some(logger) = LOGGER.lock().unwrap().as_ref() {
        logger.log(LogLevel::Debug, source, location, message);
    }
}

// ---------------------------------------------------------------------------
// Structured Failure and Resolution Logging
// ---------------------------------------------------------------------------

/// Logs a fetch-layer failure with automatic classification.
pub fn log_fetch_failure(source: DataSource, location: Option<&str>, operation: &str, err: &HabError) {
    let failure_type = classify_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(source, location, &message),
        FailureType::Unexpected => error(source, location, &message),
        FailureType::Unknown => warn(source, location, &message),
    }
}

/// Logs which fallback tier resolved a location, with the error that forced
/// the fallback when there was one.
pub fn log_tier_resolution(location: &str, tier: SourceTier, cause: Option<&HabError>) {
    match (tier, cause) {
        (SourceTier::Live, _) => {
            debug(DataSource::Fwc, Some(location), "resolved from live data");
        }
        (tier, Some(err)) => {
            warn(
                DataSource::Fwc,
                Some(location),
                &format!("fell back to {} tier after: {}", tier, err),
            );
        }
        (tier, None) => {
            info(
                DataSource::Fwc,
                Some(location),
                &format!("no live samples matched; resolved from {} tier", tier),
            );
        }
    }
}

/// Logs a sync-phase summary at the appropriate severity.
pub fn log_sync_summary(source: DataSource, total: usize, successful: usize, failed: usize) {
    let message = format!("sync complete: {}/{} successful, {} failed", successful, total, failed);
    if failed == 0 {
        info(source, None, &message);
    } else if successful == 0 {
        error(source, None, &message);
    } else {
        warn(source, None, &message);
    }
}
