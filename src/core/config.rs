//! Serializable logger settings
//!
//! Everything the builder accepts except callbacks, in a form that can be
//! kept in a JSON file next to the rest of an application's configuration.

use super::error::{LoggerError, Result};
use super::header::DEFAULT_HEADER_PATTERN;
use super::log_level::LogLevel;
use super::logger::DEFAULT_QUEUE_CAPACITY;
use super::overflow_policy::OverflowPolicy;
use super::timestamp::HeaderTimeZone;
use crate::sinks::{RotationPolicy, DEFAULT_FLUSH_BUFFER_SIZE, DEFAULT_FLUSH_DELAY};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Logger settings loadable from JSON
///
/// Missing fields take their defaults.
///
/// # Example
///
/// ```
/// use deferred_logger::{LogLevel, Logger, LoggerConfig};
///
/// let config = LoggerConfig::from_json(r#"{ "level": "Debug", "stdout": false }"#).unwrap();
/// assert_eq!(config.level, LogLevel::Debug);
///
/// let logger = Logger::builder().config(config).build().unwrap();
/// assert_eq!(logger.level(), LogLevel::Debug);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Per-thread queue size in bytes
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub level: LogLevel,
    pub header_pattern: String,
    pub header_time_zone: HeaderTimeZone,
    pub log_file: Option<PathBuf>,
    /// Truncate `log_file` when opening it instead of appending
    pub truncate: bool,
    /// Write to stdout while no log file is open
    pub stdout: bool,
    pub file_level: LogLevel,
    pub flush_delay_ms: u64,
    pub flush_buffer_size: usize,
    pub flush_on: LogLevel,
    pub rotation: Option<RotationPolicy>,
    /// Start a background polling thread with this interval
    pub polling_interval_ms: Option<u64>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::Drop,
            level: LogLevel::Info,
            header_pattern: DEFAULT_HEADER_PATTERN.to_string(),
            header_time_zone: HeaderTimeZone::Utc,
            log_file: None,
            truncate: false,
            stdout: true,
            file_level: LogLevel::Debug,
            flush_delay_ms: DEFAULT_FLUSH_DELAY.as_millis() as u64,
            flush_buffer_size: DEFAULT_FLUSH_BUFFER_SIZE,
            flush_on: LogLevel::Off,
            rotation: None,
            polling_interval_ms: None,
        }
    }
}

impl LoggerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            LoggerError::io_operation(
                "read logger config",
                format!("Failed to read '{}'", path.display()),
                e,
            )
        })?;
        Self::from_json(&text)
    }
}
