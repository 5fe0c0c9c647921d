//! Runtime sink configuration
//!
//! Settings that change rarely but are read for every drained record live
//! in an immutable [`SinkConfig`] snapshot. Setters build a modified copy
//! and swap it in; the poller picks up whatever snapshot is current when it
//! renders a record.

use super::header::HeaderPattern;
use super::log_level::LogLevel;
use super::overflow_policy::QueueFullCallback;
use super::timestamp::HeaderTimeZone;
use std::fmt;
use std::sync::Arc;

/// One rendered record as seen by a log callback
#[derive(Debug, Clone, Copy)]
pub struct LogMessage<'a> {
    /// Capture time, nanoseconds since the Unix epoch
    pub timestamp_ns: u64,
    pub level: LogLevel,
    /// `file:line` of the call site, or its location override
    pub location: &'a str,
    /// Offset in `message` where the header starts
    pub base_pos: usize,
    pub thread_name: &'a str,
    /// Header and body, after the message filter; no trailing newline
    pub message: &'a str,
    /// Offset in `message` where the body starts
    pub body_pos: usize,
    /// Offset in the log file where this line was, or would have been,
    /// written; `None` when no file is open
    pub file_pos: Option<u64>,
}

impl LogMessage<'_> {
    pub fn body(&self) -> &str {
        self.message.get(self.body_pos..).unwrap_or("")
    }
}

pub type LogCallback = Arc<dyn Fn(&LogMessage<'_>) + Send + Sync>;

/// Receives the full rendered line; `Some` replaces it for this emission only
pub type MessageFilter = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Clone)]
pub struct SinkConfig {
    pub header: Arc<HeaderPattern>,
    pub header_time_zone: HeaderTimeZone,
    /// Minimum level written to the file or stdout
    pub file_level: LogLevel,
    pub log_callback: Option<(LogCallback, LogLevel)>,
    pub message_filter: Option<MessageFilter>,
    pub queue_full: Option<QueueFullCallback>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            header: Arc::new(HeaderPattern::default()),
            header_time_zone: HeaderTimeZone::default(),
            file_level: LogLevel::Debug,
            log_callback: None,
            message_filter: None,
            queue_full: None,
        }
    }
}

impl fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkConfig")
            .field("header", &self.header.source())
            .field("header_time_zone", &self.header_time_zone)
            .field("file_level", &self.file_level)
            .field("log_callback", &self.log_callback.as_ref().map(|(_, level)| level))
            .field("message_filter", &self.message_filter.is_some())
            .field("queue_full", &self.queue_full.is_some())
            .finish()
    }
}

/// Message filter that turns CR and LF into the visible markers `_\r_` and
/// `_\n_`, keeping every record on one line
///
/// ```
/// use deferred_logger::escape_line_breaks;
///
/// assert_eq!(escape_line_breaks("ABC\n\nXYZ").as_deref(), Some("ABC_\\n__\\n_XYZ"));
/// assert_eq!(escape_line_breaks("ABC XYZ"), None);
/// ```
pub fn escape_line_breaks(message: &str) -> Option<String> {
    if !message.contains(|c: char| c == '\r' || c == '\n') {
        return None;
    }
    let mut escaped = String::with_capacity(message.len() + 8);
    for c in message.chars() {
        match c {
            '\r' => escaped.push_str("_\\r_"),
            '\n' => escaped.push_str("_\\n_"),
            other => escaped.push(other),
        }
    }
    Some(escaped)
}

/// Run `filter` over a rendered line whose body starts at `body_pos`
///
/// Returns the replacement and where its body starts. A filter that keeps
/// the header as is keeps the offset; otherwise the header is filtered on
/// its own to find it. When neither is a prefix of the replacement, the
/// whole replacement counts as body.
pub(crate) fn apply_filter(
    filter: &(dyn Fn(&str) -> Option<String> + Send + Sync),
    line: &str,
    body_pos: usize,
) -> Option<(String, usize)> {
    let replacement = filter(line)?;
    let header = line.get(..body_pos).unwrap_or("");
    let pos = if replacement.starts_with(header) {
        header.len()
    } else {
        match filter(header) {
            Some(filtered) if replacement.starts_with(filtered.as_str()) => filtered.len(),
            _ => 0,
        }
    };
    Some((replacement, pos))
}
