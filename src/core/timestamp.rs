//! Capture clock and calendar breakdown of capture timestamps
//!
//! Producers stamp every record with [`Clock::now_ns`]: nanoseconds since the
//! Unix epoch, derived from a monotonic `Instant` anchored to the wall clock
//! once, so stamps taken on one thread never go backwards. The header
//! renderer turns a stamp back into calendar fields with chrono.

use chrono::{DateTime, Datelike, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Monotonic clock reporting wall-clock-aligned nanoseconds
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    anchor: Instant,
    anchor_ns: u64,
}

impl Clock {
    pub fn new() -> Self {
        let anchor_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self {
            anchor: Instant::now(),
            anchor_ns,
        }
    }

    /// Nanoseconds since the Unix epoch, monotonic for the life of the clock
    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.anchor_ns + self.anchor.elapsed().as_nanos() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Time zone used when rendering header date/time fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HeaderTimeZone {
    #[default]
    Utc,
    Local,
}

/// Calendar breakdown of one capture timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateFields {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// 0 = Monday
    pub weekday: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub nanos: u32,
}

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

impl DateFields {
    pub fn from_nanos(timestamp_ns: u64, tz: HeaderTimeZone) -> Self {
        let utc: DateTime<Utc> = DateTime::from_timestamp_nanos(timestamp_ns as i64);
        match tz {
            HeaderTimeZone::Utc => Self::from_datetime(&utc),
            HeaderTimeZone::Local => Self::from_datetime(&utc.with_timezone(&Local)),
        }
    }

    fn from_datetime<T: Datelike + Timelike>(dt: &T) -> Self {
        Self {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            weekday: dt.weekday().num_days_from_monday(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
            // leap seconds report nanos >= 1e9
            nanos: dt.nanosecond() % 1_000_000_000,
        }
    }

    pub fn weekday_name(&self) -> &'static str {
        WEEKDAYS[(self.weekday % 7) as usize]
    }

    pub fn month_name(&self) -> &'static str {
        MONTHS[((self.month + 11) % 12) as usize]
    }
}
