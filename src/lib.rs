//! # Deferred Logger
//!
//! An asynchronous logging engine that keeps formatting off the hot path.
//! A log statement copies its arguments into the calling thread's own
//! lock-free queue; rendering, file output and callbacks happen later, when
//! the queues are drained by [`Logger::poll`] or by a background polling
//! thread.
//!
//! ## Features
//!
//! - **Low producer latency**: no lock, no allocation and no formatting on
//!   the logging thread once its queue exists
//! - **Per-thread ordering**: records from one thread are rendered in call
//!   order; threads are merged by capture time
//! - **Rate limiting**: once-per-statement and once-per-interval macros
//! - **Configurable output**: header patterns, message filters, log
//!   callbacks, file output with rotation
//!
//! ## Example
//!
//! ```
//! use deferred_logger::prelude::*;
//! use deferred_logger::{info, warn_every};
//!
//! let logger = Logger::builder()
//!     .level(LogLevel::Info)
//!     .header_pattern("{HMSe} {l} ")
//!     .stdout(false)
//!     .build()
//!     .unwrap();
//!
//! logger.set_log_callback(|msg| assert!(msg.body().starts_with("request")), LogLevel::Info);
//! info!(logger, "request {} took {}us", 17, 250);
//! warn_every!(logger, 1_000_000_000, "request backlog {}", 3);
//!
//! assert_eq!(logger.poll(true).unwrap(), 2);
//! ```

pub mod core;
pub mod macros;
pub mod sinks;

pub mod prelude {
    pub use crate::core::{
        CallSiteMeta, Custom, HeaderTimeZone, LogArg, LogLevel, LogMessage, Loggable, Logger,
        LoggerBuilder, LoggerConfig, LoggerError, LoggerMetrics, MetricsSnapshot, OverflowPolicy,
        RateLimit, Result, StaticStr, DEFAULT_SHUTDOWN_TIMEOUT,
    };
    pub use crate::sinks::{RotationPolicy, SinkTarget};
}

pub use crate::core::{
    escape_line_breaks, CallSiteId, CallSiteMeta, Custom, HeaderTimeZone, LogArg, LogLevel,
    LogMessage, Loggable, Logger, LoggerBuilder, LoggerConfig, LoggerError, LoggerMetrics,
    MetricsSnapshot, OverflowPolicy, RateLimit, Result, StaticStr, DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use crate::sinks::{RotationPolicy, SinkTarget};
