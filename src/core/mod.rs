//! Core logger types: call sites, argument encoding, thread queues and the
//! drain stage

pub mod args;
pub mod call_site;
pub mod config;
pub mod error;
pub mod header;
pub mod log_level;
pub mod logger;
pub mod metrics;
pub mod overflow_policy;
mod poller;
pub mod rate_limit;
pub mod sink_config;
pub mod template;
pub mod thread_queue;
pub mod timestamp;

pub use args::{ArgEncoder, ArgValue, Custom, LogArg, Loggable, StaticStr};
pub use call_site::{CallSite, CallSiteCache, CallSiteId, CallSiteMeta, CallSiteRegistry};
pub use config::LoggerConfig;
pub use error::{LoggerError, Result};
pub use header::{HeaderPattern, DEFAULT_HEADER_PATTERN};
pub use log_level::LogLevel;
pub use logger::{
    Logger, LoggerBuilder, DEFAULT_QUEUE_CAPACITY, DEFAULT_SHUTDOWN_TIMEOUT, MIN_QUEUE_CAPACITY,
};
pub use metrics::{LoggerMetrics, MetricsSnapshot};
pub use overflow_policy::{OverflowPolicy, QueueFullCallback};
pub use rate_limit::RateLimit;
pub use sink_config::{escape_line_breaks, LogCallback, LogMessage, MessageFilter};
pub use template::Template;
pub use timestamp::HeaderTimeZone;
