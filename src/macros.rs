//! Logging macros
//!
//! Each macro expansion is one call site: on its first execution it
//! registers its location, level and template with the logger, and keeps
//! the returned id in a `static` so later executions only stamp, encode and
//! enqueue. Templates use `format!`-style placeholders but are checked when
//! the site registers, not at compile time; a malformed template renders a
//! diagnostic line instead of the message.
//!
//! # Examples
//!
//! ```
//! use deferred_logger::prelude::*;
//! use deferred_logger::{info, warn_once};
//!
//! let logger = Logger::builder().stdout(false).build().unwrap();
//!
//! // Basic logging
//! info!(logger, "Server started");
//!
//! // With arguments; values are copied, not formatted, on this thread
//! let port = 8080;
//! info!(logger, "Server listening on port {}", port);
//!
//! // Only the first execution of this statement is ever rendered
//! warn_once!(logger, "config file missing, using defaults");
//!
//! logger.poll(true).unwrap();
//! ```

#[doc(hidden)]
#[macro_export]
macro_rules! __log_impl {
    ($logger:expr, $level:expr, [$($meta:tt)*], $fmt:literal $(, $arg:expr)* $(,)?) => {{
        let __logger: &$crate::Logger = &$logger;
        let __level: $crate::LogLevel = $level;
        if __logger.is_enabled(__level) {
            static __SITE: $crate::core::call_site::CallSiteCache =
                $crate::core::call_site::CallSiteCache::new();
            let __id = __SITE.get_or_register(__logger.call_sites(), || {
                $crate::core::call_site::CallSiteMeta::new(file!(), line!(), __level, $fmt)
                    .column(column!())
                    $($meta)*
            });
            __logger.record(__id, __level, |__enc| {
                $(__enc.push(&$arg);)*
            });
        }
    }};
}

/// Log a message at the given level.
///
/// # Examples
///
/// ```
/// # use deferred_logger::prelude::*;
/// # let logger = Logger::builder().stdout(false).build().unwrap();
/// use deferred_logger::log;
/// log!(logger, LogLevel::Info, "Simple message");
/// log!(logger, LogLevel::Error, "Error code: {}", 500);
/// ```
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $crate::__log_impl!($logger, $level, [], $($arg)+)
    };
}

/// Log a debug-level message.
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Debug, $($arg)+)
    };
}

/// Log an info-level message.
///
/// # Examples
///
/// ```
/// # use deferred_logger::prelude::*;
/// # let logger = Logger::builder().stdout(false).build().unwrap();
/// use deferred_logger::info;
/// info!(logger, "Application started");
/// info!(logger, "Processing {} items", 100);
/// ```
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Info, $($arg)+)
    };
}

/// Log a warning-level message.
#[macro_export]
macro_rules! warn {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Warn, $($arg)+)
    };
}

/// Log an error-level message.
#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Error, $($arg)+)
    };
}

/// Log with an explicit location string shown instead of `file:line`.
///
/// # Examples
///
/// ```
/// # use deferred_logger::prelude::*;
/// # let logger = Logger::builder().stdout(false).build().unwrap();
/// use deferred_logger::log_at;
/// log_at!(logger, LogLevel::Warn, "gateway::session", "peer {} reset", 7);
/// ```
#[macro_export]
macro_rules! log_at {
    ($logger:expr, $level:expr, $location:expr, $($arg:tt)+) => {
        $crate::__log_impl!($logger, $level, [.location($location)], $($arg)+)
    };
}

#[macro_export]
macro_rules! debug_at {
    ($logger:expr, $location:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::LogLevel::Debug, $location, $($arg)+)
    };
}

#[macro_export]
macro_rules! info_at {
    ($logger:expr, $location:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::LogLevel::Info, $location, $($arg)+)
    };
}

#[macro_export]
macro_rules! warn_at {
    ($logger:expr, $location:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::LogLevel::Warn, $location, $($arg)+)
    };
}

#[macro_export]
macro_rules! error_at {
    ($logger:expr, $location:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::LogLevel::Error, $location, $($arg)+)
    };
}

/// Log only the first time this statement's record is drained.
///
/// Later executions are discarded, even after a level change re-enables
/// the statement.
#[macro_export]
macro_rules! log_once {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $crate::__log_impl!(
            $logger,
            $level,
            [.rate_limit($crate::RateLimit::Once)],
            $($arg)+
        )
    };
}

#[macro_export]
macro_rules! debug_once {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_once!($logger, $crate::LogLevel::Debug, $($arg)+)
    };
}

#[macro_export]
macro_rules! info_once {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_once!($logger, $crate::LogLevel::Info, $($arg)+)
    };
}

#[macro_export]
macro_rules! warn_once {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_once!($logger, $crate::LogLevel::Warn, $($arg)+)
    };
}

#[macro_export]
macro_rules! error_once {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_once!($logger, $crate::LogLevel::Error, $($arg)+)
    };
}

/// Log at most once per `interval_ns` nanoseconds of capture time.
///
/// # Examples
///
/// ```
/// # use deferred_logger::prelude::*;
/// # let logger = Logger::builder().stdout(false).build().unwrap();
/// use deferred_logger::info_every;
/// for tick in 0..1000u32 {
///     // at most one line per second
///     info_every!(logger, 1_000_000_000, "tick {}", tick);
/// }
/// ```
#[macro_export]
macro_rules! log_every {
    ($logger:expr, $level:expr, $interval_ns:expr, $($arg:tt)+) => {
        $crate::__log_impl!(
            $logger,
            $level,
            [.rate_limit($crate::RateLimit::Interval($interval_ns))],
            $($arg)+
        )
    };
}

#[macro_export]
macro_rules! debug_every {
    ($logger:expr, $interval_ns:expr, $($arg:tt)+) => {
        $crate::log_every!($logger, $crate::LogLevel::Debug, $interval_ns, $($arg)+)
    };
}

#[macro_export]
macro_rules! info_every {
    ($logger:expr, $interval_ns:expr, $($arg:tt)+) => {
        $crate::log_every!($logger, $crate::LogLevel::Info, $interval_ns, $($arg)+)
    };
}

#[macro_export]
macro_rules! warn_every {
    ($logger:expr, $interval_ns:expr, $($arg:tt)+) => {
        $crate::log_every!($logger, $crate::LogLevel::Warn, $interval_ns, $($arg)+)
    };
}

#[macro_export]
macro_rules! error_every {
    ($logger:expr, $interval_ns:expr, $($arg:tt)+) => {
        $crate::log_every!($logger, $crate::LogLevel::Error, $interval_ns, $($arg)+)
    };
}
