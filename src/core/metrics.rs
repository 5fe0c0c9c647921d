//! Counters kept by a logger
//!
//! A record captured by a log statement ends in exactly one of three
//! places:
//!
//! - **dropped** on the producer side: the queue was full under the drop
//!   policy, the record was larger than the whole queue, or the thread could
//!   not reach its queue at all;
//! - **suppressed** at drain: the level in force at drain time or the call
//!   site's rate limit discarded it;
//! - **logged**: rendered and handed to the file sink and the log callback.
//!
//! Records a producer skips before encoding (a disabled level, or a
//! rate-limited site whose window is still open) are never captured and
//! appear nowhere. All counters are `Relaxed`; they are statistics, not
//! synchronization.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters of one logger, see [`Logger::metrics`](crate::Logger::metrics)
///
/// # Example
///
/// ```
/// use deferred_logger::prelude::*;
/// use deferred_logger::info;
///
/// let logger = Logger::builder().stdout(false).build().unwrap();
/// info!(logger, "kept");
/// logger.set_level(LogLevel::Warn);
/// logger.poll(true).unwrap();
///
/// // captured while Info was enabled, judged after the level went up
/// let snap = logger.metrics().snapshot();
/// assert_eq!((snap.logged, snap.suppressed), (0, 1));
/// ```
#[derive(Debug, Default)]
pub struct LoggerMetrics {
    // producer side
    dropped: AtomicU64,
    queue_full_events: AtomicU64,
    block_events: AtomicU64,
    // drain side
    logged: AtomicU64,
    suppressed: AtomicU64,
    sink_errors: AtomicU64,
}

/// Plain copy of [`LoggerMetrics`] at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub dropped: u64,
    /// Overflow episodes; one episode covers every failed push between two
    /// successful ones on a queue
    pub queue_full_events: u64,
    /// Producer waits under [`OverflowPolicy::Block`](crate::OverflowPolicy::Block)
    pub block_events: u64,
    pub logged: u64,
    pub suppressed: u64,
    /// Failed writes, flushes or rotations, and panicking callbacks
    pub sink_errors: u64,
}

impl MetricsSnapshot {
    /// Records that were captured, whatever became of them
    pub fn captured(&self) -> u64 {
        self.dropped + self.suppressed + self.logged
    }

    /// Share of captured records lost before the drain, in percent
    pub fn drop_rate(&self) -> f64 {
        match self.captured() {
            0 => 0.0,
            captured => self.dropped as f64 * 100.0 / captured as f64,
        }
    }
}

impl LoggerMetrics {
    pub const fn new() -> Self {
        Self {
            dropped: AtomicU64::new(0),
            queue_full_events: AtomicU64::new(0),
            block_events: AtomicU64::new(0),
            logged: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            sink_errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn queue_full_events(&self) -> u64 {
        self.queue_full_events.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn block_events(&self) -> u64 {
        self.block_events.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn total_logged(&self) -> u64 {
        self.logged.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn suppressed_count(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn sink_errors(&self) -> u64 {
        self.sink_errors.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_queue_full(&self) {
        self.queue_full_events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_block(&self) {
        self.block_events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_logged(&self) {
        self.logged.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sink_error(&self) {
        self.sink_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dropped: self.dropped_count(),
            queue_full_events: self.queue_full_events(),
            block_events: self.block_events(),
            logged: self.total_logged(),
            suppressed: self.suppressed_count(),
            sink_errors: self.sink_errors(),
        }
    }

    /// See [`MetricsSnapshot::drop_rate`]
    pub fn drop_rate(&self) -> f64 {
        self.snapshot().drop_rate()
    }

    /// Zero every counter; records in flight are counted afresh when drained
    pub fn reset(&self) {
        for counter in [
            &self.dropped,
            &self.queue_full_events,
            &self.block_events,
            &self.logged,
            &self.suppressed,
            &self.sink_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Clone for LoggerMetrics {
    /// Detached copy holding the current values
    fn clone(&self) -> Self {
        let snap = self.snapshot();
        Self {
            dropped: AtomicU64::new(snap.dropped),
            queue_full_events: AtomicU64::new(snap.queue_full_events),
            block_events: AtomicU64::new(snap.block_events),
            logged: AtomicU64::new(snap.logged),
            suppressed: AtomicU64::new(snap.suppressed),
            sink_errors: AtomicU64::new(snap.sink_errors),
        }
    }
}
