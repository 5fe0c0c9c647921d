//! Per-call-site rate limiting
//!
//! Two checks share one piece of state. Producers call
//! [`RateLimitState::may_pass`] to skip enqueueing records that are certain
//! to be discarded; the draining thread calls [`RateLimitState::admit`],
//! which is the binding decision and the only place state changes. Since
//! a single drain runs at a time, `admit` is effectively single-threaded.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

const NEVER: u64 = u64::MAX;

/// Rate-limit policy attached to a call site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RateLimit {
    #[default]
    None,
    /// Render only the first drained record, for the life of the process
    Once,
    /// Render a record only if at least this many nanoseconds separate its
    /// capture timestamp from the last rendered one
    Interval(u64),
}

#[derive(Debug)]
pub struct RateLimitState {
    emitted: AtomicBool,
    last_ns: AtomicU64,
}

impl RateLimitState {
    pub const fn new() -> Self {
        Self {
            emitted: AtomicBool::new(false),
            last_ns: AtomicU64::new(NEVER),
        }
    }

    /// Cheap producer-side pre-filter; never changes state
    #[inline]
    pub fn may_pass(&self, policy: RateLimit, timestamp_ns: u64) -> bool {
        match policy {
            RateLimit::None => true,
            RateLimit::Once => !self.emitted.load(Ordering::Acquire),
            RateLimit::Interval(min) => {
                let last = self.last_ns.load(Ordering::Acquire);
                last == NEVER || timestamp_ns.saturating_sub(last) >= min
            }
        }
    }

    /// Binding decision made while draining; records the emission on success
    pub fn admit(&self, policy: RateLimit, timestamp_ns: u64) -> bool {
        match policy {
            RateLimit::None => true,
            RateLimit::Once => !self.emitted.swap(true, Ordering::AcqRel),
            RateLimit::Interval(min) => {
                let last = self.last_ns.load(Ordering::Acquire);
                // out-of-order stamps (cross-thread merge) saturate to 0 and are held back
                if last != NEVER && timestamp_ns.saturating_sub(last) < min {
                    return false;
                }
                self.last_ns.store(timestamp_ns, Ordering::Release);
                true
            }
        }
    }

    /// Capture timestamp of the last admitted record, if any
    pub fn last_emitted(&self) -> Option<u64> {
        match self.last_ns.load(Ordering::Acquire) {
            NEVER => None,
            ts => Some(ts),
        }
    }

    pub fn has_emitted_once(&self) -> bool {
        self.emitted.load(Ordering::Acquire)
    }
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::new()
    }
}
