//! Overflow policies for the per-thread queues
//!
//! When a producer's queue has no room for a new record, the policy decides
//! whether the record is discarded or the producer waits for the drain stage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Policy for handling a full thread queue
///
/// # Example
///
/// ```
/// use deferred_logger::OverflowPolicy;
///
/// // Default behavior: discard and notify
/// let policy = OverflowPolicy::default();
/// assert_eq!(policy, OverflowPolicy::Drop);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Discard the record immediately
    ///
    /// The queue-full callback fires once per overflow episode so the
    /// application can count its own losses.
    #[default]
    Drop,

    /// Wait until the drain stage frees enough room
    ///
    /// Warning: the producer stalls for as long as the queue stays full.
    /// The queue-full callback fires once when the wait starts.
    Block,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::Drop => write!(f, "Drop"),
            OverflowPolicy::Block => write!(f, "Block"),
        }
    }
}

/// Callback type for queue-full notifications
///
/// Invoked on the producing thread, once per overflow episode. Whatever
/// state the application wants to see (a drop counter, a channel) is
/// captured by the closure.
pub type QueueFullCallback = Arc<dyn Fn() + Send + Sync>;
