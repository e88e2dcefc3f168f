//! Queue configuration.

use std::time::Duration;

use crate::error::QueueError;

/// Tunable options for a [`PriorityQueue`](crate::PriorityQueue).
///
/// The pop-lock TTL and the element-hash expiry are wire constants shared
/// with other deployments on the same store, so they are deliberately not
/// configurable here.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Identifier namespacing every key this queue touches. Generated as a
    /// fresh UUID when absent, which makes the queue private to whoever
    /// holds the engine handle.
    pub queue_id: Option<String>,
    /// Push fails with [`QueueError::Full`] once queued plus in-flight
    /// elements reach this many.
    pub max_length: u64,
    /// Lower bound applied to every visibility timeout.
    pub timeout_floor: Duration,
    /// Delivery attempts an element gets before an expired timeout drops it
    /// permanently.
    pub retry_limit: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_id: None,
            max_length: 1024,
            timeout_floor: Duration::from_secs(1),
            retry_limit: 3,
        }
    }
}

impl QueueConfig {
    pub(crate) fn validate(&self) -> Result<(), QueueError> {
        if self.max_length == 0 {
            return Err(QueueError::Configuration("max_length must be > 0".into()));
        }
        if self.retry_limit == 0 {
            return Err(QueueError::Configuration("retry_limit must be > 0".into()));
        }
        if let Some(id) = &self.queue_id {
            if id.is_empty() {
                return Err(QueueError::Configuration("queue_id must not be empty".into()));
            }
        }
        Ok(())
    }
}
