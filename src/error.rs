//! Error taxonomy for queue operations.
//!
//! Every fallible call in the crate returns [`QueueError`]. The variants
//! separate steady-state signals a caller is expected to handle inline
//! (`Full`, `Empty`, `Locked`) from genuine failures (`Store`, `Parse`,
//! `Configuration`).

use thiserror::Error;

/// Errors surfaced by the queue engine and its store.
#[derive(Error, Debug)]
pub enum QueueError {
    /// The queue already holds its configured maximum of queued plus
    /// in-flight elements.
    #[error("queue is full")]
    Full,

    /// No element is waiting in the queue.
    #[error("queue is empty")]
    Empty,

    /// Another consumer holds the pop lock. Retry after a short delay.
    #[error("queue is locked by another consumer")]
    Locked,

    /// Backing-store I/O or protocol failure. Surfaced as-is; the engine
    /// never retries internally.
    #[error("store error: {0}")]
    Store(String),

    /// A stored value did not match the wire encoding.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid builder or pool input.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl QueueError {
    /// Returns true if backing off and repeating the operation can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QueueError::Full | QueueError::Locked | QueueError::Store(_)
        )
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        QueueError::Store(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(QueueError::Full.is_retryable());
        assert!(QueueError::Locked.is_retryable());
        assert!(QueueError::Store("io".into()).is_retryable());
        assert!(!QueueError::Empty.is_retryable());
        assert!(!QueueError::Parse("bad".into()).is_retryable());
        assert!(!QueueError::Configuration("bad".into()).is_retryable());
    }

    #[test]
    fn messages_name_the_condition() {
        assert_eq!(QueueError::Full.to_string(), "queue is full");
        assert_eq!(
            QueueError::Store("timed out".into()).to_string(),
            "store error: timed out"
        );
    }
}
