//! Store boundary for the queue engine.
//!
//! The engine talks to its backing store exclusively through [`QueueStore`],
//! which captures the handful of primitives the delivery protocol needs:
//! sorted-set insert, minimum peek and cardinality, hash-field reads and
//! deletes, two small transactions (claim and requeue), and a non-blocking
//! lock pair.
//!
//! Two implementations ship with the crate:
//!
//! - [`RedisStore`](redis::RedisStore): the durable backend, on a bb8
//!   connection pool (behind the default `redis` feature).
//! - [`MemoryStore`]: a process-local mirror of the same contract, used by
//!   the test suite and good enough for ephemeral single-process queues.
//!
//! # Example: a custom store
//!
//! ```rust,ignore
//! use visq::{PriorityQueue, QueueStore};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct MyStore { /* ... */ }
//!
//! #[async_trait]
//! impl QueueStore for MyStore {
//!     // Implement the primitives...
//! }
//!
//! let queue = PriorityQueue::builder()
//!     .store(Arc::new(MyStore::new()))
//!     .build()
//!     .await?;
//! ```

mod memory;

#[cfg(feature = "redis")]
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueError;

pub use memory::MemoryStore;

#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Primitives the engine needs from a backing store.
///
/// All operations are expected to be atomic on their own; [`claim`] and
/// [`requeue`] bundle several mutations into one atomic transaction.
///
/// [`claim`]: QueueStore::claim
/// [`requeue`]: QueueStore::requeue
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert `member` into the queue's sorted set at `score`, rescoring it
    /// if it is already present.
    async fn insert(&self, queue_key: &str, member: &str, score: f64) -> Result<(), QueueError>;

    /// The lowest-scored member and its score, if any member is waiting.
    async fn peek_min(&self, queue_key: &str) -> Result<Option<(String, f64)>, QueueError>;

    /// Number of members waiting in the sorted set.
    async fn queue_card(&self, queue_key: &str) -> Result<u64, QueueError>;

    /// Number of in-flight session entries in the element hash.
    async fn session_card(&self, element_key: &str) -> Result<u64, QueueError>;

    /// Atomically claim `member`: remove it from the sorted set, seed the
    /// session's retry counter at `seed` if the field is new, refresh the
    /// element-hash expiry to `entry_ttl`, and increment the counter.
    ///
    /// Returns whether the member was actually removed, and the counter
    /// value after the increment.
    async fn claim(
        &self,
        queue_key: &str,
        member: &str,
        element_key: &str,
        session: &str,
        seed: u32,
        entry_ttl: Duration,
    ) -> Result<(bool, u32), QueueError>;

    /// Atomically move a delivery back into the queue: delete its session
    /// entry and re-insert `member` at `score`.
    async fn requeue(
        &self,
        queue_key: &str,
        member: &str,
        score: f64,
        element_key: &str,
        session: &str,
    ) -> Result<(), QueueError>;

    /// Raw retry-counter text for a session, if the entry exists.
    async fn read_session(
        &self,
        element_key: &str,
        session: &str,
    ) -> Result<Option<String>, QueueError>;

    /// Delete a session's retry-counter entry. Returns whether it existed.
    async fn remove_session(&self, element_key: &str, session: &str) -> Result<bool, QueueError>;

    /// Take the lock if it is free, with `ttl` bounding how long it can be
    /// held. Never blocks; returns false when the lock is taken.
    async fn acquire_lock(&self, lock_key: &str, ttl: Duration) -> Result<bool, QueueError>;

    /// Release the lock. Releasing a lock that already expired is not an
    /// error.
    async fn release_lock(&self, lock_key: &str) -> Result<(), QueueError>;
}
