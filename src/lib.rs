//! visq: a priority queue on Redis sorted sets with visibility timeouts
//!
//! Elements are pushed at a score computed by a pluggable strategy and popped
//! lowest score first. Delivery is at-least-once: every pop arms a concurrent
//! watcher that makes the element visible again if no ack arrives within its
//! visibility timeout, and retries are bounded, so an element that keeps
//! expiring is eventually dropped for good. The crate provides:
//! - **Strategy-driven ordering** with [`ScoreStrategy`] injected at
//!   construction; [`WeightedAge`] ships as the stock implementation
//! - **Visibility timeouts** enforced by one watcher task per delivery,
//!   racing a timer against the ack signal
//! - **Bounded retries** with the attempt count persisted across redeliveries
//!   and a permanent drop at the configured limit
//! - **Per-delivery sessions** so late acks can never disturb a successor
//!   delivery of the same element
//! - **A store seam** ([`QueueStore`]) with Redis and in-memory
//!   implementations
//! - **Fail-fast pop locking** so concurrent consumers contend in
//!   microseconds, not blocking waits
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use visq::{Element, PriorityQueue};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let queue = PriorityQueue::builder()
//!         .store_url("redis://127.0.0.1:6379")
//!         .queue_id("invoices")
//!         .max_length(10_000)
//!         .timeout_floor(Duration::from_secs(1))
//!         .retry_limit(3)
//!         .build()
//!         .await?;
//!
//!     // Producers push ids; payloads live wherever you keep them.
//!     let element = Element::new("invoice-31", 5)
//!         .with_estimated_runtime(Duration::from_secs(2));
//!     queue.push(&element).await?;
//!
//!     // Consumers pop, work, and ack within the visibility timeout.
//!     let delivery = queue.pop().await?;
//!     println!("processing {} (attempt {})", delivery.id, delivery.attempt);
//!     queue.ack(&delivery.session).await?;
//!
//!     // An abandoned delivery expires; its watcher reports what it did.
//!     queue.push(&Element::new("invoice-32", 9)).await?;
//!     let abandoned = queue.pop().await?;
//!     if let Ok(outcome) = abandoned.outcome.await {
//!         println!("watcher settled invoice-32: {outcome:?}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Delivery lifecycle
//!
//! A pushed element waits in the store's sorted set at its score. `pop`
//! removes the lowest-scored element inside a small transaction that also
//! starts its session: a retry counter keyed by a fresh per-delivery session
//! string. If `ack` arrives before the visibility timeout the session ends
//! silently. Otherwise the watcher either re-inserts the element at its
//! original score (attempt count carried along) or, once the retry limit is
//! reached, deletes it permanently. Both expiry outcomes are reported on the
//! delivery's `outcome` channel.

pub mod config;
pub mod element;
pub mod error;
pub mod queue;
pub mod store;

pub use config::QueueConfig;
pub use element::{Element, ScoreStrategy, WeightedAge};
pub use error::QueueError;
pub use queue::{Delivery, DeliveryOutcome, PriorityQueue, QueueBuilder, Session};
pub use store::{MemoryStore, QueueStore};

#[cfg(feature = "redis")]
pub use store::RedisStore;
