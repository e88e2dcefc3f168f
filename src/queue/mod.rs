//! Queue engine: push, pop with visibility watchers, ack, and queries.
//!
//! The engine owns the delivery protocol end to end. A pop claims the
//! lowest-scored element under a short store-side lock, registers the
//! delivery's cancellation entry, runs the claim transaction, and spawns a
//! watcher that makes the element visible again (or drops it for good) if
//! no ack arrives within its visibility timeout. Everything the protocol
//! persists lives under two keys derived from the queue id, plus one lock
//! key shared by every queue on the store.

mod session;
mod watcher;

pub use session::Session;
pub use watcher::DeliveryOutcome;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::element::{Element, ScoreStrategy, WeightedAge};
use crate::error::QueueError;
use crate::store::QueueStore;
#[cfg(feature = "redis")]
use crate::store::RedisStore;

use session::Member;
use watcher::{CancelRegistry, Watcher};

/// Lock key serializing pops across every queue on the same store.
pub const LOCK_KEY: &str = "redisqueue:lock";

const LOCK_TTL: Duration = Duration::from_millis(10);
const ENTRY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One claimed element, plus the channel its watcher reports on.
///
/// Await `outcome` to learn how the delivery ended: [`DeliveryOutcome`]
/// arrives exactly once when the visibility timeout resolves it, and the
/// channel closes with no message when the element was acked in time.
#[derive(Debug)]
pub struct Delivery {
    /// Identifier the element was pushed with.
    pub id: String,
    /// 1-based delivery attempt, as persisted by the claim.
    pub attempt: u32,
    /// Visibility timeout encoded in the claimed member, before the
    /// configured floor is applied.
    pub timeout: Duration,
    /// Score the element is ordered by.
    pub score: f64,
    /// Correlation key for acking this delivery.
    pub session: Session,
    /// Resolves when the watcher settles the delivery.
    pub outcome: oneshot::Receiver<DeliveryOutcome>,
}

/// Priority queue engine over a [`QueueStore`].
///
/// Delivery is at-least-once: an element stays invisible from its pop until
/// either an ack or its visibility timeout, after which it is redelivered
/// with an incremented attempt count until the retry limit permanently
/// drops it. Clones share the store, the strategy, and the cancellation
/// registry, so any clone may ack a delivery popped through another.
///
/// # Example
///
/// ```rust,ignore
/// use visq::{Element, PriorityQueue};
///
/// let queue = PriorityQueue::builder()
///     .store_url("redis://127.0.0.1:6379")
///     .queue_id("jobs")
///     .build()
///     .await?;
///
/// queue.push(&Element::new("job-1", 5)).await?;
/// let delivery = queue.pop().await?;
/// queue.ack(&delivery.session).await?;
/// ```
#[derive(Clone)]
pub struct PriorityQueue {
    store: Arc<dyn QueueStore>,
    strategy: Arc<dyn ScoreStrategy>,
    registry: CancelRegistry,
    queue_id: String,
    queue_key: String,
    element_key: String,
    max_length: u64,
    timeout_floor: Duration,
    retry_limit: u32,
}

impl std::fmt::Debug for PriorityQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("queue_id", &self.queue_id)
            .field("queue_key", &self.queue_key)
            .field("element_key", &self.element_key)
            .field("max_length", &self.max_length)
            .field("timeout_floor", &self.timeout_floor)
            .field("retry_limit", &self.retry_limit)
            .finish_non_exhaustive()
    }
}

impl PriorityQueue {
    /// Create an engine over an existing store.
    ///
    /// The config is taken as given; [`builder`](Self::builder) is the
    /// validating front door.
    pub fn new(
        store: Arc<dyn QueueStore>,
        strategy: Arc<dyn ScoreStrategy>,
        config: QueueConfig,
    ) -> Self {
        let queue_id = config
            .queue_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self {
            queue_key: format!("{}:queue", queue_id),
            element_key: format!("{}:element", queue_id),
            store,
            strategy,
            registry: CancelRegistry::new(),
            queue_id,
            max_length: config.max_length,
            timeout_floor: config.timeout_floor,
            retry_limit: config.retry_limit,
        }
    }

    /// Builder for connecting and configuring an engine.
    pub fn builder() -> QueueBuilder {
        QueueBuilder::new()
    }

    /// Identifier namespacing this queue's keys.
    pub fn queue_id(&self) -> &str {
        &self.queue_id
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Enqueue an element at the score the strategy assigns it.
    ///
    /// Fails with [`QueueError::Full`] when queued plus in-flight elements
    /// have reached the configured maximum, and with [`QueueError::Parse`]
    /// when the identifier contains the reserved `|` separator.
    pub async fn push(&self, element: &Element) -> Result<(), QueueError> {
        if element.id.contains('|') {
            return Err(QueueError::Parse(format!(
                "identifier {:?} contains the reserved separator '|'",
                element.id
            )));
        }
        if self.depth().await? >= self.max_length {
            return Err(QueueError::Full);
        }

        let score = self.strategy.score(element);
        let timeout = self.strategy.timeout(element);
        let member = Member::new(&element.id, timeout, 0);
        self.store
            .insert(&self.queue_key, &member.encode(), score)
            .await?;
        info!(
            element_id = %element.id,
            score = %score,
            queue_id = %self.queue_id,
            "Element enqueued"
        );
        Ok(())
    }

    /// Claim the lowest-scored element and arm its visibility watcher.
    ///
    /// Fails fast with [`QueueError::Locked`] when another consumer holds
    /// the pop lock and with [`QueueError::Empty`] when nothing is queued.
    /// The lock is released before this returns, on every path.
    pub async fn pop(&self) -> Result<Delivery, QueueError> {
        if !self.store.acquire_lock(LOCK_KEY, LOCK_TTL).await? {
            debug!(queue_id = %self.queue_id, "Pop lock contended");
            return Err(QueueError::Locked);
        }
        let result = self.pop_locked().await;
        if let Err(e) = self.store.release_lock(LOCK_KEY).await {
            warn!(error = %e, "Failed to release the pop lock, waiting out its TTL");
        }
        result
    }

    async fn pop_locked(&self) -> Result<Delivery, QueueError> {
        let (raw, score) = match self.store.peek_min(&self.queue_key).await? {
            Some(head) => head,
            None => return Err(QueueError::Empty),
        };
        let member = Member::decode(&raw)?;

        // Armed before the claim so an ack can never miss the entry.
        let session = Session::mint(&member.id);
        let cancel = self.registry.arm(&session);

        let claimed = self
            .store
            .claim(
                &self.queue_key,
                &raw,
                &self.element_key,
                session.as_str(),
                member.attempts,
                ENTRY_TTL,
            )
            .await;
        let (removed, attempt) = match claimed {
            Ok(claimed) => claimed,
            Err(e) => {
                self.registry.take(&session);
                return Err(e);
            }
        };
        if !removed {
            self.registry.take(&session);
            if let Err(e) = self
                .store
                .remove_session(&self.element_key, session.as_str())
                .await
            {
                warn!(session = %session, error = %e, "Failed to discard the session of a lost claim");
            }
            return Err(QueueError::Store(format!(
                "queue head {raw:?} changed before it could be claimed"
            )));
        }

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let watcher = Watcher {
            store: Arc::clone(&self.store),
            registry: self.registry.clone(),
            queue_key: self.queue_key.clone(),
            element_key: self.element_key.clone(),
            session: session.clone(),
            member: Member::new(&member.id, member.timeout, attempt),
            score,
            wait: member.timeout.max(self.timeout_floor),
            retry_limit: self.retry_limit,
            cancel,
            outcome: outcome_tx,
        };
        tokio::spawn(watcher.run());

        debug!(
            element_id = %member.id,
            session = %session,
            attempt = attempt,
            "Element claimed"
        );
        Ok(Delivery {
            id: member.id,
            attempt,
            timeout: member.timeout,
            score,
            session,
            outcome: outcome_rx,
        })
    }

    /// Settle a delivery.
    ///
    /// Idempotent: acking a session the watcher already settled, or acking
    /// twice, succeeds without effect.
    pub async fn ack(&self, session: &Session) -> Result<(), QueueError> {
        let removed = self
            .store
            .remove_session(&self.element_key, session.as_str())
            .await?;
        if let Some(signal) = self.registry.take(session) {
            let _ = signal.send(());
        }
        if removed {
            info!(session = %session, "Delivery acked");
        } else {
            debug!(session = %session, "Ack for a session already settled");
        }
        Ok(())
    }

    /// Retry counter of a delivery, as persisted in the store.
    ///
    /// Equals [`Delivery::attempt`] while the delivery is in flight; once
    /// the session is settled the record is gone and this fails with
    /// [`QueueError::Store`].
    pub async fn retry_count(&self, session: &Session) -> Result<u32, QueueError> {
        match self
            .store
            .read_session(&self.element_key, session.as_str())
            .await?
        {
            Some(raw) => raw.parse().map_err(|_| {
                QueueError::Parse(format!("retry counter {raw:?} is not an integer"))
            }),
            None => Err(QueueError::Store(format!(
                "no retry record for session {session}"
            ))),
        }
    }

    /// Elements waiting in the queue plus deliveries currently in flight.
    pub async fn depth(&self) -> Result<u64, QueueError> {
        let queued = self.store.queue_card(&self.queue_key).await?;
        let in_flight = self.store.session_card(&self.element_key).await?;
        Ok(queued + in_flight)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`PriorityQueue`].
pub struct QueueBuilder {
    store: Option<Arc<dyn QueueStore>>,
    store_url: Option<String>,
    strategy: Option<Arc<dyn ScoreStrategy>>,
    config: QueueConfig,
}

impl QueueBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            store_url: None,
            strategy: None,
            config: QueueConfig::default(),
        }
    }

    /// Use an already constructed store.
    pub fn store(mut self, store: Arc<dyn QueueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Connect a [`RedisStore`] to this URL at build time. Ignored when an
    /// explicit store is given.
    pub fn store_url(mut self, url: impl Into<String>) -> Self {
        self.store_url = Some(url.into());
        self
    }

    /// Replace the default [`WeightedAge`] scoring strategy.
    pub fn strategy(mut self, strategy: Arc<dyn ScoreStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Replace the whole config in one call.
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the queue id instead of generating one.
    pub fn queue_id(mut self, id: impl Into<String>) -> Self {
        self.config.queue_id = Some(id.into());
        self
    }

    /// Cap on queued plus in-flight elements.
    pub fn max_length(mut self, max: u64) -> Self {
        self.config.max_length = max;
        self
    }

    /// Lower bound applied to every visibility timeout.
    pub fn timeout_floor(mut self, floor: Duration) -> Self {
        self.config.timeout_floor = floor;
        self
    }

    /// Delivery attempts before an expired timeout drops an element.
    pub fn retry_limit(mut self, limit: u32) -> Self {
        self.config.retry_limit = limit;
        self
    }

    /// Validate the config, connect the store if necessary, and build the
    /// engine.
    pub async fn build(self) -> Result<PriorityQueue, QueueError> {
        let QueueBuilder {
            store,
            store_url,
            strategy,
            config,
        } = self;
        config.validate()?;

        let store = match store {
            Some(store) => store,
            None => Self::connect(store_url).await?,
        };
        let strategy = strategy.unwrap_or_else(|| Arc::new(WeightedAge::new()));
        Ok(PriorityQueue::new(store, strategy, config))
    }

    #[cfg(feature = "redis")]
    async fn connect(url: Option<String>) -> Result<Arc<dyn QueueStore>, QueueError> {
        let url = url.unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());
        Ok(Arc::new(RedisStore::connect(&url).await?))
    }

    #[cfg(not(feature = "redis"))]
    async fn connect(_url: Option<String>) -> Result<Arc<dyn QueueStore>, QueueError> {
        Err(QueueError::Configuration(
            "no store given and the redis feature is disabled".into(),
        ))
    }
}

impl Default for QueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}
