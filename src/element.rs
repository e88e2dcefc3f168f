//! Element contract and scoring strategies.
//!
//! An [`Element`] is what callers push: an identifier plus the fields a
//! [`ScoreStrategy`] reads to place it in the queue. The strategy is chosen
//! once, at engine construction, and decides both the persisted priority
//! score (lower pops first) and the visibility timeout of each delivery.
//! [`WeightedAge`] is the stock strategy; anything implementing the trait
//! can replace it without touching engine code.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of work submitted to the queue.
///
/// The engine persists only the identifier, the computed timeout, and the
/// computed score; the rest of the fields exist for strategies to read at
/// push time. Resolve the identifier back to your payload on the consumer
/// side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    /// Opaque identifier. Must not contain `|`, which the wire encoding
    /// reserves as its separator.
    pub id: String,
    /// Priority weight. Under [`WeightedAge`] a smaller weight pops sooner.
    pub priority: i64,
    /// When the element entered the system.
    pub created_at: DateTime<Utc>,
    /// Expected duration of one processing attempt.
    #[serde(default)]
    pub estimated_runtime: Duration,
}

impl Element {
    /// New element created now, with no runtime estimate.
    pub fn new(id: impl Into<String>, priority: i64) -> Self {
        Self {
            id: id.into(),
            priority,
            created_at: Utc::now(),
            estimated_runtime: Duration::ZERO,
        }
    }

    /// Set the expected duration of one processing attempt.
    pub fn with_estimated_runtime(mut self, estimate: Duration) -> Self {
        self.estimated_runtime = estimate;
        self
    }

    /// Override the creation timestamp.
    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }
}

/// Computes the persisted score and the visibility timeout for an element.
///
/// Injected into the engine at construction. The engine assumes nothing
/// about scores beyond total ordering: lower values pop first, ties are
/// unspecified. The score is computed once at push and written to the
/// store; requeues reuse the stored value.
pub trait ScoreStrategy: Send + Sync {
    /// Priority score for `element`. Lower pops first.
    fn score(&self, element: &Element) -> f64;

    /// Visibility timeout for one delivery of `element`. The engine raises
    /// this to the configured floor when arming the watcher.
    fn timeout(&self, element: &Element) -> Duration;
}

/// Stock strategy: priority weight multiplied by age relative to a fixed
/// pivot instant.
///
/// With elements created after the pivot, a smaller weight wins, and among
/// equal weights the earlier `created_at` wins, so the queue drains in
/// weighted FIFO order. The pivot is captured once per strategy; processes
/// sharing a queue must share a pivot convention or their scores will not
/// agree.
///
/// The timeout is twice the element's estimated runtime.
#[derive(Debug, Clone)]
pub struct WeightedAge {
    pivot_ns: i64,
}

impl WeightedAge {
    /// Pivot at the current instant, the usual choice for a process that
    /// owns its queue.
    pub fn new() -> Self {
        Self::with_pivot(Utc::now())
    }

    /// Pivot at an agreed instant, for queues shared across processes.
    pub fn with_pivot(pivot: DateTime<Utc>) -> Self {
        Self {
            pivot_ns: pivot.timestamp_nanos_opt().unwrap_or_default(),
        }
    }
}

impl Default for WeightedAge {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreStrategy for WeightedAge {
    fn score(&self, element: &Element) -> f64 {
        let created_ns = element.created_at.timestamp_nanos_opt().unwrap_or_default();
        element.priority as f64 * (created_ns - self.pivot_ns) as f64
    }

    fn timeout(&self, element: &Element) -> Duration {
        element.estimated_runtime.saturating_mul(2)
    }
}
