//! End-to-end delivery flows over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use visq::{
    DeliveryOutcome, Element, MemoryStore, PriorityQueue, QueueConfig, QueueError, QueueStore,
    ScoreStrategy,
};

/// Short enough to keep the suite fast, long enough to not race the runtime.
const FLOOR: Duration = Duration::from_millis(40);

/// Scores are the element's priority verbatim and the visibility timeout is
/// the raw estimate, so tests control both exactly.
struct DirectScore;

impl ScoreStrategy for DirectScore {
    fn score(&self, element: &Element) -> f64 {
        element.priority as f64
    }

    fn timeout(&self, element: &Element) -> Duration {
        element.estimated_runtime
    }
}

fn queue_with(max_length: u64, retry_limit: u32) -> (PriorityQueue, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let config = QueueConfig {
        queue_id: Some("flow".into()),
        max_length,
        timeout_floor: FLOOR,
        retry_limit,
    };
    let queue = PriorityQueue::new(store.clone(), Arc::new(DirectScore), config);
    (queue, store)
}

#[tokio::test]
async fn pops_lowest_score_first_and_ack_frees_depth() {
    let (queue, _) = queue_with(16, 3);
    queue.push(&Element::new("A", 10)).await.unwrap();
    queue.push(&Element::new("B", 5)).await.unwrap();
    assert_eq!(queue.depth().await.unwrap(), 2);

    let first = queue.pop().await.unwrap();
    assert_eq!(first.id, "B");
    assert_eq!(first.attempt, 1);
    assert_eq!(first.score, 5.0);
    // B is in flight, not gone.
    assert_eq!(queue.depth().await.unwrap(), 2);

    queue.ack(&first.session).await.unwrap();
    assert_eq!(queue.depth().await.unwrap(), 1);

    let second = queue.pop().await.unwrap();
    assert_eq!(second.id, "A");
    queue.ack(&second.session).await.unwrap();
    assert_eq!(queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn full_queue_accepts_again_after_ack() {
    let (queue, _) = queue_with(1, 3);
    queue.push(&Element::new("a", 1)).await.unwrap();
    assert!(matches!(
        queue.push(&Element::new("b", 1)).await,
        Err(QueueError::Full)
    ));

    // Claiming does not free the slot; the element is still in flight.
    let delivery = queue.pop().await.unwrap();
    assert!(matches!(
        queue.push(&Element::new("b", 1)).await,
        Err(QueueError::Full)
    ));

    queue.ack(&delivery.session).await.unwrap();
    queue.push(&Element::new("b", 1)).await.unwrap();
}

#[tokio::test]
async fn full_queue_accepts_again_after_a_permanent_drop() {
    let (queue, _) = queue_with(1, 1);
    queue.push(&Element::new("a", 1)).await.unwrap();

    let delivery = queue.pop().await.unwrap();
    assert!(matches!(
        queue.push(&Element::new("b", 1)).await,
        Err(QueueError::Full)
    ));

    let outcome = delivery.outcome.await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::Dropped { attempt: 1 });
    assert_eq!(queue.depth().await.unwrap(), 0);
    queue.push(&Element::new("b", 1)).await.unwrap();
}

#[tokio::test]
async fn pop_fails_fast_while_the_lock_is_held() {
    let (queue, store) = queue_with(16, 3);
    queue.push(&Element::new("a", 1)).await.unwrap();

    assert!(store
        .acquire_lock(visq::queue::LOCK_KEY, Duration::from_secs(1))
        .await
        .unwrap());
    assert!(matches!(queue.pop().await, Err(QueueError::Locked)));
    assert_eq!(queue.depth().await.unwrap(), 1);

    store.release_lock(visq::queue::LOCK_KEY).await.unwrap();
    let delivery = queue.pop().await.unwrap();
    assert_eq!(delivery.id, "a");
    queue.ack(&delivery.session).await.unwrap();
}

#[tokio::test]
async fn acked_elements_never_reappear() {
    let (queue, _) = queue_with(16, 3);
    queue.push(&Element::new("a", 1)).await.unwrap();

    let delivery = queue.pop().await.unwrap();
    queue.ack(&delivery.session).await.unwrap();

    // The watcher resolves silently; the outcome channel just closes.
    assert!(delivery.outcome.await.is_err());

    tokio::time::sleep(FLOOR * 3).await;
    assert!(matches!(queue.pop().await, Err(QueueError::Empty)));
    assert_eq!(queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn expiry_redelivers_with_rising_attempts_then_drops() {
    let (queue, _) = queue_with(16, 3);
    queue.push(&Element::new("c", 1)).await.unwrap();

    let first = queue.pop().await.unwrap();
    assert_eq!(first.attempt, 1);
    assert_eq!(
        first.outcome.await.unwrap(),
        DeliveryOutcome::Requeued { attempt: 1 }
    );

    let second = queue.pop().await.unwrap();
    assert_eq!(second.attempt, 2);
    assert_eq!(
        second.outcome.await.unwrap(),
        DeliveryOutcome::Requeued { attempt: 2 }
    );

    let third = queue.pop().await.unwrap();
    assert_eq!(third.attempt, 3);
    assert_eq!(
        third.outcome.await.unwrap(),
        DeliveryOutcome::Dropped { attempt: 3 }
    );

    assert!(matches!(queue.pop().await, Err(QueueError::Empty)));
    assert_eq!(queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn late_ack_does_not_disturb_the_successor_delivery() {
    let (queue, _) = queue_with(16, 3);
    queue.push(&Element::new("c", 1)).await.unwrap();

    let first = queue.pop().await.unwrap();
    assert_eq!(
        first.outcome.await.unwrap(),
        DeliveryOutcome::Requeued { attempt: 1 }
    );

    let second = queue.pop().await.unwrap();
    assert_eq!(second.attempt, 2);

    // Acking the expired first delivery succeeds but touches nothing.
    queue.ack(&first.session).await.unwrap();
    assert_eq!(queue.depth().await.unwrap(), 1);

    // The second delivery's watcher is still armed and expires on its own.
    assert_eq!(
        second.outcome.await.unwrap(),
        DeliveryOutcome::Requeued { attempt: 2 }
    );

    let third = queue.pop().await.unwrap();
    assert_eq!(third.attempt, 3);
    queue.ack(&third.session).await.unwrap();
    assert_eq!(queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn ack_is_idempotent() {
    let (queue, _) = queue_with(16, 3);
    queue.push(&Element::new("a", 1)).await.unwrap();

    let delivery = queue.pop().await.unwrap();
    queue.ack(&delivery.session).await.unwrap();
    queue.ack(&delivery.session).await.unwrap();
    assert_eq!(queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn retry_count_matches_the_delivery_attempt() {
    let (queue, _) = queue_with(16, 3);
    queue.push(&Element::new("a", 1)).await.unwrap();

    let delivery = queue.pop().await.unwrap();
    assert_eq!(queue.retry_count(&delivery.session).await.unwrap(), 1);

    queue.ack(&delivery.session).await.unwrap();
    assert!(matches!(
        queue.retry_count(&delivery.session).await,
        Err(QueueError::Store(_))
    ));
}

#[tokio::test]
async fn elements_keep_their_visibility_timeout_across_requeues() {
    let (queue, _) = queue_with(16, 3);
    let timeout = Duration::from_millis(60);
    queue
        .push(&Element::new("slow", 1).with_estimated_runtime(timeout))
        .await
        .unwrap();

    let first = queue.pop().await.unwrap();
    assert_eq!(first.timeout, timeout);
    assert_eq!(
        first.outcome.await.unwrap(),
        DeliveryOutcome::Requeued { attempt: 1 }
    );

    let second = queue.pop().await.unwrap();
    assert_eq!(second.timeout, timeout);
    assert_eq!(second.score, first.score);
    queue.ack(&second.session).await.unwrap();
}
