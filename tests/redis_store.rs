//! Smoke test against a live Redis. Run with `cargo test -- --ignored`.

#![cfg(feature = "redis")]

use std::time::Duration;

use visq::{Element, PriorityQueue, QueueError};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

#[tokio::test]
#[ignore = "needs a redis server, set REDIS_URL or run one on 127.0.0.1:6379"]
async fn push_pop_ack_round_trip() {
    // A generated queue id keeps this run's keys away from everyone else's.
    let queue = PriorityQueue::builder()
        .store_url(redis_url())
        .timeout_floor(Duration::from_secs(2))
        .build()
        .await
        .expect("store reachable");

    queue.push(&Element::new("smoke-1", 2)).await.unwrap();
    queue.push(&Element::new("smoke-2", 1)).await.unwrap();
    assert_eq!(queue.depth().await.unwrap(), 2);

    let delivery = queue.pop().await.unwrap();
    assert_eq!(delivery.id, "smoke-2");
    assert_eq!(delivery.attempt, 1);
    assert_eq!(queue.retry_count(&delivery.session).await.unwrap(), 1);

    queue.ack(&delivery.session).await.unwrap();
    let next = queue.pop().await.unwrap();
    assert_eq!(next.id, "smoke-1");
    queue.ack(&next.session).await.unwrap();

    assert!(matches!(queue.pop().await, Err(QueueError::Empty)));
    assert_eq!(queue.depth().await.unwrap(), 0);
}
