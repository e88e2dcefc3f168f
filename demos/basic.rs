//! Push, pop, and ack against a local Redis, then let one delivery expire.

use std::time::Duration;

use visq::{Element, PriorityQueue};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let queue = PriorityQueue::builder()
        .store_url(&redis_url)
        .queue_id("demo")
        .max_length(64)
        .timeout_floor(Duration::from_secs(1))
        .retry_limit(3)
        .build()
        .await?;

    queue
        .push(&Element::new("invoice-31", 5).with_estimated_runtime(Duration::from_secs(1)))
        .await?;
    queue
        .push(&Element::new("invoice-32", 1).with_estimated_runtime(Duration::from_secs(1)))
        .await?;
    println!("queued {} elements", queue.depth().await?);

    // Lower weight wins: invoice-32 comes out first.
    let delivery = queue.pop().await?;
    println!("claimed {} (attempt {})", delivery.id, delivery.attempt);
    queue.ack(&delivery.session).await?;

    // Skip the ack on the second one and watch it expire.
    let abandoned = queue.pop().await?;
    println!("claimed {} and walking away", abandoned.id);
    match abandoned.outcome.await {
        Ok(outcome) => println!("watcher settled it: {outcome:?}"),
        Err(_) => println!("acked before the timeout"),
    }

    println!("queue depth is now {}", queue.depth().await?);
    Ok(())
}
