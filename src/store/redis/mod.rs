//! Redis implementation of the store contract.
//!
//! The queue's sorted set holds the encoded members at their scores; the
//! element hash holds one retry-counter field per in-flight session, stored
//! as integer text; the pop lock is a plain `SET NX PX` key. The claim and
//! requeue transactions run as `MULTI`/`EXEC` pipelines so that nothing
//! observes a delivery that is half moved.
//!
//! Valkey works unchanged, since it speaks the same protocol.

mod pool;

pub use pool::{create_pool, create_pool_with_config, PoolConfig};

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;

use super::QueueStore;
use crate::error::QueueError;

/// Store implementation on a bb8-managed Redis pool.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool<RedisConnectionManager>,
}

impl RedisStore {
    /// Connect with default pool settings and verify reachability.
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        Ok(Self {
            pool: create_pool(redis_url).await?,
        })
    }

    /// Connect with custom pool settings and verify reachability.
    pub async fn connect_with_config(
        redis_url: &str,
        config: PoolConfig,
    ) -> Result<Self, QueueError> {
        Ok(Self {
            pool: create_pool_with_config(redis_url, config).await?,
        })
    }

    /// Wrap an existing pool.
    pub fn with_pool(pool: Pool<RedisConnectionManager>) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &Pool<RedisConnectionManager> {
        &self.pool
    }

    async fn conn(&self) -> Result<PooledConnection<'_, RedisConnectionManager>, QueueError> {
        self.pool
            .get()
            .await
            .map_err(|e| QueueError::Store(format!("connection pool: {}", e)))
    }
}

// ============================================================================
// QueueStore implementation
// ============================================================================

#[async_trait]
impl QueueStore for RedisStore {
    async fn insert(&self, queue_key: &str, member: &str, score: f64) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let _: () = conn.zadd(queue_key, member, score).await?;
        Ok(())
    }

    async fn peek_min(&self, queue_key: &str) -> Result<Option<(String, f64)>, QueueError> {
        let mut conn = self.conn().await?;
        let head: Vec<(String, f64)> = conn.zrange_withscores(queue_key, 0, 0).await?;
        Ok(head.into_iter().next())
    }

    async fn queue_card(&self, queue_key: &str) -> Result<u64, QueueError> {
        let mut conn = self.conn().await?;
        let count: u64 = conn.zcard(queue_key).await?;
        Ok(count)
    }

    async fn session_card(&self, element_key: &str) -> Result<u64, QueueError> {
        let mut conn = self.conn().await?;
        let count: u64 = conn.hlen(element_key).await?;
        Ok(count)
    }

    async fn claim(
        &self,
        queue_key: &str,
        member: &str,
        element_key: &str,
        session: &str,
        seed: u32,
        entry_ttl: Duration,
    ) -> Result<(bool, u32), QueueError> {
        let mut conn = self.conn().await?;
        let (removed, _seeded, _refreshed, count): (i64, i64, i64, i64) = redis::pipe()
            .atomic()
            .zrem(queue_key, member)
            .hset_nx(element_key, session, i64::from(seed))
            .expire(element_key, entry_ttl.as_secs() as i64)
            .hincr(element_key, session, 1)
            .query_async(&mut *conn)
            .await?;
        Ok((removed > 0, count.clamp(0, i64::from(u32::MAX)) as u32))
    }

    async fn requeue(
        &self,
        queue_key: &str,
        member: &str,
        score: f64,
        element_key: &str,
        session: &str,
    ) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let (_removed, _added): (i64, i64) = redis::pipe()
            .atomic()
            .hdel(element_key, session)
            .zadd(queue_key, member, score)
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    async fn read_session(
        &self,
        element_key: &str,
        session: &str,
    ) -> Result<Option<String>, QueueError> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.hget(element_key, session).await?;
        Ok(value)
    }

    async fn remove_session(&self, element_key: &str, session: &str) -> Result<bool, QueueError> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.hdel(element_key, session).await?;
        Ok(removed > 0)
    }

    async fn acquire_lock(&self, lock_key: &str, ttl: Duration) -> Result<bool, QueueError> {
        let mut conn = self.conn().await?;
        let ttl_ms = ttl.as_millis().max(1) as u64;
        let taken: Option<String> = redis::cmd("SET")
            .arg(lock_key)
            .arg("true")
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut *conn)
            .await?;
        Ok(taken.is_some())
    }

    async fn release_lock(&self, lock_key: &str) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let _: i64 = conn.del(lock_key).await?;
        Ok(())
    }
}
