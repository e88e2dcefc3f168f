//! In-memory store for tests and ephemeral single-process queues.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::QueueStore;
use crate::error::QueueError;

#[derive(Default)]
struct MemoryState {
    zsets: HashMap<String, Vec<(String, f64)>>,
    hashes: HashMap<String, HashMap<String, i64>>,
    locks: HashMap<String, Instant>,
}

impl MemoryState {
    fn zset_insert(&mut self, key: &str, member: &str, score: f64) {
        let set = self.zsets.entry(key.to_string()).or_default();
        if let Some(entry) = set.iter_mut().find(|(m, _)| m == member) {
            entry.1 = score;
        } else {
            set.push((member.to_string(), score));
        }
    }

    fn zset_remove(&mut self, key: &str, member: &str) -> bool {
        match self.zsets.get_mut(key) {
            Some(set) => match set.iter().position(|(m, _)| m == member) {
                Some(idx) => {
                    set.remove(idx);
                    true
                }
                None => false,
            },
            None => false,
        }
    }
}

/// Mutex-guarded mirror of the store contract.
///
/// Key expiry is modeled for locks only; element-hash TTLs are accepted and
/// ignored, since nothing in-process outlives them.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn insert(&self, queue_key: &str, member: &str, score: f64) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.zset_insert(queue_key, member, score);
        Ok(())
    }

    async fn peek_min(&self, queue_key: &str) -> Result<Option<(String, f64)>, QueueError> {
        let state = self.state.lock().await;
        let head = state.zsets.get(queue_key).and_then(|set| {
            set.iter()
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .cloned()
        });
        Ok(head)
    }

    async fn queue_card(&self, queue_key: &str) -> Result<u64, QueueError> {
        let state = self.state.lock().await;
        Ok(state.zsets.get(queue_key).map(|set| set.len() as u64).unwrap_or(0))
    }

    async fn session_card(&self, element_key: &str) -> Result<u64, QueueError> {
        let state = self.state.lock().await;
        Ok(state
            .hashes
            .get(element_key)
            .map(|hash| hash.len() as u64)
            .unwrap_or(0))
    }

    async fn claim(
        &self,
        queue_key: &str,
        member: &str,
        element_key: &str,
        session: &str,
        seed: u32,
        _entry_ttl: Duration,
    ) -> Result<(bool, u32), QueueError> {
        let mut state = self.state.lock().await;
        let removed = state.zset_remove(queue_key, member);
        let hash = state.hashes.entry(element_key.to_string()).or_default();
        let counter = hash.entry(session.to_string()).or_insert(i64::from(seed));
        *counter += 1;
        let count = (*counter).clamp(0, i64::from(u32::MAX)) as u32;
        Ok((removed, count))
    }

    async fn requeue(
        &self,
        queue_key: &str,
        member: &str,
        score: f64,
        element_key: &str,
        session: &str,
    ) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if let Some(hash) = state.hashes.get_mut(element_key) {
            hash.remove(session);
        }
        state.zset_insert(queue_key, member, score);
        Ok(())
    }

    async fn read_session(
        &self,
        element_key: &str,
        session: &str,
    ) -> Result<Option<String>, QueueError> {
        let state = self.state.lock().await;
        Ok(state
            .hashes
            .get(element_key)
            .and_then(|hash| hash.get(session))
            .map(|count| count.to_string()))
    }

    async fn remove_session(&self, element_key: &str, session: &str) -> Result<bool, QueueError> {
        let mut state = self.state.lock().await;
        Ok(state
            .hashes
            .get_mut(element_key)
            .map(|hash| hash.remove(session).is_some())
            .unwrap_or(false))
    }

    async fn acquire_lock(&self, lock_key: &str, ttl: Duration) -> Result<bool, QueueError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        if let Some(&held_until) = state.locks.get(lock_key) {
            if held_until > now {
                return Ok(false);
            }
        }
        state.locks.insert(lock_key.to_string(), now + ttl);
        Ok(true)
    }

    async fn release_lock(&self, lock_key: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.locks.remove(lock_key);
        Ok(())
    }
}
