use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{AdvisoryLock, LockAttempt};

/// In-process advisory lock with TTL expiry.
///
/// Only coordinates callers sharing this instance. Expired entries are
/// swept whenever a new lock is taken.
#[derive(Default)]
pub struct MemoryLock {
    held: Mutex<HashMap<String, Instant>>,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is currently held and unexpired.
    pub async fn is_held(&self, key: &str) -> bool {
        let held = self.held.lock().await;
        held.get(key).is_some_and(|expires| *expires > Instant::now())
    }
}

#[async_trait]
impl AdvisoryLock for MemoryLock {
    async fn attempt(&self, key: &str, ttl: Duration) -> LockAttempt {
        let now = Instant::now();
        let mut held = self.held.lock().await;
        held.retain(|_, expires| *expires > now);

        if held.contains_key(key) {
            return LockAttempt::Held;
        }
        held.insert(key.to_string(), now + ttl);
        LockAttempt::Acquired
    }

    async fn release(&self, key: &str) {
        self.held.lock().await.remove(key);
    }
}
