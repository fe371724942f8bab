//! Advisory render locks.
//!
//! A lock here is a hint, not a guarantee. It exists so that two workers
//! rendering the same metatile at the same moment can notice each other
//! and skip the duplicate work. Nothing depends on it being honoured: if
//! the lock service is down, forgets a key, or lets a key expire early, the
//! worst case is that a tile is rendered twice and the second write
//! replaces the first with an equivalent payload.
//!
//! Implementations therefore never return errors. A failed acquisition is
//! reported as [`LockAttempt::Unavailable`] and a failed release is dropped.
//!
//! - [`MemcacheLock`]: `add`/`delete` against a memcached cluster
//! - [`MemoryLock`]: in-process map with TTL expiry
//! - [`NoopLock`]: always grants, records nothing

mod memcache;
mod memory;

use std::time::Duration;

use async_trait::async_trait;

pub use memcache::{MemcacheLock, DEAD_RETRY, MAX_IDLE_CONNECTIONS, MAX_KEY_LEN, SOCKET_TIMEOUT};
pub use memory::MemoryLock;

/// Result of a single lock attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAttempt {
    /// This call created the lock
    Acquired,
    /// Someone else holds it
    Held,
    /// The lock service could not be asked
    Unavailable,
}

impl LockAttempt {
    pub fn is_acquired(self) -> bool {
        self == LockAttempt::Acquired
    }
}

/// Best-effort, TTL-bounded mutual exclusion keyed by string.
#[async_trait]
pub trait AdvisoryLock: Send + Sync {
    /// Try once to take `key` for `ttl`, reporting why it was not taken.
    ///
    /// Never waits for a holder to release.
    async fn attempt(&self, key: &str, ttl: Duration) -> LockAttempt;

    /// Try once to take `key` for `ttl`.
    ///
    /// Returns `true` only if this call created the lock. Returns `false`
    /// when someone else holds it or when the lock service could not be
    /// asked.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> bool {
        self.attempt(key, ttl).await.is_acquired()
    }

    /// Drop `key` whoever holds it. Releasing an absent key is a no-op.
    async fn release(&self, key: &str);
}

/// Lock that always grants and never records anything.
///
/// For deployments without a lock service.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLock;

#[async_trait]
impl AdvisoryLock for NoopLock {
    async fn attempt(&self, _key: &str, _ttl: Duration) -> LockAttempt {
        LockAttempt::Acquired
    }

    async fn release(&self, _key: &str) {}
}
