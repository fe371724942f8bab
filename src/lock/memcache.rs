//! memcached-backed advisory lock.
//!
//! Uses the text protocol's `add` (store only if absent) as the acquire and
//! `delete` as the release:
//!
//! ```text
//! add <key> 0 <exptime> 1\r\n0\r\n   ->  STORED | NOT_STORED
//! delete <key>\r\n                   ->  DELETED | NOT_FOUND
//! ```
//!
//! `exptime` is sent as an absolute unix timestamp (now + ttl), so expiry
//! is governed by the server's clock. Keys are spread over the configured
//! servers by hash. A server that refuses a connection or lets a request
//! time out is skipped for [`DEAD_RETRY`] before being tried again.

use std::borrow::Cow;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_memcached::{AsciiProtocol, Client, Error as MemcacheError, Status};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::time::{error::Elapsed, Instant};
use tracing::{debug, warn};

use super::{AdvisoryLock, LockAttempt};
use crate::error::LockError;

/// Bound on connecting to and exchanging one command with a server.
pub const SOCKET_TIMEOUT: Duration = Duration::from_secs(3);

/// How long a failing server is skipped.
pub const DEAD_RETRY: Duration = Duration::from_secs(30);

/// Longest key memcached accepts.
pub const MAX_KEY_LEN: usize = 250;

/// Idle connections kept per server.
pub const MAX_IDLE_CONNECTIONS: usize = 8;

/// Payload stored under a lock key.
const LOCK_VALUE: &str = "0";

/// One memcached server and its idle connections.
///
/// Connections are checked out for the duration of one command, so
/// concurrent callers never wait on each other's I/O.
struct Server {
    addr: String,
    idle: Mutex<Vec<Client>>,
    dead_until: Mutex<Option<Instant>>,
}

impl Server {
    fn new(addr: String) -> Self {
        Self {
            addr,
            idle: Mutex::new(Vec::new()),
            dead_until: Mutex::new(None),
        }
    }

    async fn checkout(&self) -> Result<Client, LockError> {
        {
            let mut dead_until = self.dead_until.lock().await;
            if let Some(until) = *dead_until {
                if Instant::now() < until {
                    return Err(LockError::Dead(self.addr.clone()));
                }
                *dead_until = None;
            }
        }

        if let Some(client) = self.idle.lock().await.pop() {
            return Ok(client);
        }

        let dsn = format!("tcp://{}", self.addr);
        match tokio::time::timeout(SOCKET_TIMEOUT, Client::new(dsn)).await {
            Ok(Ok(client)) => Ok(client),
            Ok(Err(e)) => {
                self.mark_dead().await;
                Err(LockError::Connection(format!("{}: {:?}", self.addr, e)))
            }
            Err(_) => {
                self.mark_dead().await;
                Err(LockError::Timeout)
            }
        }
    }

    /// Settle a finished command. The connection goes back to the idle
    /// list unless the exchange broke it.
    async fn finish<T>(
        &self,
        client: Client,
        reply: Result<Result<T, MemcacheError>, Elapsed>,
    ) -> Result<Result<T, Status>, LockError> {
        let settled = match reply {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(MemcacheError::Protocol(status))) => Err(status),
            Ok(Err(e)) => return Err(LockError::Connection(format!("{}: {:?}", self.addr, e))),
            Err(_) => {
                self.mark_dead().await;
                return Err(LockError::Timeout);
            }
        };

        let mut idle = self.idle.lock().await;
        if idle.len() < MAX_IDLE_CONNECTIONS {
            idle.push(client);
        }
        Ok(settled)
    }

    async fn mark_dead(&self) {
        *self.dead_until.lock().await = Some(Instant::now() + DEAD_RETRY);
        self.idle.lock().await.clear();
    }
}

/// Advisory lock over a memcached cluster.
///
/// Connections are opened lazily and reused.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use tilecache_cassandra::lock::{AdvisoryLock, MemcacheLock};
///
/// let lock = MemcacheLock::new(vec!["192.168.1.1:11211".into(), "192.168.1.2:11211".into()]);
///
/// if lock.try_acquire("basic/10/20/5", Duration::from_secs(30)).await {
///     // render, store, then
///     lock.release("basic/10/20/5").await;
/// }
/// ```
pub struct MemcacheLock {
    servers: Vec<Server>,
}

impl MemcacheLock {
    /// Create a client for `servers` (`host:port` each).
    pub fn new(servers: Vec<String>) -> Self {
        Self {
            servers: servers.into_iter().map(Server::new).collect(),
        }
    }

    /// Configured server addresses.
    pub fn servers(&self) -> impl Iterator<Item = &str> {
        self.servers.iter().map(|s| s.addr.as_str())
    }

    /// `add` the key with a one-byte value. `Ok(true)` if stored.
    pub async fn add(&self, key: &str, exptime: u64) -> Result<bool, LockError> {
        let name = lock_name(key);
        let server = self.server_for(&name)?;
        let mut client = server.checkout().await?;

        let ttl = i64::try_from(exptime).unwrap_or(i64::MAX);
        let reply = tokio::time::timeout(
            SOCKET_TIMEOUT,
            client.add(&*name, LOCK_VALUE, Some(ttl), None),
        )
        .await;

        match server.finish(client, reply).await? {
            Ok(()) => Ok(true),
            Err(Status::NotStored) => Ok(false),
            Err(status) => Err(LockError::Reply(format!("{:?}", status))),
        }
    }

    /// `delete` the key. `Ok(true)` if it existed.
    pub async fn delete(&self, key: &str) -> Result<bool, LockError> {
        let name = lock_name(key);
        let server = self.server_for(&name)?;
        let mut client = server.checkout().await?;

        let reply = tokio::time::timeout(SOCKET_TIMEOUT, client.delete(&*name)).await;

        match server.finish(client, reply).await? {
            Ok(()) => Ok(true),
            Err(Status::NotFound) => Ok(false),
            Err(status) => Err(LockError::Reply(format!("{:?}", status))),
        }
    }

    fn server_for(&self, name: &str) -> Result<&Server, LockError> {
        if self.servers.is_empty() {
            return Err(LockError::Connection("no memcache servers configured".into()));
        }
        let idx = server_index(name, self.servers.len());
        Ok(&self.servers[idx])
    }
}

#[async_trait]
impl AdvisoryLock for MemcacheLock {
    async fn attempt(&self, key: &str, ttl: Duration) -> LockAttempt {
        match self.add(key, absolute_exptime(ttl)).await {
            Ok(true) => {
                debug!(key, "Lock acquired");
                LockAttempt::Acquired
            }
            Ok(false) => {
                debug!(key, "Lock held elsewhere");
                LockAttempt::Held
            }
            Err(err) => {
                warn!(key, error = %err, "Lock service unavailable, continuing unlocked");
                LockAttempt::Unavailable
            }
        }
    }

    async fn release(&self, key: &str) {
        if let Err(err) = self.delete(key).await {
            warn!(key, error = %err, "Lock release failed, leaving it to expire");
        }
    }
}

/// Key as sent on the wire.
///
/// Keys that memcached would reject (too long, whitespace or control
/// bytes) are replaced by their hex SHA-256.
pub(crate) fn lock_name(key: &str) -> Cow<'_, str> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key.bytes().all(|b| b > b' ' && b != 0x7F);
    if valid {
        Cow::Borrowed(key)
    } else {
        Cow::Owned(hex::encode(Sha256::digest(key.as_bytes())))
    }
}

fn server_index(name: &str, servers: usize) -> usize {
    let digest = Sha256::digest(name.as_bytes());
    let hash = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    hash as usize % servers
}

/// Unix time `ttl` from now, rounded up to whole seconds.
fn absolute_exptime(ttl: Duration) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let expires = now + ttl;
    expires.as_secs() + u64::from(expires.subsec_nanos() > 0)
}
