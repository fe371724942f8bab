//! Test utilities for integration tests.
//!
//! - [`cassandra_store`]: a store on the node named by
//!   `TILECACHE_TEST_CASSANDRA` (default 127.0.0.1:9042), in an emptied
//!   keyspace of the caller's choosing. Tests using it are `#[ignore]`d and
//!   run with `cargo test -- --ignored` against a live cluster.
//! - [`FakeMemcached`]: speaks the `add`/`delete` subset of the memcached
//!   text protocol over a real TCP socket
//! - [`FailingStore`]: a `BucketStore` that fails on demand

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use tilecache_cassandra::error::StoreError;
use tilecache_cassandra::store::{BucketStore, CassandraStore};

/// Relative exptimes above this are absolute unix timestamps.
const MEMCACHE_RELATIVE_LIMIT: u64 = 60 * 60 * 24 * 30;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Address of a port nothing is listening on.
pub async fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}

// =============================================================================
// Cassandra
// =============================================================================

/// Node used by the live-cluster tests.
pub fn cassandra_node() -> String {
    std::env::var("TILECACHE_TEST_CASSANDRA").unwrap_or_else(|_| "127.0.0.1:9042".to_string())
}

/// Connect to `keyspace`, creating its schema and dropping every layer.
pub async fn cassandra_store(keyspace: &str) -> CassandraStore {
    let store = CassandraStore::connect(vec![cassandra_node()], keyspace)
        .await
        .unwrap();
    store.ensure_schema(1).await.unwrap();
    for layer in store.buckets().await.unwrap() {
        store.delete_bucket(&layer).await.unwrap();
    }
    store
}

// =============================================================================
// Fake memcached
// =============================================================================

#[derive(Default)]
struct MemcacheState {
    keys: Mutex<HashMap<String, u64>>,
    commands: Mutex<Vec<String>>,
    connections: AtomicUsize,
}

impl MemcacheState {
    fn add(&self, key: &str, exptime: u64) -> &'static str {
        let now = unix_now();
        let expires = match exptime {
            0 => 0,
            t if t > MEMCACHE_RELATIVE_LIMIT => t,
            t => now + t,
        };

        let mut keys = self.keys.lock().unwrap();
        let live = keys
            .get(key)
            .is_some_and(|&until| until == 0 || until > now);
        if live {
            return "NOT_STORED";
        }
        keys.insert(key.to_string(), expires);
        "STORED"
    }

    fn delete(&self, key: &str) -> &'static str {
        match self.keys.lock().unwrap().remove(key) {
            Some(_) => "DELETED",
            None => "NOT_FOUND",
        }
    }
}

/// memcached server supporting `add` and `delete`.
pub struct FakeMemcached {
    addr: String,
    state: Arc<MemcacheState>,
    handle: JoinHandle<()>,
}

impl FakeMemcached {
    pub async fn start() -> Self {
        Self::spawn(None).await
    }

    /// Server that answers every command with `reply`.
    pub async fn start_with_reply(reply: &'static str) -> Self {
        Self::spawn(Some(reply)).await
    }

    async fn spawn(fixed_reply: Option<&'static str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(MemcacheState::default());

        let server_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                server_state.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_memcache(
                    socket,
                    Arc::clone(&server_state),
                    fixed_reply,
                ));
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn addr(&self) -> String {
        self.addr.clone()
    }

    /// Whether `key` is stored and unexpired.
    pub fn holds(&self, key: &str) -> bool {
        let now = unix_now();
        self.state
            .keys
            .lock()
            .unwrap()
            .get(key)
            .is_some_and(|&until| until == 0 || until > now)
    }

    /// Absolute expiry stored for `key` (0 for never).
    pub fn expiry(&self, key: &str) -> Option<u64> {
        self.state.keys.lock().unwrap().get(key).copied()
    }

    /// Forget every key, as a restarted server would.
    pub fn flush_all(&self) {
        self.state.keys.lock().unwrap().clear();
    }

    /// Command lines received, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state.commands.lock().unwrap().clone()
    }

    /// Connections accepted so far.
    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }
}

impl Drop for FakeMemcached {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_memcache(
    socket: TcpStream,
    state: Arc<MemcacheState>,
    fixed_reply: Option<&'static str>,
) {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let command = line.trim_end().to_string();
        state.commands.lock().unwrap().push(command.clone());

        let parts: Vec<&str> = command.split_whitespace().collect();
        let reply = match parts.as_slice() {
            ["add", key, _flags, exptime, len] => {
                let len: usize = len.parse().unwrap_or(0);
                let mut data = vec![0u8; len + 2];
                if reader.read_exact(&mut data).await.is_err() {
                    return;
                }
                match fixed_reply {
                    Some(reply) => reply,
                    None => state.add(key, exptime.parse().unwrap_or(0)),
                }
            }
            ["delete", key] => match fixed_reply {
                Some(reply) => reply,
                None => state.delete(key),
            },
            _ => "ERROR",
        };

        if writer
            .write_all(format!("{}\r\n", reply).as_bytes())
            .await
            .is_err()
        {
            return;
        }
    }
}

// =============================================================================
// Failing Store
// =============================================================================

/// A `BucketStore` whose operations fail with a connection error.
#[derive(Default)]
pub struct FailingStore {
    calls: AtomicUsize,
    reads_succeed: bool,
}

impl FailingStore {
    /// Every operation fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads find nothing; writes, deletes and listings fail.
    pub fn failing_writes() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reads_succeed: true,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Connection("store unreachable".into()))
    }
}

#[async_trait]
impl BucketStore for FailingStore {
    async fn get(&self, _bucket: &str, _column: &[u8]) -> Result<Option<Bytes>, StoreError> {
        if self.reads_succeed {
            self.calls.fetch_add(1, Ordering::SeqCst);
            return Ok(None);
        }
        self.fail()
    }

    async fn put(&self, _bucket: &str, _column: &[u8], _value: Bytes) -> Result<(), StoreError> {
        self.fail()
    }

    async fn delete_bucket(&self, _bucket: &str) -> Result<(), StoreError> {
        self.fail()
    }

    async fn count(&self, _bucket: &str) -> Result<u64, StoreError> {
        self.fail()
    }

    async fn buckets(&self) -> Result<Vec<String>, StoreError> {
        self.fail()
    }
}
