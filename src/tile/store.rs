//! Tile store client.
//!
//! Combines a [`BucketStore`] holding the tiles with an [`AdvisoryLock`]
//! used to keep concurrent workers from rendering the same tile twice.
//! Store failures are returned to the caller. Lock failures are not: the
//! lock backends already turn them into
//! [`LockAttempt::Unavailable`](crate::lock::LockAttempt::Unavailable).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::config::{CacheConfig, DEFAULT_LOCK_TIMEOUT_SECS};
use crate::error::{CacheError, StoreError};
use crate::key::{ColumnKey, TileCoord};
use crate::lock::{AdvisoryLock, MemcacheLock};
use crate::store::{BucketStore, CassandraStore, StoreOptions};

/// Number of cached tiles in one layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerCount {
    pub layer: String,
    pub tiles: u64,
}

/// Tile cache over a bucket store and an advisory lock.
///
/// Cloning is cheap; clones share the same store and lock.
///
/// # Example
///
/// ```ignore
/// use bytes::Bytes;
/// use tilecache_cassandra::config::CacheConfig;
/// use tilecache_cassandra::key::TileCoord;
/// use tilecache_cassandra::tile::TileStore;
///
/// let tiles = TileStore::connect(&CacheConfig::default()).await?;
/// let coord = TileCoord::new("basic", 5, 2, 3);
///
/// if tiles.get(&coord).await?.is_none() && tiles.attempt_lock(&coord).await {
///     tiles.set(&coord, Bytes::from_static(b"PNG...")).await?;
///     tiles.unlock(&coord).await;
/// }
/// ```
pub struct TileStore<S = CassandraStore, L = MemcacheLock> {
    store: Arc<S>,
    lock: Arc<L>,
    readonly: bool,
    timeout: Duration,
    poll_interval: Duration,
}

/// How often a caller waiting on another worker's render checks back.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(250);

impl<S, L> Clone for TileStore<S, L> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            lock: Arc::clone(&self.lock),
            readonly: self.readonly,
            timeout: self.timeout,
            poll_interval: self.poll_interval,
        }
    }
}

impl TileStore<CassandraStore, MemcacheLock> {
    /// Connect to the configured Cassandra nodes and memcached servers.
    ///
    /// Fails if the configuration is invalid or no Cassandra node can be
    /// reached. memcached is not contacted until the first lock attempt.
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        config.validate().map_err(CacheError::Config)?;

        let options = StoreOptions {
            credentials: config.cassandra_credentials(),
            ..StoreOptions::default()
        };
        let store = CassandraStore::connect_with_options(
            config.cassandra_nodes.clone(),
            &config.keyspace,
            options,
        )
        .await?;
        let lock = MemcacheLock::new(config.memcache_servers.clone());

        Ok(TileStore::new(store, lock)
            .with_readonly(config.readonly)
            .with_timeout(config.lock_ttl()))
    }
}

impl<S: BucketStore, L: AdvisoryLock> TileStore<S, L> {
    /// Create a writable store with the default lock timeout.
    pub fn new(store: S, lock: L) -> Self {
        Self::from_shared(Arc::new(store), Arc::new(lock))
    }

    /// Create a store over backends that are shared elsewhere.
    pub fn from_shared(store: Arc<S>, lock: Arc<L>) -> Self {
        Self {
            store,
            lock,
            readonly: false,
            timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
            poll_interval: LOCK_POLL_INTERVAL,
        }
    }

    /// Skip all writes.
    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    /// Lifetime of render locks, and the longest a caller waits on
    /// another worker's render.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Interval between checks while another worker holds the render lock.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Underlying bucket store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Underlying lock.
    pub fn lock(&self) -> &L {
        &self.lock
    }

    /// Row holding `coord`'s layer.
    pub fn row_key<'a>(&self, coord: &'a TileCoord) -> &'a str {
        coord.row_key()
    }

    /// Column holding `coord` within its row.
    pub fn column_key(&self, coord: &TileCoord) -> ColumnKey {
        coord.column_key()
    }

    // =========================================================================
    // Tile Operations
    // =========================================================================

    /// Fetch a tile. A missing row or column is `Ok(None)`.
    pub async fn get(&self, coord: &TileCoord) -> Result<Option<Bytes>, StoreError> {
        let column = coord.column_key();
        let data = self.store.get(coord.row_key(), column.as_ref()).await?;

        match &data {
            Some(bytes) => debug!(tile = %coord, size = bytes.len(), "Cache hit"),
            None => debug!(tile = %coord, "Cache miss"),
        }
        Ok(data)
    }

    /// Store a tile and hand the payload back.
    ///
    /// In read-only mode nothing is written and `data` is returned as is.
    pub async fn set(&self, coord: &TileCoord, data: Bytes) -> Result<Bytes, StoreError> {
        if self.readonly {
            debug!(tile = %coord, "Read-only, skipping write");
            return Ok(data);
        }

        let column = coord.column_key();
        self.store
            .put(coord.row_key(), column.as_ref(), data.clone())
            .await?;
        debug!(tile = %coord, size = data.len(), "Stored tile");
        Ok(data)
    }

    /// Delete every tile in `coord`'s layer.
    ///
    /// There is no single-tile delete; the whole row goes.
    pub async fn delete(&self, coord: &TileCoord) -> Result<(), StoreError> {
        self.invalidate_layer(coord.row_key()).await
    }

    /// Try once to take the render lock for `coord`.
    pub async fn attempt_lock(&self, coord: &TileCoord) -> bool {
        self.lock.try_acquire(&coord.lock_key(), self.timeout).await
    }

    /// Release the render lock for `coord`. Missing locks are ignored.
    pub async fn unlock(&self, coord: &TileCoord) {
        self.lock.release(&coord.lock_key()).await
    }

    // =========================================================================
    // Layer Administration
    // =========================================================================

    /// Tile counts for one layer, or for every layer present.
    pub async fn layer_counts(&self, layer: Option<&str>) -> Result<Vec<LayerCount>, StoreError> {
        let layers = match layer {
            Some(layer) => vec![layer.to_string()],
            None => self.store.buckets().await?,
        };

        let mut counts = Vec::with_capacity(layers.len());
        for layer in layers {
            let tiles = self.store.count(&layer).await?;
            counts.push(LayerCount { layer, tiles });
        }
        Ok(counts)
    }

    /// Drop every tile of `layer`.
    pub async fn invalidate_layer(&self, layer: &str) -> Result<(), StoreError> {
        self.store.delete_bucket(layer).await?;
        debug!(layer, "Invalidated layer");
        Ok(())
    }
}
