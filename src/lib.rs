//! # tilecache-cassandra
//!
//! A map tile cache backend that stores rendered tiles in Cassandra and
//! uses memcached as an advisory render lock.
//!
//! ## Layout
//!
//! - One row per layer. Invalidating a layer is a single row delete, no
//!   matter how many tiles it holds.
//! - One column per tile, named by zoom and the Morton (Z-order) code of
//!   the tile's grid position, so nearby tiles are stored together.
//! - A short-lived memcached key per tile being rendered, so concurrent
//!   workers can skip duplicate renders. Correctness never depends on it.
//!
//! ## Modules
//!
//! - [`key`] - Morton interleave and row/column/lock key derivation
//! - [`store`] - `BucketStore` trait, Cassandra backend, in-memory backend
//! - [`lock`] - `AdvisoryLock` trait, memcached backend, in-memory backend
//! - [`tile`] - `TileStore` client and render coordination
//! - [`config`] - Cache options and the admin command line
//! - [`error`] - Error types
//!
//! ## Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use tilecache_cassandra::{CacheConfig, CacheError, TileCoord, TileStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), CacheError> {
//!     let config = CacheConfig::from_options([
//!         ("cassandra_nodes", "10.1.1.1:9042,10.1.1.2:9042"),
//!         ("memcache_servers", "10.1.1.5:11211"),
//!     ])
//!     .map_err(CacheError::Config)?;
//!
//!     let tiles = TileStore::connect(&config).await?;
//!     let coord = TileCoord::new("basic", 5, 2, 3);
//!
//!     let tile = tiles
//!         .get_or_render(&coord, || async { Ok::<_, CacheError>(Bytes::from_static(b"PNG...")) })
//!         .await?;
//!     println!("{} bytes, cache hit: {}", tile.data.len(), tile.cache_hit);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod key;
pub mod lock;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use config::{AdminCli, AdminCommand, CacheConfig};
pub use error::{AdminError, CacheError, LockError, StoreError};
pub use key::{interleave2, part1by1, ColumnKey, TileCoord};
pub use lock::{AdvisoryLock, LockAttempt, MemcacheLock, MemoryLock, NoopLock};
pub use store::{BucketStore, CassandraStore, MemoryStore, StoreOptions};
pub use tile::{LayerCount, RenderedTile, TileStore};
