//! Column store layer.
//!
//! The tile cache only needs a keyed bucket store: named buckets (rows)
//! holding sorted binary sub-keys (columns). Whole buckets can be dropped
//! in one operation; single columns cannot.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               TileStore                 │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           BucketStore Trait             │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │ CassandraStore  │    │    MemoryStore      │
//! │ (scylla driver) │    │  (in-process)       │
//! └─────────────────┘    └─────────────────────┘
//! ```

mod cassandra;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StoreError;

pub use cassandra::{CassandraStore, StoreOptions, CONNECT_TIMEOUT, REQUEST_TIMEOUT, TILES_TABLE};
pub use memory::MemoryStore;

/// Trait for a row/column store addressed by bucket and sub-key.
///
/// Implementations must be thread-safe; one instance is shared by every
/// caller.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Read one column.
    ///
    /// Returns `Ok(None)` when either the bucket or the column is absent.
    async fn get(&self, bucket: &str, column: &[u8]) -> Result<Option<Bytes>, StoreError>;

    /// Write one column, replacing any previous value.
    async fn put(&self, bucket: &str, column: &[u8], value: Bytes) -> Result<(), StoreError>;

    /// Drop a bucket and every column in it.
    ///
    /// Deleting an absent bucket succeeds.
    async fn delete_bucket(&self, bucket: &str) -> Result<(), StoreError>;

    /// Number of columns in a bucket (0 when absent).
    async fn count(&self, bucket: &str) -> Result<u64, StoreError>;

    /// Every bucket currently holding at least one column.
    async fn buckets(&self) -> Result<Vec<String>, StoreError>;
}
