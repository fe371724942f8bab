//! In-process bucket store.
//!
//! Keeps columns in a `BTreeMap` so iteration order matches the byte order
//! a real column store uses. Handy for tests and for running a renderer
//! without a cluster.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::BucketStore;
use crate::error::StoreError;

type Row = BTreeMap<Vec<u8>, Bytes>;

/// `BucketStore` backed by a map in memory.
#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<HashMap<String, Row>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Column names of a bucket in stored (byte) order.
    pub async fn columns(&self, bucket: &str) -> Vec<Vec<u8>> {
        let rows = self.rows.read().await;
        rows.get(bucket)
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BucketStore for MemoryStore {
    async fn get(&self, bucket: &str, column: &[u8]) -> Result<Option<Bytes>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.get(bucket).and_then(|row| row.get(column)).cloned())
    }

    async fn put(&self, bucket: &str, column: &[u8], value: Bytes) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        rows.entry(bucket.to_string())
            .or_default()
            .insert(column.to_vec(), value);
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        self.rows.write().await.remove(bucket);
        Ok(())
    }

    async fn count(&self, bucket: &str) -> Result<u64, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.get(bucket).map_or(0, |row| row.len() as u64))
    }

    async fn buckets(&self) -> Result<Vec<String>, StoreError> {
        let rows = self.rows.read().await;
        let mut names: Vec<String> = rows
            .iter()
            .filter(|(_, row)| !row.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}
