//! Cassandra-backed bucket store.
//!
//! Each layer is one partition of the "Tiles" table and each tile one
//! clustering column. Over CQL a column family created with UTF-8 row keys
//! and byte column names is seen as:
//!
//! ```text
//! CREATE TABLE "TileCache"."Tiles" (
//!     key     text,    -- layer name
//!     column1 blob,    -- 8-byte column key
//!     value   blob,    -- tile payload
//!     PRIMARY KEY (key, column1)
//! )
//! ```
//!
//! Dropping a partition is a single tombstone, so invalidating a layer costs
//! the same regardless of how many tiles it holds.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use scylla::client::execution_profile::ExecutionProfile;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::errors::{DbError, ExecutionError, RequestAttemptError};
use scylla::statement::prepared::PreparedStatement;
use scylla::statement::Consistency;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::BucketStore;
use crate::error::StoreError;

/// Name of the table holding tiles.
pub const TILES_TABLE: &str = "Tiles";

/// Bound on opening the first connection to a node.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on one request, retries by the driver included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Rows requested per page when listing layers.
const LIST_PAGE_SIZE: i32 = 1000;

/// Connection settings beyond the node list.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Username and password for `PasswordAuthenticator` clusters
    pub credentials: Option<(String, String)>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
            credentials: None,
        }
    }
}

/// CQL text of every statement against one keyspace.
struct Statements {
    select: String,
    insert: String,
    delete: String,
    count: String,
    list: String,
}

impl Statements {
    fn new(keyspace: &str) -> Self {
        let table = format!(
            "{}.{}",
            quote_identifier(keyspace),
            quote_identifier(TILES_TABLE)
        );
        Self {
            select: format!("SELECT value FROM {} WHERE key = ? AND column1 = ?", table),
            insert: format!(
                "INSERT INTO {} (key, column1, value) VALUES (?, ?, ?)",
                table
            ),
            delete: format!("DELETE FROM {} WHERE key = ?", table),
            count: format!("SELECT COUNT(*) FROM {} WHERE key = ?", table),
            list: format!("SELECT DISTINCT key FROM {}", table),
        }
    }
}

/// Server-side handles for [`Statements`].
struct Prepared {
    select: PreparedStatement,
    insert: PreparedStatement,
    delete: PreparedStatement,
    count: PreparedStatement,
    list: PreparedStatement,
}

/// `BucketStore` over a Cassandra cluster.
///
/// Requests run at consistency ONE. Statements are prepared on first use,
/// so a store can be opened before [`ensure_schema`](Self::ensure_schema)
/// has created the table.
///
/// # Example
///
/// ```ignore
/// use tilecache_cassandra::store::{BucketStore, CassandraStore};
///
/// let nodes = vec!["10.1.1.1:9042".to_string(), "10.1.1.2:9042".to_string()];
/// let store = CassandraStore::connect(nodes, "TileCache").await?;
///
/// println!("{} tiles in basic", store.count("basic").await?);
/// store.delete_bucket("basic").await?;
/// ```
pub struct CassandraStore {
    session: Session,
    keyspace: String,
    statements: Statements,
    prepared: OnceCell<Prepared>,
}

impl CassandraStore {
    /// Connect with default options.
    pub async fn connect(nodes: Vec<String>, keyspace: &str) -> Result<Self, StoreError> {
        Self::connect_with_options(nodes, keyspace, StoreOptions::default()).await
    }

    /// Connect to the cluster. Fails if no node can be reached.
    pub async fn connect_with_options(
        nodes: Vec<String>,
        keyspace: &str,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        if nodes.is_empty() {
            return Err(StoreError::Connection("no Cassandra nodes configured".into()));
        }

        let profile = ExecutionProfile::builder()
            .consistency(Consistency::One)
            .request_timeout(Some(options.request_timeout))
            .build();

        let mut builder = SessionBuilder::new()
            .known_nodes(&nodes)
            .connection_timeout(options.connect_timeout)
            .default_execution_profile_handle(profile.into_handle());
        if let Some((username, password)) = options.credentials {
            builder = builder.user(username, password);
        }

        let session = builder
            .build()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!(keyspace, nodes = nodes.len(), "Connected to Cassandra");

        Ok(Self {
            session,
            keyspace: keyspace.to_string(),
            statements: Statements::new(keyspace),
            prepared: OnceCell::new(),
        })
    }

    /// Keyspace holding the tiles table.
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    /// Create the keyspace and tiles table if they do not exist.
    pub async fn ensure_schema(&self, replication_factor: u32) -> Result<(), StoreError> {
        let create_keyspace = format!(
            "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = \
             {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
            quote_identifier(&self.keyspace),
            replication_factor
        );
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {}.{} \
             (key text, column1 blob, value blob, PRIMARY KEY (key, column1)) \
             WITH CLUSTERING ORDER BY (column1 ASC)",
            quote_identifier(&self.keyspace),
            quote_identifier(TILES_TABLE)
        );

        for statement in [create_keyspace, create_table] {
            self.session
                .query_unpaged(statement, ())
                .await
                .map_err(execution_error)?;
        }
        info!(keyspace = %self.keyspace, "Tile schema in place");
        Ok(())
    }

    async fn prepared(&self) -> Result<&Prepared, StoreError> {
        self.prepared
            .get_or_try_init(|| async {
                let mut list = self.prepare(&self.statements.list).await?;
                list.set_page_size(LIST_PAGE_SIZE);

                Ok::<_, StoreError>(Prepared {
                    select: self.prepare(&self.statements.select).await?,
                    insert: self.prepare(&self.statements.insert).await?,
                    delete: self.prepare(&self.statements.delete).await?,
                    count: self.prepare(&self.statements.count).await?,
                    list,
                })
            })
            .await
    }

    async fn prepare(&self, statement: &str) -> Result<PreparedStatement, StoreError> {
        self.session
            .prepare(statement)
            .await
            .map_err(|e| StoreError::Connection(format!("preparing '{}': {}", statement, e)))
    }
}

#[async_trait]
impl BucketStore for CassandraStore {
    async fn get(&self, bucket: &str, column: &[u8]) -> Result<Option<Bytes>, StoreError> {
        let prepared = self.prepared().await?;
        let result = self
            .session
            .execute_unpaged(&prepared.select, (bucket, column))
            .await
            .map_err(execution_error)?;

        let row = result
            .into_rows_result()
            .map_err(protocol_error)?
            .maybe_first_row::<(Vec<u8>,)>()
            .map_err(protocol_error)?;
        Ok(row.map(|(value,)| Bytes::from(value)))
    }

    async fn put(&self, bucket: &str, column: &[u8], value: Bytes) -> Result<(), StoreError> {
        let prepared = self.prepared().await?;
        self.session
            .execute_unpaged(&prepared.insert, (bucket, column, value.as_ref()))
            .await
            .map_err(execution_error)?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        let prepared = self.prepared().await?;
        self.session
            .execute_unpaged(&prepared.delete, (bucket,))
            .await
            .map_err(execution_error)?;
        debug!(bucket, "Deleted row");
        Ok(())
    }

    async fn count(&self, bucket: &str) -> Result<u64, StoreError> {
        let prepared = self.prepared().await?;
        let result = self
            .session
            .execute_unpaged(&prepared.count, (bucket,))
            .await
            .map_err(execution_error)?;

        let (count,) = result
            .into_rows_result()
            .map_err(protocol_error)?
            .first_row::<(i64,)>()
            .map_err(protocol_error)?;
        Ok(count.max(0) as u64)
    }

    async fn buckets(&self) -> Result<Vec<String>, StoreError> {
        let prepared = self.prepared().await?;
        let pager = self
            .session
            .execute_iter(prepared.list.clone(), ())
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let mut rows = pager.rows_stream::<(String,)>().map_err(protocol_error)?;
        let mut names = Vec::new();
        while let Some((name,)) = rows
            .try_next()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?
        {
            names.push(name);
        }
        Ok(names)
    }
}

/// Quote a CQL identifier, preserving case.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn execution_error(err: ExecutionError) -> StoreError {
    match err {
        ExecutionError::LastAttemptError(RequestAttemptError::DbError(db, message)) => {
            StoreError::Server {
                transient: is_transient(&db),
                message: format!("{}: {}", db, message),
            }
        }
        ExecutionError::RequestTimeout(after) => StoreError::Timeout(after),
        ExecutionError::BadQuery(e) => StoreError::Protocol(e.to_string()),
        other => StoreError::Connection(other.to_string()),
    }
}

/// Unavailable, overloaded, bootstrapping and replica timeouts.
fn is_transient(err: &DbError) -> bool {
    matches!(
        err,
        DbError::Unavailable { .. }
            | DbError::Overloaded
            | DbError::IsBootstrapping
            | DbError::ReadTimeout { .. }
            | DbError::WriteTimeout { .. }
    )
}

fn protocol_error(err: impl std::fmt::Display) -> StoreError {
    StoreError::Protocol(err.to_string())
}
