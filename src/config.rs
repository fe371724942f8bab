//! Configuration for the tile cache and the admin tool.
//!
//! The cache recognizes the same options as a `[cache]` section of a tile
//! server config file:
//!
//! ```text
//! [cache]
//! type=Cassandra
//! memcache_servers=192.168.1.1:11211,192.168.1.2:11211,192.168.1.3:11211
//! cassandra_nodes=10.1.1.1:9042,10.1.1.2:9042,10.1.1.3:9042,10.1.1.4:9042
//! keyspace=TileCache
//! readonly=no
//! timeout=30
//! ```
//!
//! [`CacheConfig`] can be filled from such key/value pairs
//! ([`CacheConfig::from_options`]), deserialized with serde (address lists
//! may be arrays or comma-separated strings), or flattened into a clap
//! command line, where every option also reads a `TILECACHE_` environment
//! variable:
//!
//! - `TILECACHE_MEMCACHE_SERVERS` - Lock servers (default: 127.0.0.1:11211)
//! - `TILECACHE_CASSANDRA_NODES` - Store nodes (default: 127.0.0.1:9042)
//! - `TILECACHE_KEYSPACE` - Keyspace holding the Tiles table (default: TileCache)
//! - `TILECACHE_READONLY` - Skip all writes (default: false)
//! - `TILECACHE_TIMEOUT` - Render lock TTL in seconds (default: 30)
//! - `TILECACHE_CASSANDRA_USERNAME` / `TILECACHE_CASSANDRA_PASSWORD` -
//!   Credentials for clusters with password authentication (default: none)

use std::time::Duration;

use clap::{Args, Parser};
use serde::{Deserialize, Deserializer};

use crate::error::AdminError;

// =============================================================================
// Default Values
// =============================================================================

/// Default memcached server.
pub const DEFAULT_MEMCACHE_SERVER: &str = "127.0.0.1:11211";

/// Default Cassandra node.
pub const DEFAULT_CASSANDRA_NODE: &str = "127.0.0.1:9042";

/// Default CQL native protocol port.
pub const DEFAULT_CQL_PORT: u16 = 9042;

/// Default keyspace.
pub const DEFAULT_KEYSPACE: &str = "TileCache";

/// Default render lock TTL in seconds.
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Cache Configuration
// =============================================================================

/// Settings for a Cassandra tile cache with memcached locking.
#[derive(Args, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// memcached servers for render locks (comma-separated host:port).
    #[arg(
        long,
        env = "TILECACHE_MEMCACHE_SERVERS",
        value_delimiter = ',',
        value_parser = parse_address,
        default_value = DEFAULT_MEMCACHE_SERVER
    )]
    #[serde(deserialize_with = "address_list")]
    pub memcache_servers: Vec<String>,

    /// Cassandra nodes holding the tiles (comma-separated host:port).
    #[arg(
        long,
        env = "TILECACHE_CASSANDRA_NODES",
        value_delimiter = ',',
        value_parser = parse_address,
        default_value = DEFAULT_CASSANDRA_NODE
    )]
    #[serde(deserialize_with = "address_list")]
    pub cassandra_nodes: Vec<String>,

    /// Keyspace containing the Tiles table.
    #[arg(long, default_value = DEFAULT_KEYSPACE, env = "TILECACHE_KEYSPACE")]
    pub keyspace: String,

    /// Never write tiles; `set` returns its input untouched.
    #[arg(long, default_value_t = false, env = "TILECACHE_READONLY")]
    pub readonly: bool,

    /// Render lock TTL in seconds.
    #[arg(long, default_value_t = DEFAULT_LOCK_TIMEOUT_SECS, env = "TILECACHE_TIMEOUT")]
    pub timeout: u64,

    /// Cassandra username.
    #[arg(long, env = "TILECACHE_CASSANDRA_USERNAME")]
    pub cassandra_username: Option<String>,

    /// Cassandra password.
    #[arg(long, env = "TILECACHE_CASSANDRA_PASSWORD", hide_env_values = true)]
    pub cassandra_password: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memcache_servers: vec![DEFAULT_MEMCACHE_SERVER.to_string()],
            cassandra_nodes: vec![DEFAULT_CASSANDRA_NODE.to_string()],
            keyspace: DEFAULT_KEYSPACE.to_string(),
            readonly: false,
            timeout: DEFAULT_LOCK_TIMEOUT_SECS,
            cassandra_username: None,
            cassandra_password: None,
        }
    }
}

impl CacheConfig {
    /// Build from `key=value` options as found in a config file section.
    ///
    /// Unrecognized keys (such as `type`) are ignored; missing keys keep
    /// their defaults.
    pub fn from_options<'a, I>(options: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();

        for (key, value) in options {
            match key.trim() {
                "memcache_servers" => config.memcache_servers = split_addresses(value),
                "cassandra_nodes" => config.cassandra_nodes = split_addresses(value),
                "keyspace" => config.keyspace = value.trim().to_string(),
                "readonly" => config.readonly = parse_flag(value)?,
                "timeout" => config.timeout = parse_seconds(value)?,
                "cassandra_username" => config.cassandra_username = Some(value.trim().to_string()),
                "cassandra_password" => config.cassandra_password = Some(value.to_string()),
                _ => {}
            }
        }

        Ok(config)
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.memcache_servers.is_empty() {
            return Err("memcache_servers must list at least one server".to_string());
        }
        if self.cassandra_nodes.is_empty() {
            return Err("cassandra_nodes must list at least one node".to_string());
        }
        if self
            .memcache_servers
            .iter()
            .chain(&self.cassandra_nodes)
            .any(|addr| addr.is_empty())
        {
            return Err("server addresses must not be empty".to_string());
        }
        if self.keyspace.is_empty() {
            return Err("keyspace is required".to_string());
        }
        if self.timeout == 0 {
            return Err("timeout must be greater than 0".to_string());
        }
        if self.cassandra_password.is_some() && self.cassandra_username.is_none() {
            return Err("cassandra_password requires cassandra_username".to_string());
        }
        Ok(())
    }

    /// Render lock time-to-live.
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Username and password, when a username is set.
    pub fn cassandra_credentials(&self) -> Option<(String, String)> {
        self.cassandra_username.clone().map(|username| {
            (username, self.cassandra_password.clone().unwrap_or_default())
        })
    }
}

/// Split a comma-separated address list, trimming each entry.
pub fn split_addresses(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_address(value: &str) -> Result<String, String> {
    let addr = value.trim();
    if addr.is_empty() {
        return Err("empty address".to_string());
    }
    Ok(addr.to_string())
}

fn parse_flag(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" | "" => Ok(false),
        other => Err(format!("invalid boolean '{}'", other)),
    }
}

fn parse_seconds(value: &str) -> Result<u64, String> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid timeout '{}'", value.trim()))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("invalid timeout '{}'", value.trim()));
    }
    Ok(secs.ceil() as u64)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AddressList {
    Joined(String),
    List(Vec<String>),
}

fn address_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match AddressList::deserialize(deserializer)? {
        AddressList::Joined(joined) => split_addresses(&joined),
        AddressList::List(list) => list
            .iter()
            .map(|addr| addr.trim().to_string())
            .collect(),
    })
}

// =============================================================================
// Admin CLI
// =============================================================================

/// Inspect and invalidate layers in a Cassandra tile cache.
///
/// Commands:
///   counts [layer]      number of cached tiles per layer
///   invalidate <layer>  delete every tile of a layer
///   schema              create the keyspace and Tiles table if missing
#[derive(Parser, Debug, Clone)]
#[command(name = "tilecache-cassandra")]
#[command(author, version, about, long_about = None)]
pub struct AdminCli {
    /// Cassandra node (host or host:port).
    pub hostname: String,

    /// counts, invalidate, or schema.
    pub command: String,

    /// Layer to count or invalidate.
    pub layer: Option<String>,

    /// Keyspace containing the Tiles table.
    #[arg(long, default_value = DEFAULT_KEYSPACE, env = "TILECACHE_KEYSPACE")]
    pub keyspace: String,

    /// Print counts as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Cassandra username.
    #[arg(long, env = "TILECACHE_CASSANDRA_USERNAME")]
    pub username: Option<String>,

    /// Cassandra password.
    #[arg(long, env = "TILECACHE_CASSANDRA_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// A parsed admin command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Count one layer, or every layer when `None`
    Counts(Option<String>),

    /// Drop a layer's row
    Invalidate(String),

    /// Create keyspace and table
    Schema,
}

impl AdminCli {
    /// Resolve the positional command and layer.
    pub fn admin_command(&self) -> Result<AdminCommand, AdminError> {
        match self.command.as_str() {
            "counts" => Ok(AdminCommand::Counts(self.layer.clone())),
            "invalidate" => self
                .layer
                .clone()
                .map(AdminCommand::Invalidate)
                .ok_or(AdminError::MissingLayer),
            "schema" => Ok(AdminCommand::Schema),
            other => Err(AdminError::UnknownCommand(other.to_string())),
        }
    }

    /// Username and password, when a username is set.
    pub fn credentials(&self) -> Option<(String, String)> {
        self.username
            .clone()
            .map(|username| (username, self.password.clone().unwrap_or_default()))
    }

    /// Node address with the default CQL port filled in.
    pub fn node_address(&self) -> String {
        let has_port = self
            .hostname
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if has_port {
            self.hostname.clone()
        } else {
            format!("{}:{}", self.hostname, DEFAULT_CQL_PORT)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
