use thiserror::Error;

/// Errors talking to the column store.
///
/// A missing row or column is never an error; reads return `Ok(None)`.
/// Every variant here is a genuine failure that the caller decides whether
/// to retry.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Could not reach a node, or the connection broke mid-request
    #[error("Connection error: {0}")]
    Connection(String),

    /// No reply within the request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A node rejected or failed the request
    #[error("Server error: {message}")]
    Server { message: String, transient: bool },

    /// A reply did not have the expected shape
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl StoreError {
    /// Whether repeating the same request later may succeed.
    ///
    /// Server errors count when the node reported itself unavailable,
    /// overloaded, bootstrapping, or timed out waiting for replicas.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Connection(_) | StoreError::Timeout(_) => true,
            StoreError::Server { transient, .. } => *transient,
            StoreError::Protocol(_) => false,
        }
    }
}

/// Errors talking to the lock service.
///
/// These never leave a lock backend: acquisition failures become `false`
/// and release failures are logged and dropped.
#[derive(Debug, Clone, Error)]
pub enum LockError {
    /// Could not reach the server, or the connection broke
    #[error("Connection error: {0}")]
    Connection(String),

    /// Server skipped because a recent connect or request failed
    #[error("Server {0} marked dead")]
    Dead(String),

    /// No reply within the socket timeout
    #[error("Request timed out")]
    Timeout,

    /// Unexpected or error reply from the server
    #[error("Unexpected reply: {0}")]
    Reply(String),
}

/// Errors building or administering a tile cache.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Column store failure, including an unreachable cluster at start-up
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Admin command line errors that clap cannot catch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminError {
    #[error("No layer specified!")]
    MissingLayer,

    #[error("Invalid command specified: {0}")]
    UnknownCommand(String),
}

impl AdminError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            AdminError::MissingLayer => 3,
            AdminError::UnknownCommand(_) => 4,
        }
    }
}
