//! Error types for the client library.

use thiserror::Error;

/// Client error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A unary request failed on the transport.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// A streaming read failed mid-stream.
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// A commit was rejected.
    #[error("commit failed: {0}")]
    CommitFailed(String),

    /// A schema update was rejected.
    #[error("schema update failed: {0}")]
    SchemaUpdateFailed(String),

    /// The server answered with a response of the wrong kind.
    #[error("unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        /// Response kind the request calls for.
        expected: &'static str,
        /// Response kind actually received.
        actual: &'static str,
    },

    /// Session pool acquisition timed out.
    #[error("session acquisition timeout after {0}ms")]
    PoolTimeout(u64),

    /// Session pool was closed.
    #[error("session pool closed")]
    PoolClosed,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed or written.
    #[error("configuration error: {0}")]
    ConfigFormat(String),

    /// I/O error while reading or writing configuration.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A table name cannot be quoted as an identifier.
    #[error("invalid table name: {0}")]
    InvalidTableName(String),
}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        ClientError::ConfigFormat(err.to_string())
    }
}

impl From<toml::ser::Error> for ClientError {
    fn from(err: toml::ser::Error) -> Self {
        ClientError::ConfigFormat(err.to_string())
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
