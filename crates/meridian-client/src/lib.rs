//! # meridian-client
//!
//! Table-scoped data client for Meridian databases.
//!
//! This crate provides per-table reads and writes against a Meridian
//! database reached through a pooled request channel. It includes:
//!
//! - **Tables**: Insert, update, replace, upsert and delete rows; create and drop tables
//! - **Reads**: Point and range reads as row streams or collected results
//! - **Session Pooling**: Bounded server-session reuse with idle and lifetime limits
//! - **Configuration**: TOML-backed client configuration
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use meridian_client::{ClientConfig, DatabaseHandle, Key};
//! use meridian_client::types::{row, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .project("acme")
//!         .instance("prod")
//!         .database("music")
//!         .build();
//!
//!     let database = DatabaseHandle::open(&config, transport).await?;
//!     let singers = database.table("Singers");
//!
//!     singers
//!         .upsert(vec![row([("SingerId", Value::from(1)), ("Name", "Ana".into())])])
//!         .await?;
//!
//!     let rows = singers.read(Key::from(1i64), None).await?;
//!     println!("Found {} rows", rows.len());
//!
//!     database.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Bounded Reads
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use meridian_client::{KeySet, TimestampBounds};
//!
//! let bounds = TimestampBounds::new().max_staleness(Duration::from_secs(15));
//! let rows = singers.read(KeySet::All, Some(bounds)).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Client configuration.
pub mod config;

/// Database handle.
pub mod database;

/// Error types.
pub mod error;

/// Session pool.
pub mod pool;

/// Transaction request primitive.
pub mod request;

/// Table handle.
pub mod table;

/// Request transport.
pub mod transport;

/// Values, keys and timestamp bounds.
pub mod types;

// Re-exports
pub use config::{ClientConfig, ClientConfigBuilder};
pub use database::{Api, Database, DatabaseHandle, SchemaOperation};
pub use error::{ClientError, ClientResult};
pub use pool::{
    PoolConfig, PoolStats, PooledRequest, PooledSession, PooledStreamingRequest, SessionPool,
};
pub use request::{
    format_timestamp_options, CommitResponse, MutationKind, ReadRequest, TransactionRequest,
    TransactionRequester,
};
pub use table::Table;
pub use transport::{RowStream, RpcRequest, RpcResponse, StreamingRequest, Transport, UnaryRequest};
pub use types::{Key, KeyRange, KeySet, Row, TimestampBounds, Value};
