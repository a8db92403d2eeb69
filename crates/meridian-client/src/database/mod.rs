//! Database handle.
//!
//! A database owns the session pool and the resource path every request is
//! addressed to. Tables borrow their request capabilities from it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::pool::{PooledRequest, PooledStreamingRequest, SessionPool};
use crate::table::Table;
use crate::transport::{RpcRequest, RpcResponse, StreamingRequest, Transport, UnaryRequest};

/// Resource identity of a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Api {
    /// Project id.
    pub project: String,
    /// Instance id.
    pub instance: String,
    /// Database id.
    pub database: String,
}

impl Api {
    /// Creates a resource identity.
    pub fn new(
        project: impl Into<String>,
        instance: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            instance: instance.into(),
            database: database.into(),
        }
    }

    /// Returns `projects/{project}/instances/{instance}/databases/{database}`.
    pub fn database_path(&self) -> String {
        format!(
            "projects/{}/instances/{}/databases/{}",
            self.project, self.instance, self.database
        )
    }
}

/// Handle of a long-running schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaOperation {
    /// Server-assigned operation name.
    pub name: String,
    /// Statements the operation applies.
    pub statements: Vec<String>,
}

/// Capabilities a database exposes to its tables.
#[async_trait]
pub trait Database: Send + Sync {
    /// Returns the database's resource identity.
    fn api(&self) -> Arc<Api>;

    /// Returns a unary invoker backed by the session pool.
    fn make_pooled_request(&self) -> Arc<dyn UnaryRequest>;

    /// Returns a streaming invoker backed by the session pool.
    fn make_pooled_streaming_request(&self) -> Arc<dyn StreamingRequest>;

    /// Creates a table from a `CREATE TABLE` statement.
    async fn create_table(&self, schema: &str) -> ClientResult<SchemaOperation>;

    /// Applies DDL statements.
    async fn update_schema(&self, statements: Vec<String>) -> ClientResult<SchemaOperation>;
}

/// A database reached through a [`Transport`].
pub struct DatabaseHandle {
    api: Arc<Api>,
    pool: Arc<SessionPool>,
    transport: Arc<dyn Transport>,
}

impl DatabaseHandle {
    /// Opens a handle and creates the configured minimum number of sessions.
    pub async fn open(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> ClientResult<Arc<Self>> {
        let handle = Self::new(config, transport)?;
        handle.pool.initialize().await?;
        Ok(handle)
    }

    /// Creates a handle without contacting the server. Sessions are created
    /// on first use; use [`DatabaseHandle::open`] to create `min_sessions` up
    /// front.
    pub fn new(config: &ClientConfig, transport: Arc<dyn Transport>) -> ClientResult<Arc<Self>> {
        config.validate()?;

        let api = Arc::new(config.api());
        let pool = SessionPool::new(config.pool_config(), api.database_path(), transport.clone())?;

        tracing::info!("Opened database {}", api.database_path());

        Ok(Arc::new(Self {
            api,
            pool,
            transport,
        }))
    }

    /// Returns a table handle.
    pub fn table(self: &Arc<Self>, name: impl Into<String>) -> Table {
        let database: Arc<dyn Database> = self.clone();
        Table::new(database, name)
    }

    /// Returns the session pool.
    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// Closes the session pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl std::fmt::Debug for DatabaseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseHandle")
            .field("database", &self.api.database_path())
            .field("pool", &self.pool)
            .finish()
    }
}

#[async_trait]
impl Database for DatabaseHandle {
    fn api(&self) -> Arc<Api> {
        Arc::clone(&self.api)
    }

    fn make_pooled_request(&self) -> Arc<dyn UnaryRequest> {
        Arc::new(PooledRequest::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.transport),
        ))
    }

    fn make_pooled_streaming_request(&self) -> Arc<dyn StreamingRequest> {
        Arc::new(PooledStreamingRequest::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.transport),
        ))
    }

    async fn create_table(&self, schema: &str) -> ClientResult<SchemaOperation> {
        self.update_schema(vec![schema.to_string()]).await
    }

    async fn update_schema(&self, statements: Vec<String>) -> ClientResult<SchemaOperation> {
        tracing::debug!(
            "Updating schema of {} with {} statement(s)",
            self.api.database,
            statements.len()
        );

        let request = RpcRequest::UpdateDatabaseDdl {
            database: self.api.database_path(),
            statements,
        };

        match self.transport.call(request).await? {
            RpcResponse::Operation(operation) => Ok(operation),
            other => Err(ClientError::UnexpectedResponse {
                expected: "operation",
                actual: other.kind(),
            }),
        }
    }
}
