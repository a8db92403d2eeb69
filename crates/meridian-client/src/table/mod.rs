//! Table handle.
//!
//! A `Table` binds a table name to its database's request capabilities and
//! exposes the per-table operations: schema create and drop, row writes, row
//! deletes, and point reads.
//!
//! # Example
//!
//! ```ignore
//! use meridian_client::types::{row, KeySet};
//!
//! let singers = database.table("Singers");
//! singers
//!     .insert(vec![row([("SingerId", 1.into()), ("Name", "Ana".into())])])
//!     .await?;
//!
//! let rows = singers.read(KeySet::from("1"), None).await?;
//! ```

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::task::JoinHandle;

use crate::database::{Api, Database, SchemaOperation};
use crate::error::{ClientError, ClientResult};
use crate::request::{
    format_timestamp_options, CommitResponse, MutationKind, ReadRequest, TransactionOptions,
    TransactionRequest, TransactionRequester, TransactionSelector,
};
use crate::transport::{RowStream, StreamingRequest, UnaryRequest};
use crate::types::{KeySet, Row, TimestampBounds};

/// A table in a database.
#[derive(Clone)]
pub struct Table {
    name: String,
    database: Arc<dyn Database>,
    api: Arc<Api>,
    request: Arc<dyn UnaryRequest>,
    request_stream: Arc<dyn StreamingRequest>,
    requester: Arc<dyn TransactionRequester>,
}

impl Table {
    /// Creates a table handle over the database's pooled invokers.
    pub fn new(database: Arc<dyn Database>, name: impl Into<String>) -> Self {
        let request = database.make_pooled_request();
        let request_stream = database.make_pooled_streaming_request();
        let requester: Arc<dyn TransactionRequester> = Arc::new(TransactionRequest::new(
            Arc::clone(&request),
            Arc::clone(&request_stream),
        ));

        Self::bind(database, name.into(), request, request_stream, requester)
    }

    /// Creates a table handle that routes reads and writes through `requester`.
    pub fn with_requester(
        database: Arc<dyn Database>,
        name: impl Into<String>,
        requester: Arc<dyn TransactionRequester>,
    ) -> Self {
        let request = database.make_pooled_request();
        let request_stream = database.make_pooled_streaming_request();

        Self::bind(database, name.into(), request, request_stream, requester)
    }

    fn bind(
        database: Arc<dyn Database>,
        name: String,
        request: Arc<dyn UnaryRequest>,
        request_stream: Arc<dyn StreamingRequest>,
        requester: Arc<dyn TransactionRequester>,
    ) -> Self {
        let api = database.api();
        Self {
            name,
            database,
            api,
            request,
            request_stream,
            requester,
        }
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owning database.
    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    /// Returns the database's resource identity.
    pub fn api(&self) -> &Arc<Api> {
        &self.api
    }

    /// Returns the unary invoker bound at construction.
    pub fn request(&self) -> &Arc<dyn UnaryRequest> {
        &self.request
    }

    /// Returns the streaming invoker bound at construction.
    pub fn request_stream(&self) -> &Arc<dyn StreamingRequest> {
        &self.request_stream
    }

    /// Creates the table from a `CREATE TABLE` statement.
    pub async fn create(&self, schema: &str) -> ClientResult<SchemaOperation> {
        tracing::debug!("Creating table {}", self.name);
        self.database.create_table(schema).await
    }

    /// Opens a stream over the rows a read selects.
    ///
    /// With `options`, the read runs in a single-use read-only transaction
    /// bounded by them. Rows are yielded as the server sends them.
    pub fn create_read_stream(
        &self,
        request: impl Into<ReadRequest>,
        options: Option<TimestampBounds>,
    ) -> RowStream {
        let mut request = request.into();

        if let Some(options) = options {
            request.transaction = Some(TransactionSelector::SingleUse(TransactionOptions {
                read_only: format_timestamp_options(&options),
            }));
        }

        tracing::debug!("Opening read stream on {}", self.name);
        self.requester.create_read_stream(&self.name, request)
    }

    /// Drops the table.
    ///
    /// Use [`Table::delete_rows`] to remove rows and keep the table. Fails
    /// without contacting the server if the name contains a backtick.
    pub async fn delete(&self) -> ClientResult<SchemaOperation> {
        if self.name.contains('`') {
            return Err(ClientError::InvalidTableName(self.name.clone()));
        }

        tracing::debug!("Dropping table {}", self.name);
        let statement = format!("DROP TABLE `{}`", self.name);
        self.database.update_schema(vec![statement]).await
    }

    /// Deletes the rows `keys` selects.
    pub async fn delete_rows(&self, keys: KeySet) -> ClientResult<CommitResponse> {
        tracing::debug!("Deleting rows from {}", self.name);
        self.requester.delete_rows(&self.name, keys).await
    }

    /// Inserts rows. Fails if any row already exists.
    pub async fn insert(&self, rows: Vec<Row>) -> ClientResult<CommitResponse> {
        self.mutate(MutationKind::Insert, rows).await
    }

    /// Updates existing rows. Fails if any row does not exist.
    pub async fn update(&self, rows: Vec<Row>) -> ClientResult<CommitResponse> {
        self.mutate(MutationKind::Update, rows).await
    }

    /// Replaces rows. Columns not given are cleared.
    pub async fn replace(&self, rows: Vec<Row>) -> ClientResult<CommitResponse> {
        self.mutate(MutationKind::Replace, rows).await
    }

    /// Inserts rows, or updates them if they already exist.
    pub async fn upsert(&self, rows: Vec<Row>) -> ClientResult<CommitResponse> {
        self.mutate(MutationKind::InsertOrUpdate, rows).await
    }

    async fn mutate(&self, kind: MutationKind, rows: Vec<Row>) -> ClientResult<CommitResponse> {
        tracing::debug!("Applying {} of {} row(s) to {}", kind, rows.len(), self.name);
        self.requester.mutate(kind, &self.name, rows).await
    }

    /// Reads the rows a read selects.
    ///
    /// Resolves once the stream ends. The first stream error is returned as
    /// is and any rows received before it are dropped.
    pub async fn read(
        &self,
        request: impl Into<ReadRequest>,
        options: Option<TimestampBounds>,
    ) -> ClientResult<Vec<Row>> {
        let mut stream = self.create_read_stream(request, options);
        let mut rows = Vec::new();

        while let Some(row) = stream.next().await {
            rows.push(row?);
        }

        Ok(rows)
    }

    /// Reads rows on a spawned task and hands the result to `callback`.
    ///
    /// The callback runs exactly once, unless the task is aborted first.
    pub fn read_with<F>(
        &self,
        request: impl Into<ReadRequest>,
        options: Option<TimestampBounds>,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(ClientResult<Vec<Row>>) + Send + 'static,
    {
        let table = self.clone();
        let request = request.into();

        tokio::spawn(async move {
            let result = table.read(request, options).await;
            callback(result);
        })
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("database", &self.api.database_path())
            .finish_non_exhaustive()
    }
}
