//! Transaction request primitive.
//!
//! Turns table-scoped reads, row deletes and writes into typed RPCs and runs
//! them through the pooled invokers. Writes commit in a single-use read-write
//! transaction; reads run in a single-use read-only transaction when a
//! timestamp bound is given, and in the server's default strong read
//! otherwise.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{ClientError, ClientResult};
use crate::transport::{
    CommitCall, ReadCall, RowStream, RpcRequest, RpcResponse, StreamingRequest, UnaryRequest,
};
use crate::types::{Key, KeyRange, KeySet, Row, TimestampBounds, Value};

// =============================================================================
// Reads
// =============================================================================

/// A keyed read against one table.
///
/// Key sets, keys and key lists convert into a `ReadRequest` with only
/// `keys` set; the key set is moved in as is.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRequest {
    /// Rows to read.
    #[serde(rename = "keySet")]
    pub keys: KeySet,
    /// Columns to return. Empty means the server default.
    pub columns: Vec<String>,
    /// Secondary index to read through.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    /// Maximum rows to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Transaction to read in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionSelector>,
}

impl ReadRequest {
    /// Creates a read for the given keys.
    pub fn new(keys: impl Into<KeySet>) -> Self {
        Self {
            keys: keys.into(),
            columns: Vec::new(),
            index: None,
            limit: None,
            transaction: None,
        }
    }

    /// Restricts the columns returned.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Reads through a secondary index.
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Caps the number of rows returned.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl From<KeySet> for ReadRequest {
    fn from(keys: KeySet) -> Self {
        ReadRequest::new(keys)
    }
}

impl From<Key> for ReadRequest {
    fn from(key: Key) -> Self {
        ReadRequest::new(key)
    }
}

impl From<Vec<Key>> for ReadRequest {
    fn from(keys: Vec<Key>) -> Self {
        ReadRequest::new(keys)
    }
}

impl From<KeyRange> for ReadRequest {
    fn from(range: KeyRange) -> Self {
        ReadRequest::new(range)
    }
}

impl From<&str> for ReadRequest {
    fn from(key: &str) -> Self {
        ReadRequest::new(key)
    }
}

/// Selects the transaction a read runs in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionSelector {
    /// A transaction that exists only for this request.
    SingleUse(TransactionOptions),
}

impl TransactionSelector {
    /// Returns the single-use options, if any.
    pub fn single_use(&self) -> Option<&TransactionOptions> {
        match self {
            TransactionSelector::SingleUse(options) => Some(options),
        }
    }
}

/// Options of a single-use transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOptions {
    /// Read-only mode with a timestamp bound.
    pub read_only: ReadOnly,
}

/// Timestamp bound in wire form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadOnly {
    /// Strong read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strong: Option<bool>,
    /// Lower bound on the read timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_read_timestamp: Option<ProtoTimestamp>,
    /// Upper bound on staleness.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_staleness: Option<ProtoDuration>,
    /// Exact read timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timestamp: Option<ProtoTimestamp>,
    /// Exact staleness.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact_staleness: Option<ProtoDuration>,
    /// Report the chosen read timestamp.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub return_read_timestamp: bool,
}

/// Seconds and nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProtoTimestamp {
    /// Whole seconds.
    pub seconds: i64,
    /// Sub-second nanoseconds.
    pub nanos: i32,
}

impl From<DateTime<Utc>> for ProtoTimestamp {
    fn from(ts: DateTime<Utc>) -> Self {
        Self {
            seconds: ts.timestamp(),
            nanos: ts.timestamp_subsec_nanos() as i32,
        }
    }
}

/// A span of time as seconds and nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProtoDuration {
    /// Whole seconds.
    pub seconds: i64,
    /// Sub-second nanoseconds.
    pub nanos: i32,
}

impl From<std::time::Duration> for ProtoDuration {
    fn from(d: std::time::Duration) -> Self {
        Self {
            seconds: i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
            nanos: d.subsec_nanos() as i32,
        }
    }
}

/// Converts caller timestamp bounds into their wire form.
///
/// Bounds that are not set are left out; an empty bound set yields an empty
/// `ReadOnly`, which the server treats as a strong read.
pub fn format_timestamp_options(options: &TimestampBounds) -> ReadOnly {
    ReadOnly {
        strong: options.strong,
        min_read_timestamp: options.min_read_timestamp.map(ProtoTimestamp::from),
        max_staleness: options.max_staleness.map(ProtoDuration::from),
        read_timestamp: options.read_timestamp.map(ProtoTimestamp::from),
        exact_staleness: options.exact_staleness.map(ProtoDuration::from),
        return_read_timestamp: options.return_read_timestamp,
    }
}

// =============================================================================
// Writes
// =============================================================================

/// Wire-level write verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// Fails if the row exists.
    Insert,
    /// Fails if the row does not exist.
    Update,
    /// Deletes then inserts the row.
    Replace,
    /// Inserts or updates the row.
    InsertOrUpdate,
}

impl MutationKind {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Insert => "insert",
            MutationKind::Update => "update",
            MutationKind::Replace => "replace",
            MutationKind::InsertOrUpdate => "insertOrUpdate",
        }
    }
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column-major write payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Write {
    /// Target table.
    pub table: String,
    /// Column names, shared by every row.
    pub columns: Vec<String>,
    /// One entry per row, in `columns` order.
    pub values: Vec<Vec<Value>>,
}

/// Row-delete payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Delete {
    /// Target table.
    pub table: String,
    /// Rows to delete.
    pub key_set: KeySet,
}

/// A single mutation inside a commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Mutation {
    /// Insert rows.
    Insert(Write),
    /// Update rows.
    Update(Write),
    /// Replace rows.
    Replace(Write),
    /// Insert or update rows.
    InsertOrUpdate(Write),
    /// Delete rows.
    Delete(Delete),
}

impl Mutation {
    /// Builds a write mutation from rows.
    ///
    /// The column list is the sorted union of every row's columns. A row that
    /// lacks a column writes `NULL` there.
    pub fn write(kind: MutationKind, table: &str, rows: Vec<Row>) -> Self {
        let columns: Vec<String> = rows
            .iter()
            .flat_map(|row| row.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let values = rows
            .into_iter()
            .map(|mut row| {
                columns
                    .iter()
                    .map(|column| row.remove(column).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        let write = Write {
            table: table.to_string(),
            columns,
            values,
        };

        match kind {
            MutationKind::Insert => Mutation::Insert(write),
            MutationKind::Update => Mutation::Update(write),
            MutationKind::Replace => Mutation::Replace(write),
            MutationKind::InsertOrUpdate => Mutation::InsertOrUpdate(write),
        }
    }

    /// Builds a row-delete mutation.
    pub fn delete(table: &str, keys: KeySet) -> Self {
        Mutation::Delete(Delete {
            table: table.to_string(),
            key_set: keys,
        })
    }

    /// Returns the table the mutation targets.
    pub fn table(&self) -> &str {
        match self {
            Mutation::Insert(w)
            | Mutation::Update(w)
            | Mutation::Replace(w)
            | Mutation::InsertOrUpdate(w) => &w.table,
            Mutation::Delete(d) => &d.table,
        }
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitResponse {
    /// Timestamp the commit became visible at.
    pub commit_timestamp: Option<DateTime<Utc>>,
}

// =============================================================================
// Requester
// =============================================================================

/// Table-scoped read and write operations.
///
/// Every operation takes the table name explicitly; implementations hold no
/// per-table state.
#[async_trait]
pub trait TransactionRequester: Send + Sync {
    /// Opens a stream over the rows `request` selects.
    fn create_read_stream(&self, table: &str, request: ReadRequest) -> RowStream;

    /// Deletes the rows `keys` selects.
    async fn delete_rows(&self, table: &str, keys: KeySet) -> ClientResult<CommitResponse>;

    /// Applies `rows` to `table` with the given write verb.
    async fn mutate(
        &self,
        kind: MutationKind,
        table: &str,
        rows: Vec<Row>,
    ) -> ClientResult<CommitResponse>;
}

/// [`TransactionRequester`] over a database's pooled invokers.
pub struct TransactionRequest {
    request: Arc<dyn UnaryRequest>,
    request_stream: Arc<dyn StreamingRequest>,
}

impl TransactionRequest {
    /// Creates a requester over the given invokers.
    pub fn new(request: Arc<dyn UnaryRequest>, request_stream: Arc<dyn StreamingRequest>) -> Self {
        Self {
            request,
            request_stream,
        }
    }

    /// Commits mutations in a single-use read-write transaction.
    async fn commit(&self, mutations: Vec<Mutation>) -> ClientResult<CommitResponse> {
        tracing::debug!("Committing {} mutation(s)", mutations.len());

        let call = CommitCall {
            session: String::new(),
            mutations,
        };

        match self.request.request(RpcRequest::Commit(call)).await? {
            RpcResponse::Commit(response) => Ok(response),
            other => Err(ClientError::UnexpectedResponse {
                expected: "commit",
                actual: other.kind(),
            }),
        }
    }
}

impl std::fmt::Debug for TransactionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionRequest").finish_non_exhaustive()
    }
}

#[async_trait]
impl TransactionRequester for TransactionRequest {
    fn create_read_stream(&self, table: &str, request: ReadRequest) -> RowStream {
        let call = ReadCall {
            session: String::new(),
            table: table.to_string(),
            request,
        };
        self.request_stream
            .request_stream(RpcRequest::StreamingRead(call))
    }

    async fn delete_rows(&self, table: &str, keys: KeySet) -> ClientResult<CommitResponse> {
        self.commit(vec![Mutation::delete(table, keys)]).await
    }

    async fn mutate(
        &self,
        kind: MutationKind,
        table: &str,
        rows: Vec<Row>,
    ) -> ClientResult<CommitResponse> {
        self.commit(vec![Mutation::write(kind, table, rows)]).await
    }
}
