//! Typed RPC surface between the client and the wire.
//!
//! A [`Transport`] executes one [`RpcRequest`] at a time. It knows nothing
//! about sessions or pooling; the pooled invokers in [`crate::pool`] stamp a
//! session onto each request before handing it down.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use serde::Serialize;

use crate::database::SchemaOperation;
use crate::error::ClientResult;
use crate::request::{CommitResponse, Mutation, ReadRequest};
use crate::types::Row;

/// Stream of rows produced by a read.
pub type RowStream = Pin<Box<dyn Stream<Item = ClientResult<Row>> + Send>>;

/// A read addressed to one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadCall {
    /// Session the read runs in.
    pub session: String,
    /// Table to read.
    pub table: String,
    /// Keys, columns and transaction selector.
    #[serde(flatten)]
    pub request: ReadRequest,
}

/// A single-use read-write commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitCall {
    /// Session the commit runs in.
    pub session: String,
    /// Mutations applied atomically.
    pub mutations: Vec<Mutation>,
}

/// A request sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RpcRequest {
    /// Open a new session on a database.
    #[serde(rename_all = "camelCase")]
    CreateSession {
        /// Fully qualified database path.
        database: String,
    },
    /// Close a session.
    #[serde(rename_all = "camelCase")]
    DeleteSession {
        /// Session name.
        session: String,
    },
    /// Commit mutations.
    Commit(CommitCall),
    /// Stream rows by key.
    StreamingRead(ReadCall),
    /// Apply DDL statements.
    #[serde(rename_all = "camelCase")]
    UpdateDatabaseDdl {
        /// Fully qualified database path.
        database: String,
        /// DDL statements, applied in order.
        statements: Vec<String>,
    },
}

impl RpcRequest {
    /// Returns the RPC method name.
    pub fn method(&self) -> &'static str {
        match self {
            RpcRequest::CreateSession { .. } => "createSession",
            RpcRequest::DeleteSession { .. } => "deleteSession",
            RpcRequest::Commit(_) => "commit",
            RpcRequest::StreamingRead(_) => "streamingRead",
            RpcRequest::UpdateDatabaseDdl { .. } => "updateDatabaseDdl",
        }
    }

    /// Returns true if the request runs inside a session.
    pub fn needs_session(&self) -> bool {
        matches!(self, RpcRequest::Commit(_) | RpcRequest::StreamingRead(_))
    }

    /// Sets the session a request runs in. Requests that run outside a
    /// session are returned unchanged.
    pub fn with_session(mut self, name: &str) -> Self {
        match &mut self {
            RpcRequest::Commit(call) => call.session = name.to_string(),
            RpcRequest::StreamingRead(call) => call.session = name.to_string(),
            _ => {}
        }
        self
    }
}

/// A response received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcResponse {
    /// Name of a newly created session.
    Session(String),
    /// Acknowledgement with no payload.
    Empty,
    /// Result of a commit.
    Commit(CommitResponse),
    /// Handle of a long-running schema operation.
    Operation(SchemaOperation),
}

impl RpcResponse {
    /// Returns a short name for the response kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcResponse::Session(_) => "session",
            RpcResponse::Empty => "empty",
            RpcResponse::Commit(_) => "commit",
            RpcResponse::Operation(_) => "operation",
        }
    }
}

/// The wire underneath the client.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes a unary RPC.
    async fn call(&self, request: RpcRequest) -> ClientResult<RpcResponse>;

    /// Opens a server-streaming RPC that yields rows.
    fn stream(&self, request: RpcRequest) -> RowStream;
}

/// Unary request invoker handed out by a database.
#[async_trait]
pub trait UnaryRequest: Send + Sync {
    /// Executes a unary RPC.
    async fn request(&self, request: RpcRequest) -> ClientResult<RpcResponse>;
}

/// Streaming request invoker handed out by a database.
pub trait StreamingRequest: Send + Sync {
    /// Opens a row stream.
    fn request_stream(&self, request: RpcRequest) -> RowStream;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KeySet;
    use serde_json::json;

    fn read_call() -> RpcRequest {
        RpcRequest::StreamingRead(ReadCall {
            session: String::new(),
            table: "Singers".to_string(),
            request: ReadRequest::from(KeySet::from("a")),
        })
    }

    #[test]
    fn test_with_session() {
        let request = read_call().with_session("sessions/1");
        match request {
            RpcRequest::StreamingRead(call) => assert_eq!(call.session, "sessions/1"),
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_with_session_ignores_sessionless_requests() {
        let request = RpcRequest::CreateSession {
            database: "projects/p/instances/i/databases/d".to_string(),
        };
        assert!(!request.needs_session());
        assert_eq!(request.clone().with_session("sessions/1"), request);
    }

    #[test]
    fn test_read_call_wire_shape() {
        let value = serde_json::to_value(read_call().with_session("s")).unwrap();
        assert_eq!(
            value,
            json!({"streamingRead": {
                "session": "s",
                "table": "Singers",
                "keySet": {"keys": [["a"]]},
                "columns": [],
            }})
        );
    }

    #[test]
    fn test_method_names() {
        assert_eq!(read_call().method(), "streamingRead");
        assert_eq!(
            RpcRequest::DeleteSession {
                session: "s".to_string()
            }
            .method(),
            "deleteSession"
        );
    }
}
