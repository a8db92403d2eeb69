//! End-to-end tests for table operations.
//!
//! These tests drive a `Table` through the database handle, session pool and
//! pooled invokers against an in-memory transport that applies commits, DDL
//! and keyed reads the way the server does.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;

use meridian_client::request::{Mutation, Write};
use meridian_client::transport::CommitCall;
use meridian_client::types::{row, Value};
use meridian_client::{
    ClientConfig, ClientError, ClientResult, CommitResponse, DatabaseHandle, Key, KeySet,
    ReadRequest, Row, RowStream, RpcRequest, RpcResponse, SchemaOperation, Table,
    TimestampBounds, Transport,
};

const SINGERS: &str =
    "CREATE TABLE Singers (SingerId INT64 NOT NULL, Name STRING(MAX)) PRIMARY KEY (SingerId)";

/// A table held by the in-memory server, keyed by its primary key column.
struct StoredTable {
    key_column: String,
    rows: BTreeMap<String, Row>,
}

/// In-memory server behind the `Transport` trait.
#[derive(Default)]
struct MemoryTransport {
    tables: Mutex<HashMap<String, StoredTable>>,
    requests: Mutex<Vec<RpcRequest>>,
    next_session: Mutex<u64>,
}

impl MemoryTransport {
    fn requests(&self) -> Vec<RpcRequest> {
        self.requests.lock().clone()
    }

    fn apply_ddl(&self, statement: &str) -> ClientResult<()> {
        let mut tables = self.tables.lock();

        if let Some(rest) = statement.strip_prefix("CREATE TABLE ") {
            let name = rest.split_whitespace().next().unwrap_or_default().to_string();
            let key_column = statement
                .split("PRIMARY KEY (")
                .nth(1)
                .and_then(|tail| tail.split(')').next())
                .ok_or_else(|| ClientError::SchemaUpdateFailed("missing primary key".into()))?
                .to_string();
            tables.insert(
                name,
                StoredTable {
                    key_column,
                    rows: BTreeMap::new(),
                },
            );
            return Ok(());
        }

        if let Some(rest) = statement.strip_prefix("DROP TABLE ") {
            let name = rest.trim_matches('`');
            return tables.remove(name).map(|_| ()).ok_or_else(|| {
                ClientError::SchemaUpdateFailed(format!("table not found: {}", name))
            });
        }

        Err(ClientError::SchemaUpdateFailed(format!("unsupported: {}", statement)))
    }

    fn apply_write(
        table: &mut StoredTable,
        write: &Write,
        insert: bool,
        update: bool,
        merge: bool,
    ) -> ClientResult<()> {
        for values in &write.values {
            let row: Row = write.columns.iter().cloned().zip(values.iter().cloned()).collect();
            let key = row
                .get(&table.key_column)
                .map(|v| v.to_string())
                .ok_or_else(|| ClientError::CommitFailed("missing key column".into()))?;

            let exists = table.rows.contains_key(&key);
            if exists && !update {
                return Err(ClientError::CommitFailed(format!("row already exists: {}", key)));
            }
            if !exists && !insert {
                return Err(ClientError::CommitFailed(format!("row not found: {}", key)));
            }

            match table.rows.get_mut(&key) {
                Some(existing) if merge => existing.extend(row),
                Some(existing) => *existing = row,
                None => {
                    table.rows.insert(key, row);
                }
            }
        }
        Ok(())
    }

    fn commit(&self, call: &CommitCall) -> ClientResult<CommitResponse> {
        let mut tables = self.tables.lock();

        for mutation in &call.mutations {
            let table = tables.get_mut(mutation.table()).ok_or_else(|| {
                ClientError::CommitFailed(format!("table not found: {}", mutation.table()))
            })?;

            match mutation {
                Mutation::Insert(w) => Self::apply_write(table, w, true, false, false)?,
                Mutation::Update(w) => Self::apply_write(table, w, false, true, true)?,
                Mutation::Replace(w) => Self::apply_write(table, w, true, true, false)?,
                Mutation::InsertOrUpdate(w) => Self::apply_write(table, w, true, true, true)?,
                Mutation::Delete(d) => match &d.key_set {
                    KeySet::All => table.rows.clear(),
                    KeySet::Key(key) => {
                        table.rows.remove(&render(key));
                    }
                    KeySet::Keys(keys) => {
                        for key in keys {
                            table.rows.remove(&render(key));
                        }
                    }
                    KeySet::Ranges(_) => {
                        return Err(ClientError::CommitFailed("ranges unsupported".into()))
                    }
                },
            }
        }

        Ok(CommitResponse {
            commit_timestamp: Some(chrono::Utc::now()),
        })
    }

    fn read(&self, table: &str, request: &ReadRequest) -> ClientResult<Vec<Row>> {
        let tables = self.tables.lock();
        let stored = tables
            .get(table)
            .ok_or_else(|| ClientError::ReadFailed(format!("table not found: {}", table)))?;

        let rows = match &request.keys {
            KeySet::All => stored.rows.values().cloned().collect(),
            KeySet::Key(key) => stored.rows.get(&render(key)).cloned().into_iter().collect(),
            KeySet::Keys(keys) => keys
                .iter()
                .filter_map(|key| stored.rows.get(&render(key)).cloned())
                .collect(),
            KeySet::Ranges(_) => return Err(ClientError::ReadFailed("ranges unsupported".into())),
        };
        Ok(rows)
    }
}

fn render(key: &Key) -> String {
    key.parts().first().map(|v| v.to_string()).unwrap_or_default()
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn call(&self, request: RpcRequest) -> ClientResult<RpcResponse> {
        self.requests.lock().push(request.clone());

        match request {
            RpcRequest::CreateSession { .. } => {
                let mut next = self.next_session.lock();
                *next += 1;
                Ok(RpcResponse::Session(format!("sessions/{}", *next)))
            }
            RpcRequest::DeleteSession { .. } => Ok(RpcResponse::Empty),
            RpcRequest::Commit(call) => self.commit(&call).map(RpcResponse::Commit),
            RpcRequest::UpdateDatabaseDdl { statements, .. } => {
                for statement in &statements {
                    self.apply_ddl(statement)?;
                }
                Ok(RpcResponse::Operation(SchemaOperation {
                    name: "operations/ddl".to_string(),
                    statements,
                }))
            }
            RpcRequest::StreamingRead(_) => Err(ClientError::RequestFailed(
                "streamingRead is a streaming method".into(),
            )),
        }
    }

    fn stream(&self, request: RpcRequest) -> RowStream {
        self.requests.lock().push(request.clone());

        let rows = match &request {
            RpcRequest::StreamingRead(call) => self.read(&call.table, &call.request),
            other => Err(ClientError::RequestFailed(format!(
                "{} is not a streaming method",
                other.method()
            ))),
        };

        match rows {
            Ok(rows) => Box::pin(stream::iter(rows.into_iter().map(Ok))),
            Err(e) => Box::pin(stream::once(async move { Err(e) })),
        }
    }
}

fn config() -> ClientConfig {
    ClientConfig::builder()
        .project("acme")
        .instance("test")
        .database("music")
        .max_sessions(2)
        .acquire_timeout(Duration::from_millis(200))
        .build()
}

async fn singers() -> (Arc<MemoryTransport>, Arc<DatabaseHandle>, Table) {
    let transport = Arc::new(MemoryTransport::default());
    let database = DatabaseHandle::new(&config(), transport.clone()).expect("valid config");
    let table = database.table("Singers");
    table.create(SINGERS).await.expect("create table");
    (transport, database, table)
}

fn singer(id: i64, name: &str) -> Row {
    row([("SingerId", Value::from(id)), ("Name", Value::from(name))])
}

#[tokio::test]
async fn test_insert_then_read() {
    let (_, database, table) = singers().await;

    table
        .insert(vec![singer(1, "Ana"), singer(2, "Bo"), singer(3, "Cy")])
        .await
        .unwrap();

    let rows = table
        .read(vec![Key::from(3i64), Key::from(1i64)], None)
        .await
        .unwrap();
    assert_eq!(rows, vec![singer(3, "Cy"), singer(1, "Ana")]);

    let all = table.read(KeySet::All, None).await.unwrap();
    assert_eq!(all.len(), 3);

    // Every session went back to the pool.
    assert_eq!(database.pool().stats().active_sessions, 0);
}

#[tokio::test]
async fn test_write_verbs() {
    let (_, _, table) = singers().await;

    table.insert(vec![singer(1, "Ana")]).await.unwrap();

    let err = table.insert(vec![singer(1, "Ana")]).await.unwrap_err();
    assert!(matches!(err, ClientError::CommitFailed(msg) if msg.contains("already exists")));

    let err = table.update(vec![singer(2, "Bo")]).await.unwrap_err();
    assert!(matches!(err, ClientError::CommitFailed(msg) if msg.contains("not found")));

    table.update(vec![singer(1, "Ana Maria")]).await.unwrap();
    table.upsert(vec![singer(2, "Bo")]).await.unwrap();
    table
        .replace(vec![row([("SingerId", Value::from(1i64))])])
        .await
        .unwrap();

    let rows = table.read(KeySet::All, None).await.unwrap();
    assert_eq!(
        rows,
        vec![row([("SingerId", Value::from(1i64))]), singer(2, "Bo")]
    );
}

#[tokio::test]
async fn test_delete_rows_keeps_table() {
    let (_, _, table) = singers().await;
    table
        .insert(vec![singer(1, "Ana"), singer(2, "Bo")])
        .await
        .unwrap();

    table.delete_rows(KeySet::from(Key::from(1i64))).await.unwrap();

    let rows = table.read(KeySet::All, None).await.unwrap();
    assert_eq!(rows, vec![singer(2, "Bo")]);
}

#[tokio::test]
async fn test_delete_drops_table() {
    let (transport, _, table) = singers().await;
    table.insert(vec![singer(1, "Ana")]).await.unwrap();

    let op = table.delete().await.unwrap();
    assert_eq!(op.statements, vec!["DROP TABLE `Singers`".to_string()]);

    let err = table.read(KeySet::All, None).await.unwrap_err();
    assert!(matches!(err, ClientError::ReadFailed(msg) if msg.contains("table not found")));

    let ddl = transport
        .requests()
        .into_iter()
        .filter(|r| matches!(r, RpcRequest::UpdateDatabaseDdl { .. }))
        .count();
    assert_eq!(ddl, 2);
}

#[tokio::test]
async fn test_bounded_read_carries_transaction() {
    let (transport, _, table) = singers().await;
    table.insert(vec![singer(1, "Ana")]).await.unwrap();

    let bounds = TimestampBounds::new().exact_staleness(Duration::from_secs(10));
    let rows = table.read(Key::from(1i64), Some(bounds)).await.unwrap();
    assert_eq!(rows, vec![singer(1, "Ana")]);

    let reads: Vec<_> = transport
        .requests()
        .into_iter()
        .filter_map(|r| match r {
            RpcRequest::StreamingRead(call) => Some(call),
            _ => None,
        })
        .collect();
    assert_eq!(reads.len(), 1);
    assert!(reads[0].session.starts_with("sessions/"));

    let read_only = &reads[0]
        .request
        .transaction
        .as_ref()
        .and_then(|t| t.single_use())
        .unwrap()
        .read_only;
    let staleness = read_only.exact_staleness.unwrap();
    assert_eq!((staleness.seconds, staleness.nanos), (10, 0));
}

#[tokio::test]
async fn test_read_stream_yields_rows_incrementally() {
    let (_, database, table) = singers().await;
    table
        .insert(vec![singer(1, "Ana"), singer(2, "Bo")])
        .await
        .unwrap();

    let mut rows = table.create_read_stream(KeySet::All, None);
    let first = rows.next().await.unwrap().unwrap();
    assert_eq!(first, singer(1, "Ana"));
    assert_eq!(database.pool().stats().active_sessions, 1);

    drop(rows);
    assert_eq!(database.pool().stats().active_sessions, 0);
}

#[tokio::test]
async fn test_read_with_callback() {
    let (_, _, table) = singers().await;
    table.insert(vec![singer(7, "Gil")]).await.unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    table
        .read_with(Key::from(7i64), None, move |result| {
            let _ = tx.send(result);
        })
        .await
        .unwrap();

    assert_eq!(rx.await.unwrap().unwrap(), vec![singer(7, "Gil")]);
}

#[tokio::test]
async fn test_closed_database_rejects_requests() {
    let (_, database, table) = singers().await;
    database.close().await;

    let err = table.insert(vec![singer(1, "Ana")]).await.unwrap_err();
    assert!(matches!(err, ClientError::PoolClosed));
}

#[tokio::test]
async fn test_open_creates_min_sessions() {
    let transport = Arc::new(MemoryTransport::default());
    let config = ClientConfig::builder()
        .project("acme")
        .instance("test")
        .database("music")
        .min_sessions(2)
        .max_sessions(2)
        .build();

    let database = DatabaseHandle::open(&config, transport.clone()).await.unwrap();
    assert_eq!(database.pool().size(), 2);

    let table = database.table("Singers");
    table.create(SINGERS).await.unwrap();
    table.insert(vec![singer(1, "Ana")]).await.unwrap();
    assert_eq!(table.read(KeySet::All, None).await.unwrap().len(), 1);

    let creates = transport
        .requests()
        .into_iter()
        .filter(|r| matches!(r, RpcRequest::CreateSession { .. }))
        .count();
    assert_eq!(creates, 2);
}
