//! Request invokers that borrow a pooled session per call.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use super::SessionPool;
use crate::error::ClientResult;
use crate::transport::{
    RowStream, RpcRequest, RpcResponse, StreamingRequest, Transport, UnaryRequest,
};

/// Unary invoker. Holds a session only for the duration of one call.
#[derive(Clone)]
pub struct PooledRequest {
    pool: Arc<SessionPool>,
    transport: Arc<dyn Transport>,
}

impl PooledRequest {
    /// Creates an invoker over a pool and its transport.
    pub fn new(pool: Arc<SessionPool>, transport: Arc<dyn Transport>) -> Self {
        Self { pool, transport }
    }
}

#[async_trait]
impl UnaryRequest for PooledRequest {
    async fn request(&self, request: RpcRequest) -> ClientResult<RpcResponse> {
        if !request.needs_session() {
            return self.transport.call(request).await;
        }

        let session = self.pool.acquire().await?;
        tracing::debug!("Running {} on {}", request.method(), session.name());
        let request = request.with_session(session.name());
        self.transport.call(request).await
    }
}

/// Streaming invoker. Holds a session until the returned stream is dropped.
#[derive(Clone)]
pub struct PooledStreamingRequest {
    pool: Arc<SessionPool>,
    transport: Arc<dyn Transport>,
}

impl PooledStreamingRequest {
    /// Creates an invoker over a pool and its transport.
    pub fn new(pool: Arc<SessionPool>, transport: Arc<dyn Transport>) -> Self {
        Self { pool, transport }
    }
}

impl StreamingRequest for PooledStreamingRequest {
    fn request_stream(&self, request: RpcRequest) -> RowStream {
        let transport = Arc::clone(&self.transport);

        if !request.needs_session() {
            return transport.stream(request);
        }

        let pool = Arc::clone(&self.pool);
        let rows = stream::once(async move { pool.acquire().await }).flat_map(
            move |acquired| -> RowStream {
                match acquired {
                    Ok(session) => {
                        tracing::debug!("Streaming {} on {}", request.method(), session.name());
                        let rows = transport.stream(request.clone().with_session(session.name()));
                        // The session goes back to the pool when the stream is dropped.
                        Box::pin(rows.map(move |row| {
                            let _held = &session;
                            row
                        }))
                    }
                    Err(e) => Box::pin(stream::once(async move { Err(e) })),
                }
            },
        );

        Box::pin(rows)
    }
}
