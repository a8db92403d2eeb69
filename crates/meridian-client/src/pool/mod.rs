//! Session pool for a single database.
//!
//! Server sessions are created lazily, reused across requests, and
//! recycled once they exceed their idle timeout or lifetime. A semaphore caps
//! the number of sessions checked out at once.

mod invoker;

pub use invoker::{PooledRequest, PooledStreamingRequest};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{ClientError, ClientResult};
use crate::transport::{RpcRequest, RpcResponse, Transport};

/// Session pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum number of sessions to create up front.
    pub min_sessions: usize,
    /// Maximum number of sessions checked out at once.
    pub max_sessions: usize,
    /// How long to wait for a session.
    pub acquire_timeout: Duration,
    /// How long a session can be idle before being discarded.
    pub idle_timeout: Duration,
    /// Maximum lifetime of a session.
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_sessions: 0,
            max_sessions: 100,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(30 * 60),
            max_lifetime: Duration::from_secs(60 * 60),
        }
    }
}

impl PoolConfig {
    /// Creates a new pool configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum sessions.
    pub fn min_sessions(mut self, min: usize) -> Self {
        self.min_sessions = min;
        self
    }

    /// Sets the maximum sessions.
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Sets the acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Sets the idle timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the max lifetime.
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ClientResult<()> {
        if self.min_sessions > self.max_sessions {
            return Err(ClientError::InvalidConfig(
                "min_sessions cannot be greater than max_sessions".to_string(),
            ));
        }
        if self.max_sessions == 0 {
            return Err(ClientError::InvalidConfig(
                "max_sessions must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// A server session held by the pool.
struct Session {
    /// Server-assigned session name.
    name: String,
    /// When the session was created.
    created_at: Instant,
    /// When the session was last used.
    last_used: Instant,
    /// Number of times this session has been checked out.
    use_count: u64,
}

impl Session {
    fn new(name: String) -> Self {
        let now = Instant::now();
        Self {
            name,
            created_at: now,
            last_used: now,
            use_count: 0,
        }
    }

    fn is_expired(&self, max_lifetime: Duration) -> bool {
        self.created_at.elapsed() > max_lifetime
    }

    fn is_idle(&self, idle_timeout: Duration) -> bool {
        self.last_used.elapsed() > idle_timeout
    }

    fn mark_used(&mut self) {
        self.last_used = Instant::now();
        self.use_count += 1;
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Total sessions created.
    pub sessions_created: u64,
    /// Total sessions discarded or deleted.
    pub sessions_deleted: u64,
    /// Total acquisitions.
    pub acquisitions: u64,
    /// Total releases.
    pub releases: u64,
    /// Acquisition timeouts.
    pub timeouts: u64,
    /// Current pool size.
    pub current_size: usize,
    /// Current idle sessions.
    pub idle_sessions: usize,
    /// Current checked-out sessions.
    pub active_sessions: usize,
}

struct PoolState {
    available: VecDeque<Session>,
    closed: bool,
}

/// A pool of sessions on one database.
pub struct SessionPool {
    /// Pool configuration.
    config: PoolConfig,
    /// Fully qualified database path sessions are opened on.
    database: String,
    /// Wire used for session management.
    transport: Arc<dyn Transport>,
    /// Idle sessions and closed flag.
    state: Mutex<PoolState>,
    /// Caps checked-out sessions.
    semaphore: Arc<Semaphore>,
    /// Statistics.
    stats: Mutex<PoolStats>,
    /// Live sessions, idle or checked out.
    current_size: AtomicUsize,
}

impl SessionPool {
    /// Creates a new session pool.
    pub fn new(
        config: PoolConfig,
        database: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> ClientResult<Arc<Self>> {
        config.validate()?;

        Ok(Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(config.max_sessions)),
            state: Mutex::new(PoolState {
                available: VecDeque::new(),
                closed: false,
            }),
            stats: Mutex::new(PoolStats::default()),
            current_size: AtomicUsize::new(0),
            database: database.into(),
            transport,
            config,
        }))
    }

    /// Creates the configured minimum number of sessions.
    pub async fn initialize(&self) -> ClientResult<()> {
        for _ in 0..self.config.min_sessions {
            let session = self.create_session().await?;
            self.state.lock().available.push_back(session);
        }
        tracing::info!(
            "Session pool for {} initialized with {} session(s)",
            self.database,
            self.config.min_sessions
        );
        Ok(())
    }

    /// Checks out a session, waiting up to the acquire timeout.
    pub async fn acquire(self: &Arc<Self>) -> ClientResult<PooledSession> {
        if self.is_closed() {
            return Err(ClientError::PoolClosed);
        }

        let permit = match tokio::time::timeout(
            self.config.acquire_timeout,
            self.semaphore.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(ClientError::PoolClosed),
            Err(_) => {
                self.stats.lock().timeouts += 1;
                tracing::warn!(
                    "Timed out after {:?} waiting for a session on {}",
                    self.config.acquire_timeout,
                    self.database
                );
                return Err(ClientError::PoolTimeout(
                    self.config.acquire_timeout.as_millis() as u64,
                ));
            }
        };

        let session = self.get_or_create_session().await?;
        Ok(self.check_out(session, permit))
    }

    /// Checks out an idle session without waiting or creating one.
    pub fn try_acquire(self: &Arc<Self>) -> ClientResult<Option<PooledSession>> {
        if self.is_closed() {
            return Err(ClientError::PoolClosed);
        }

        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return Ok(None),
        };

        let (session, stale) = {
            let mut state = self.state.lock();
            self.take_valid_session(&mut state)
        };
        for session in stale {
            self.spawn_delete(session);
        }

        Ok(session.map(|session| self.check_out(session, permit)))
    }

    /// Returns pool statistics.
    pub fn stats(&self) -> PoolStats {
        let mut stats = self.stats.lock().clone();
        stats.current_size = self.size();
        stats.idle_sessions = self.available();
        stats
    }

    /// Returns the number of live sessions.
    pub fn size(&self) -> usize {
        self.current_size.load(Ordering::Relaxed)
    }

    /// Returns the number of idle sessions.
    pub fn available(&self) -> usize {
        self.state.lock().available.len()
    }

    /// Returns the database path sessions are opened on.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns true if the pool is closed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Closes the pool and deletes idle sessions.
    ///
    /// Checked-out sessions are discarded when they come back.
    pub async fn close(&self) {
        let sessions = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.available)
        };
        self.semaphore.close();

        let count = sessions.len();
        for session in sessions {
            self.delete_session(session).await;
        }

        tracing::info!(
            "Session pool for {} closed, deleted {} idle session(s)",
            self.database,
            count
        );
    }

    // =========================================================================
    // Internal Methods
    // =========================================================================

    fn check_out(
        self: &Arc<Self>,
        session: Session,
        permit: OwnedSemaphorePermit,
    ) -> PooledSession {
        {
            let mut stats = self.stats.lock();
            stats.acquisitions += 1;
            stats.active_sessions += 1;
        }
        tracing::debug!("Checked out session {}", session.name);

        PooledSession {
            pool: Arc::clone(self),
            session: Some(session),
            _permit: permit,
        }
    }

    fn release(&self, mut session: Session) {
        session.mark_used();

        let discarded = {
            let mut state = self.state.lock();
            if state.closed || session.is_expired(self.config.max_lifetime) {
                Some(session)
            } else {
                state.available.push_back(session);
                None
            }
        };

        if let Some(session) = discarded {
            tracing::debug!("Discarding released session {}", session.name);
            self.spawn_delete(session);
        }

        let mut stats = self.stats.lock();
        stats.releases += 1;
        stats.active_sessions = stats.active_sessions.saturating_sub(1);
    }

    async fn get_or_create_session(&self) -> ClientResult<Session> {
        let (reused, stale) = {
            let mut state = self.state.lock();
            self.take_valid_session(&mut state)
        };

        for session in stale {
            self.delete_session(session).await;
        }

        match reused {
            Some(session) => Ok(session),
            None => self.create_session().await,
        }
    }

    /// Pops the first usable idle session. Stale sessions popped on the way
    /// are returned for deletion.
    fn take_valid_session(&self, state: &mut PoolState) -> (Option<Session>, Vec<Session>) {
        let mut stale = Vec::new();
        while let Some(session) = state.available.pop_front() {
            if session.is_expired(self.config.max_lifetime)
                || session.is_idle(self.config.idle_timeout)
            {
                tracing::warn!("Discarding stale session {}", session.name);
                stale.push(session);
                continue;
            }
            return (Some(session), stale);
        }
        (None, stale)
    }

    async fn create_session(&self) -> ClientResult<Session> {
        let request = RpcRequest::CreateSession {
            database: self.database.clone(),
        };

        let name = match self.transport.call(request).await? {
            RpcResponse::Session(name) => name,
            other => {
                return Err(ClientError::UnexpectedResponse {
                    expected: "session",
                    actual: other.kind(),
                })
            }
        };

        self.current_size.fetch_add(1, Ordering::Relaxed);
        self.stats.lock().sessions_created += 1;
        tracing::debug!("Created session {}", name);

        Ok(Session::new(name))
    }

    /// Deletes a session on the server and drops it from the pool's counts.
    async fn delete_session(&self, session: Session) {
        let request = RpcRequest::DeleteSession {
            session: session.name.clone(),
        };
        if let Err(e) = self.transport.call(request).await {
            tracing::warn!("Failed to delete session {}: {}", session.name, e);
        }
        self.discard_session(session);
    }

    /// Deletes a session from a synchronous context on a spawned task.
    ///
    /// Without a runtime the delete is skipped and the server reclaims the
    /// session once it goes idle.
    fn spawn_delete(&self, session: Session) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let transport = Arc::clone(&self.transport);
                let name = session.name.clone();
                handle.spawn(async move {
                    let request = RpcRequest::DeleteSession {
                        session: name.clone(),
                    };
                    if let Err(e) = transport.call(request).await {
                        tracing::warn!("Failed to delete session {}: {}", name, e);
                    }
                });
            }
            Err(_) => {
                tracing::warn!("No runtime to delete session {}", session.name);
            }
        }
        self.discard_session(session);
    }

    fn discard_session(&self, _session: Session) {
        self.current_size.fetch_sub(1, Ordering::Relaxed);
        self.stats.lock().sessions_deleted += 1;
    }
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("database", &self.database)
            .field("max_sessions", &self.config.max_sessions)
            .field("current_size", &self.size())
            .field("available", &self.available())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A session checked out of the pool.
///
/// When dropped, the session is returned to the pool.
pub struct PooledSession {
    /// Owning pool.
    pool: Arc<SessionPool>,
    /// The session.
    session: Option<Session>,
    /// Semaphore permit.
    _permit: OwnedSemaphorePermit,
}

impl PooledSession {
    /// Returns the server-assigned session name.
    pub fn name(&self) -> &str {
        self.session.as_ref().map(|s| s.name.as_str()).unwrap_or("")
    }

    /// Returns how long the session has been alive.
    pub fn age(&self) -> Duration {
        self.session
            .as_ref()
            .map(|s| s.created_at.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Returns how many times this session has been used before.
    pub fn use_count(&self) -> u64 {
        self.session.as_ref().map(|s| s.use_count).unwrap_or(0)
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(session);
        }
    }
}

impl std::fmt::Debug for PooledSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession")
            .field("name", &self.name())
            .field("age", &self.age())
            .field("use_count", &self.use_count())
            .finish()
    }
}
