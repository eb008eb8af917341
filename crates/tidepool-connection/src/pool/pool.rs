//! Connection pool implementation

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tidepool_core::{Connection, Result, TidepoolError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::config::PoolConfig;
use super::idle::IdleConnection;
use super::stats::PoolStats;

/// Factory trait for creating new connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Open a new server session
    async fn create(&self) -> Result<Arc<dyn Connection>>;
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }
}

/// Receives checkout and checkin notifications from a pool.
///
/// Callbacks run synchronously, in the order the pool performs the
/// operations, while the pool holds its idle-queue lock. Implementations
/// must not call back into the pool.
pub trait PoolObserver: Send + Sync {
    /// A connection left the idle queue (checked out, or discarded because
    /// it was found closed). Also called for freshly created connections.
    fn on_acquire(&self, session_id: u64);

    /// A connection was returned to the idle queue.
    fn on_release(&self, connection: IdleConnection);
}

struct IdleEntry {
    connection: Arc<dyn Connection>,
}

pub(super) struct PoolShared {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    /// Idle sessions; the back is the most recently returned
    idle: Mutex<VecDeque<IdleEntry>>,
    /// Bounds the number of checked-out sessions
    semaphore: Arc<Semaphore>,
    active_count: AtomicUsize,
    waiting_count: AtomicUsize,
    observers: RwLock<Vec<Arc<dyn PoolObserver>>>,
    closed: AtomicBool,
}

impl PoolShared {
    /// Pop the most recently used idle session, skipping closed ones.
    fn take_idle(&self) -> Option<Arc<dyn Connection>> {
        let observers = self.observers.read();
        let mut idle = self.idle.lock();
        while let Some(entry) = idle.pop_back() {
            let session_id = entry.connection.session_id();
            for observer in observers.iter() {
                observer.on_acquire(session_id);
            }
            if entry.connection.is_closed() {
                tracing::debug!(session_id, "discarding closed idle connection");
                continue;
            }
            return Some(entry.connection);
        }
        None
    }

    fn notify_acquire(&self, session_id: u64) {
        for observer in self.observers.read().iter() {
            observer.on_acquire(session_id);
        }
    }

    /// Put a checked-out session back on the idle queue.
    ///
    /// Hands the connection back when the pool is closed so the caller can
    /// shut it down.
    fn check_in(self: &Arc<Self>, connection: Arc<dyn Connection>) -> Option<Arc<dyn Connection>> {
        self.active_count.fetch_sub(1, Ordering::SeqCst);

        if connection.is_closed() {
            tracing::debug!(
                session_id = connection.session_id(),
                "released connection is closed, not returning it to the pool"
            );
            return None;
        }
        if self.closed.load(Ordering::SeqCst) {
            return Some(connection);
        }

        let session_id = connection.session_id();
        let handle = IdleConnection::new(session_id, Instant::now(), Arc::downgrade(self));

        let observers = self.observers.read();
        let mut idle = self.idle.lock();
        idle.push_back(IdleEntry { connection });
        for observer in observers.iter() {
            observer.on_release(handle.clone());
        }
        None
    }

    /// Remove one idle session from the queue and close it.
    ///
    /// Returns `Ok(false)` when the session is no longer idle.
    pub(super) async fn evict(&self, session_id: u64) -> Result<bool> {
        let entry = {
            let mut idle = self.idle.lock();
            idle.iter()
                .position(|entry| entry.connection.session_id() == session_id)
                .and_then(|pos| idle.remove(pos))
        };

        match entry {
            Some(entry) => {
                tracing::debug!(session_id, "evicting idle connection");
                entry.connection.close().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// A bounded pool of server sessions
///
/// At most `max_size` sessions are checked out at once. Returned sessions
/// are reused most-recently-used first, which leaves the least recently
/// used ones to age out on the server.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Create a new connection pool with the given configuration and factory
    pub fn new<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_size()));
        Self {
            shared: Arc::new(PoolShared {
                config,
                factory: Arc::new(factory),
                idle: Mutex::new(VecDeque::new()),
                semaphore,
                active_count: AtomicUsize::new(0),
                waiting_count: AtomicUsize::new(0),
                observers: RwLock::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Register an observer for checkout/checkin notifications
    pub fn subscribe(&self, observer: Arc<dyn PoolObserver>) {
        self.shared.observers.write().push(observer);
    }

    /// Check a connection out of the pool
    ///
    /// This will:
    /// 1. Wait for a checkout slot (bounded by `max_size`)
    /// 2. Reuse the most recently returned idle connection, if any
    /// 3. Otherwise create a new connection through the factory
    ///
    /// Returns `TidepoolError::Timeout` if the acquire timeout is exceeded.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        if self.is_closed() {
            return Err(TidepoolError::PoolClosed);
        }

        self.shared.waiting_count.fetch_add(1, Ordering::SeqCst);

        let result = tokio::time::timeout(self.shared.config.acquire_timeout(), async {
            let permit = self
                .shared
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| TidepoolError::PoolClosed)?;

            let connection = match self.shared.take_idle() {
                Some(conn) => conn,
                None => {
                    let conn = self.shared.factory.create().await?;
                    tracing::debug!(session_id = conn.session_id(), "created new connection");
                    self.shared.notify_acquire(conn.session_id());
                    conn
                }
            };

            Ok::<_, TidepoolError>((permit, connection))
        })
        .await;

        self.shared.waiting_count.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(Ok((permit, connection))) => {
                self.shared.active_count.fetch_add(1, Ordering::SeqCst);
                Ok(PooledConnection {
                    session_id: connection.session_id(),
                    connection: Some(connection),
                    shared: self.shared.clone(),
                    discard_on_drop: false,
                    _permit: permit,
                })
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(TidepoolError::Timeout(format!(
                "timed out waiting for a connection (timeout: {:?})",
                self.shared.config.acquire_timeout()
            ))),
        }
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let idle = self.shared.idle.lock().len();
        let active = self.shared.active_count.load(Ordering::SeqCst);
        let waiting = self.shared.waiting_count.load(Ordering::SeqCst);
        PoolStats::new(idle, active, waiting)
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Shut the pool down and close every idle connection.
    ///
    /// Checked-out connections are closed when they are released. Every idle
    /// connection is attempted; the first close error is returned.
    pub async fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.semaphore.close();

        let drained: Vec<IdleEntry> = self.shared.idle.lock().drain(..).collect();
        tracing::debug!(idle = drained.len(), "closing connection pool");

        let mut first_error = None;
        for entry in drained {
            if let Err(err) = entry.connection.close().await {
                tracing::warn!(
                    session_id = entry.connection.session_id(),
                    error = %err,
                    "failed to close idle connection"
                );
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A connection checked out of the pool
///
/// `release` returns it to the idle queue and `destroy` closes it for good.
/// Both consume the handle. Dropping the handle without either behaves like
/// `release`, unless it was marked to be discarded.
pub struct PooledConnection {
    session_id: u64,
    connection: Option<Arc<dyn Connection>>,
    shared: Arc<PoolShared>,
    discard_on_drop: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Server session id of the underlying connection
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Get the underlying connection as an Arc
    pub fn inner(&self) -> &Arc<dyn Connection> {
        self.connection.as_ref().expect("connection taken")
    }

    /// When set, dropping this handle drops the session instead of pooling it.
    ///
    /// Used while a transaction is open so a forgotten transaction never
    /// leaks its uncommitted state into the next checkout.
    pub(crate) fn set_discard_on_drop(&mut self, discard: bool) {
        self.discard_on_drop = discard;
    }

    /// Return the connection to the pool
    pub async fn release(mut self) -> Result<()> {
        if let Some(conn) = self.connection.take()
            && let Some(unpooled) = self.shared.check_in(conn)
        {
            unpooled.close().await?;
        }
        Ok(())
    }

    /// Close the connection; it never returns to the pool
    pub async fn destroy(mut self) -> Result<()> {
        if let Some(conn) = self.connection.take() {
            self.shared.active_count.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(session_id = self.session_id, "destroying connection");
            conn.close().await?;
        }
        Ok(())
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.inner().as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            if self.discard_on_drop {
                self.shared.active_count.fetch_sub(1, Ordering::SeqCst);
                tracing::warn!(
                    session_id = self.session_id,
                    "dropping connection without returning it to the pool"
                );
            } else {
                // A closed pool hands the session back; dropping it is all we can do here.
                let _ = self.shared.check_in(conn);
            }
        }
    }
}
