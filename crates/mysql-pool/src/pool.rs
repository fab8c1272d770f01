//! Connection pool implementation.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use mysql_client::{Config, Connection, IsolationLevel, ResultSet, Transaction};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::lifecycle::{ConnectionInfo, ConnectionLifecycle};

/// A connection pool for MySQL.
///
/// The pool hands out connections up to `max_connections` at a time,
/// reuses idle ones, and retires connections that sat idle too long or
/// outlived `max_lifetime`. `Pool` is cheap to clone.
///
/// ```rust,ignore
/// use mysql_driver_pool::Pool;
///
/// let pool = Pool::builder()
///     .client(Config::new().host("localhost").user("app"))
///     .max_connections(20)
///     .build()
///     .await?;
///
/// let mut rows = pool.query("SELECT id FROM users").await?;
/// while let Some(row) = rows.next_row().await? {
///     // ...
/// }
/// // The connection goes back to the pool when `rows` is dropped.
/// ```
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    client: Config,
    config: PoolConfig,
    idle: Mutex<VecDeque<PoolEntry>>,
    /// One permit per checked-out connection.
    semaphore: Arc<Semaphore>,
    total: AtomicU32,
    closed: AtomicBool,
    next_id: AtomicU64,
    created: AtomicU64,
    retired: AtomicU64,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

/// A connection plus the pool's bookkeeping about it.
struct PoolEntry {
    conn: Connection,
    info: ConnectionInfo,
}

impl Pool {
    /// Create a pool and open `min_connections` connections.
    pub async fn new(client: Config, config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        client.validate()?;

        let inner = Arc::new(PoolInner {
            semaphore: Arc::new(Semaphore::new(config.max_connections as usize)),
            client,
            idle: Mutex::new(VecDeque::with_capacity(config.max_connections as usize)),
            total: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            created: AtomicU64::new(0),
            retired: AtomicU64::new(0),
            reaper: Mutex::new(None),
            config,
        });

        for _ in 0..inner.config.min_connections {
            let entry = inner.open().await?;
            inner.idle.lock().push_back(entry);
        }

        if inner.config.needs_reaper() {
            let handle = tokio::spawn(reap(Arc::downgrade(&inner)));
            *inner.reaper.lock() = Some(handle);
        }

        tracing::debug!(
            min = inner.config.min_connections,
            max = inner.config.max_connections,
            "connection pool created"
        );
        Ok(Self { inner })
    }

    /// Create a new pool builder.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Get a connection from the pool.
    ///
    /// Takes an idle connection, opens a new one when the pool is below
    /// `max_connections`, or waits up to `connection_timeout` for one to be
    /// returned.
    pub async fn acquire(&self) -> Result<PooledConnection, PoolError> {
        if self.is_closed() {
            return Err(PoolError::PoolClosed);
        }
        tracing::trace!("acquiring connection from pool");

        let timeout = self.inner.config.connection_timeout;
        let permit = tokio::time::timeout(timeout, Arc::clone(&self.inner.semaphore).acquire_owned())
            .await
            .map_err(|_| PoolError::AcquisitionTimeout(timeout))?
            .map_err(|_| PoolError::PoolClosed)?;

        let mut entry = loop {
            let candidate = self.inner.idle.lock().pop_back();
            let Some(entry) = candidate else {
                break self.inner.open().await?;
            };
            if !entry.conn.is_valid() || entry.info.is_expired(self.inner.config.max_lifetime) {
                self.inner.retire(entry, "expired or closed");
                continue;
            }
            if self.inner.config.test_on_checkout {
                if let Err(err) = entry.conn.health_check().await {
                    tracing::debug!(id = entry.info.id, error = %err, "discarding unhealthy connection");
                    self.inner.retire(entry, "failed health check");
                    continue;
                }
            }
            break entry;
        };

        entry.info.mark_checkout();
        Ok(PooledConnection {
            conn: entry.conn,
            info: entry.info,
            pool: Arc::clone(&self.inner),
            permit: Some(permit),
            detached: false,
        })
    }

    /// Run a text query on a pooled connection.
    ///
    /// The connection returns to the pool when the result set is dropped,
    /// whether or not its rows were read.
    pub async fn query(&self, sql: &str) -> Result<PooledResultSet, PoolError> {
        let conn = self.acquire().await?;
        let result = conn.query(sql).await?;
        Ok(PooledResultSet { result, conn })
    }

    /// Start a transaction on a pooled connection.
    pub async fn begin(&self, isolation_level: IsolationLevel) -> Result<PooledTransaction, PoolError> {
        let conn = self.acquire().await?;
        let tx = conn.begin(isolation_level).await?;
        Ok(PooledTransaction { tx, conn })
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let available = self.inner.idle.lock().len() as u32;
        let total = self.inner.total.load(Ordering::Acquire);
        PoolStatus {
            available,
            in_use: total.saturating_sub(available),
            total,
            max: self.inner.config.max_connections,
            created: self.inner.created.load(Ordering::Relaxed),
            retired: self.inner.retired.load(Ordering::Relaxed),
        }
    }

    /// Close the pool.
    ///
    /// Idle connections are closed right away. Checked-out connections are
    /// closed when they come back, and `acquire` fails from now on.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.semaphore.close();
        if let Some(reaper) = self.inner.reaper.lock().take() {
            reaper.abort();
        }
        let idle: Vec<_> = self.inner.idle.lock().drain(..).collect();
        for entry in idle {
            self.inner.total.fetch_sub(1, Ordering::AcqRel);
            self.inner.retired.fetch_add(1, Ordering::Relaxed);
            if let Err(err) = entry.conn.close().await {
                tracing::debug!(id = entry.info.id, error = %err, "error closing pooled connection");
            }
        }
        tracing::info!("connection pool closed");
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("address", &self.inner.client.address())
            .field("status", &self.status())
            .finish()
    }
}

impl PoolInner {
    async fn open(&self) -> Result<PoolEntry, PoolError> {
        let conn = Connection::connect(self.client.clone()).await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::AcqRel);
        self.created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(id, "opened pooled connection");
        Ok(PoolEntry {
            conn,
            info: ConnectionInfo::new(id),
        })
    }

    /// Drop a connection for good. The last handle going away sends
    /// COM_QUIT.
    fn retire(&self, entry: PoolEntry, reason: &str) {
        tracing::debug!(id = entry.info.id, reason, "retiring pooled connection");
        self.total.fetch_sub(1, Ordering::AcqRel);
        self.retired.fetch_add(1, Ordering::Relaxed);
        drop(entry);
    }

    fn checkin(&self, mut entry: PoolEntry) {
        if self.closed.load(Ordering::Acquire) || !entry.conn.is_valid() {
            self.retire(entry, "pool closed or connection broken");
            return;
        }
        entry.info.mark_checkin();
        self.idle.lock().push_back(entry);
    }

    /// Evict idle and expired connections. Connections still draining a
    /// dropped result are left alone.
    fn reap(&self) {
        let min = self.config.min_connections;
        let mut evicted = Vec::new();
        {
            let mut idle = self.idle.lock();
            let mut kept = VecDeque::with_capacity(idle.len());
            // Oldest first, so the most recently used survive.
            while let Some(entry) = idle.pop_front() {
                let remaining = self
                    .total
                    .load(Ordering::Acquire)
                    .saturating_sub(evicted.len() as u32);
                let expired = entry.info.is_expired(self.config.max_lifetime);
                let idle_too_long =
                    entry.info.is_idle_expired(self.config.idle_timeout) && remaining > min;
                if entry.conn.is_idle() && (expired || idle_too_long || !entry.conn.is_valid()) {
                    evicted.push(entry);
                } else {
                    kept.push_back(entry);
                }
            }
            *idle = kept;
        }
        for entry in evicted {
            self.retire(entry, "reaped");
        }
    }
}

async fn reap(pool: Weak<PoolInner>) {
    let interval = match pool.upgrade() {
        Some(pool) => pool.config.reaper_interval,
        None => return,
    };
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(pool) = pool.upgrade() else {
            break;
        };
        if pool.closed.load(Ordering::Acquire) {
            break;
        }
        pool.reap();
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections currently in use.
    pub in_use: u32,
    /// Total number of connections.
    pub total: u32,
    /// Maximum allowed connections.
    pub max: u32,
    /// Connections opened over the pool's life.
    pub created: u64,
    /// Connections retired over the pool's life.
    pub retired: u64,
}

/// A connection retrieved from the pool.
///
/// Derefs to [`Connection`]. When dropped, the connection is returned to
/// the pool, after COM_RESET_CONNECTION when `reset_on_return` is set.
pub struct PooledConnection {
    conn: Connection,
    info: ConnectionInfo,
    pool: Arc<PoolInner>,
    permit: Option<OwnedSemaphorePermit>,
    detached: bool,
}

impl PooledConnection {
    /// The pool's id for this connection.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.info.id
    }

    /// How many times this connection has been checked out.
    #[must_use]
    pub fn checkout_count(&self) -> u64 {
        self.info.checkout_count
    }

    /// When the connection was opened.
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.info.created_at
    }

    /// Detach the connection from the pool.
    ///
    /// The pool forgets the connection and frees its slot.
    #[must_use]
    pub fn detach(mut self) -> Connection {
        self.detached = true;
        self.pool.total.fetch_sub(1, Ordering::AcqRel);
        self.conn.clone()
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.info.id)
            .field("checkout_count", &self.info.checkout_count)
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        let mut entry = PoolEntry {
            conn: self.conn.clone(),
            info: self.info.clone(),
        };
        let pool = Arc::clone(&self.pool);
        let permit = self.permit.take();
        tracing::trace!(id = entry.info.id, "returning connection to pool");

        if !pool.config.reset_on_return || !entry.conn.is_valid() {
            pool.checkin(entry);
            drop(permit);
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                // The permit is held until the reset finishes so the slot
                // cannot be handed out in between.
                runtime.spawn(async move {
                    match entry.conn.reset().await {
                        Ok(()) => pool.checkin(entry),
                        Err(err) => {
                            tracing::debug!(id = entry.info.id, error = %err, "reset on return failed");
                            pool.retire(entry, "reset failed");
                        }
                    }
                    drop(permit);
                });
            }
            Err(_) => {
                pool.retire(entry, "no runtime to reset on");
                drop(permit);
            }
        }
    }
}

/// A result set whose connection returns to the pool on drop.
///
/// Derefs to [`ResultSet`], so rows are read with `next_row` as usual.
/// Dropping it with rows unread is fine: the connection discards them in
/// the background before running the next command.
pub struct PooledResultSet {
    result: ResultSet,
    conn: PooledConnection,
}

impl PooledResultSet {
    /// Move on to the next result set, keeping the connection.
    pub async fn next_result(mut self) -> Result<Option<PooledResultSet>, PoolError> {
        let next = self.result.next_result().await?;
        Ok(next.map(|result| PooledResultSet {
            result,
            conn: self.conn,
        }))
    }

    /// The connection the result is streaming on.
    #[must_use]
    pub fn connection(&self) -> &PooledConnection {
        &self.conn
    }
}

impl Deref for PooledResultSet {
    type Target = ResultSet;

    fn deref(&self) -> &ResultSet {
        &self.result
    }
}

impl DerefMut for PooledResultSet {
    fn deref_mut(&mut self) -> &mut ResultSet {
        &mut self.result
    }
}

impl std::fmt::Debug for PooledResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledResultSet")
            .field("connection", &self.conn.id())
            .finish_non_exhaustive()
    }
}

/// A transaction on a pooled connection.
///
/// Derefs to [`Transaction`]. Dropping it unfinished rolls back, then the
/// connection returns to the pool.
pub struct PooledTransaction {
    // Dropped first, so the ROLLBACK is queued before the connection goes
    // back.
    tx: Transaction,
    conn: PooledConnection,
}

impl PooledTransaction {
    /// The pooled connection the transaction runs on.
    #[must_use]
    pub fn connection(&self) -> &PooledConnection {
        &self.conn
    }
}

impl Deref for PooledTransaction {
    type Target = Transaction;

    fn deref(&self) -> &Transaction {
        &self.tx
    }
}

impl DerefMut for PooledTransaction {
    fn deref_mut(&mut self) -> &mut Transaction {
        &mut self.tx
    }
}

impl std::fmt::Debug for PooledTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledTransaction")
            .field("connection", &self.conn.id())
            .field("finished", &self.tx.is_finished())
            .finish()
    }
}

/// Builder for [`Pool`].
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct PoolBuilder {
    client: Config,
    config: PoolConfig,
}

impl PoolBuilder {
    /// Create a builder with default client and pool settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection settings for every pooled connection.
    pub fn client(mut self, client: Config) -> Self {
        self.client = client;
        self
    }

    /// Replace all pool settings.
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the minimum number of connections.
    pub fn min_connections(mut self, count: u32) -> Self {
        self.config.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, count: u32) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the connection acquisition timeout.
    pub fn connection_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Set the idle connection timeout.
    pub fn idle_timeout(mut self, timeout: impl Into<Option<std::time::Duration>>) -> Self {
        self.config.idle_timeout = timeout.into();
        self
    }

    /// Set the maximum connection lifetime.
    pub fn max_lifetime(mut self, lifetime: impl Into<Option<std::time::Duration>>) -> Self {
        self.config.max_lifetime = lifetime.into();
        self
    }

    /// Enable or disable pinging connections on checkout.
    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.config.test_on_checkout = enabled;
        self
    }

    /// Enable or disable COM_RESET_CONNECTION on return.
    pub fn reset_on_return(mut self, enabled: bool) -> Self {
        self.config.reset_on_return = enabled;
        self
    }

    /// Set how often the reaper runs.
    pub fn reaper_interval(mut self, interval: std::time::Duration) -> Self {
        self.config.reaper_interval = interval;
        self
    }

    /// Build the pool.
    pub async fn build(self) -> Result<Pool, PoolError> {
        Pool::new(self.client, self.config).await
    }
}
