//! The bounded connection pool.

use std::sync::atomic::{AtomicU64, Ordering};

use ldap_tls::Endpoint;
use tokio::sync::{Mutex, Notify};

use crate::auth::AuthenticationInfo;
use crate::config::PoolConfig;
use crate::connection::{BoundConnection, Connector};
use crate::error::DirectoryError;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Snapshot of pool occupancy, for monitoring and backpressure decisions.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Connections sitting in the free list.
    pub free: u32,
    /// Connections owned by the pool, free or on loan.
    pub total: u32,
    /// Hard ceiling on `total`.
    pub max: u32,
}

#[derive(Default)]
struct PoolState {
    master: Option<BoundConnection>,
    free: Vec<BoundConnection>,
    total: u32,
    closed: bool,
}

impl PoolState {
    fn master_alive(&self) -> bool {
        self.master.as_ref().is_some_and(BoundConnection::is_connected)
    }
}

/// Bounded pool of authenticated directory connections.
///
/// One pool instance is shared by all tasks of a subsystem. Bookkeeping is
/// serialized under a single mutex; connect, clone and bind round-trips
/// happen while the lock is held, so a slow reconnect by one task stalls
/// other acquirers. That coarse-grained design is deliberate: the
/// bookkeeping itself is O(1), and the directory is the scarce resource,
/// not the lock.
///
/// Acquire and release form a strict borrow/return protocol:
///
/// ```rust,ignore
/// let conn = pool.get_conn().await?;
/// // ... directory operations ...
/// pool.return_conn(conn).await;
/// ```
pub struct ConnectionPool {
    id: u64,
    config: PoolConfig,
    endpoint: Endpoint,
    auth: AuthenticationInfo,
    connector: Connector,
    state: Mutex<PoolState>,
    available: Notify,
}

impl ConnectionPool {
    /// Create and initialize a pool.
    ///
    /// The configuration is validated before any network activity. The
    /// master connection is then established: failure is fatal when
    /// `error_if_down` is set, and otherwise leaves the master absent for
    /// the first acquire to retry. Finally the free list is topped up to
    /// `min_conns`.
    pub async fn init(
        config: PoolConfig,
        endpoint: Endpoint,
        auth: AuthenticationInfo,
        connector: Connector,
    ) -> Result<Self, DirectoryError> {
        config.validate()?;
        let pool = Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            config,
            endpoint,
            auth,
            connector,
            state: Mutex::new(PoolState::default()),
            available: Notify::new(),
        };
        {
            let mut state = pool.state.lock().await;
            match pool.connector.open(&pool.endpoint, &pool.auth).await {
                Ok(mut conn) => {
                    conn.set_pool_tag(pool.id);
                    state.master = Some(conn);
                }
                Err(err) if !pool.config.error_if_down => {
                    tracing::warn!(
                        endpoint = %pool.endpoint,
                        error = %err,
                        "directory unreachable at init, deferring master connection"
                    );
                }
                Err(err) => return Err(err),
            }
            pool.fill_minimum(&mut state).await?;
            tracing::debug!(
                endpoint = %pool.endpoint,
                total = state.total,
                free = state.free.len(),
                "connection pool initialized"
            );
        }
        Ok(pool)
    }

    /// Acquire a connection, suspending until one is available.
    ///
    /// No timeout exists at this layer; cancellation is the caller's
    /// responsibility and a cancelled wait leaves the pool accounting
    /// intact.
    pub async fn get_conn(&self) -> Result<BoundConnection, DirectoryError> {
        loop {
            let mut state = self.state.lock().await;
            if let Some(conn) = self.acquire(&mut state).await? {
                return Ok(conn);
            }
            // Register with the notifier before releasing the lock; a
            // Notify stores at most one permit, so a waiter that is not yet
            // registered when two releases land back to back would miss the
            // second one and sleep past an available connection.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            drop(state);
            notified.await;
        }
    }

    /// Acquire a connection without waiting.
    ///
    /// `Ok(None)` means the pool is at capacity with nothing free. That is
    /// a deliberate non-blocking signal, not an error.
    pub async fn try_get_conn(&self) -> Result<Option<BoundConnection>, DirectoryError> {
        let mut state = self.state.lock().await;
        self.acquire(&mut state).await
    }

    /// One acquisition attempt under the state lock. `Ok(None)` means the
    /// pool is at capacity with nothing free; waiting is the caller's.
    async fn acquire(
        &self,
        state: &mut PoolState,
    ) -> Result<Option<BoundConnection>, DirectoryError> {
        if state.closed {
            return Err(DirectoryError::PoolClosed);
        }

        // The pool cannot function without its cloning template; a master
        // failure here is always an error, regardless of how init was
        // configured.
        self.ensure_master(state).await?;

        if state.free.is_empty() && state.total < self.config.max_conns {
            let conn = self.new_replica(state).await?;
            state.free.push(conn);
            state.total += 1;
            tracing::trace!(total = state.total, "pool grew by one connection");
        }

        let Some(mut conn) = state.free.pop() else {
            return Ok(None);
        };
        if !conn.is_connected() {
            // Master is alive (ensure_master above), so one repair attempt
            // is made; a second failure propagates.
            conn = match self.repair(state, conn).await {
                Ok(repaired) => repaired,
                Err(err) => {
                    state.total -= 1;
                    return Err(err);
                }
            };
        }
        // A borrower must never observe a setting left behind by the
        // previous borrower.
        conn.set_size_limit(self.config.max_results);
        self.check_accounting(state);
        Ok(Some(conn))
    }

    /// Return a loaned connection to the pool.
    ///
    /// A connection that does not belong to this pool is logged and
    /// dropped; the releasing task is never blocked or failed.
    pub async fn return_conn(&self, mut conn: BoundConnection) {
        let mut state = self.state.lock().await;
        if conn.pool_tag() != Some(self.id) {
            tracing::warn!(pool = self.id, "dropping returned connection owned by another pool");
            conn.close();
            return;
        }
        if state.closed {
            conn.close();
            return;
        }
        state.free.push(conn);
        self.check_accounting(&state);
        drop(state);
        // One release frees exactly one slot; wake a single waiter.
        self.available.notify_one();
    }

    /// Connections owned by the pool, free or on loan.
    pub async fn total_conns(&self) -> u32 {
        self.state.lock().await.total
    }

    /// Connections sitting in the free list.
    pub async fn free_conns(&self) -> u32 {
        self.state.lock().await.free.len() as u32
    }

    /// Hard ceiling on the number of connections.
    #[must_use]
    pub fn max_conns(&self) -> u32 {
        self.config.max_conns
    }

    /// Occupancy snapshot.
    pub async fn status(&self) -> PoolStatus {
        let state = self.state.lock().await;
        PoolStatus {
            free: state.free.len() as u32,
            total: state.total,
            max: self.config.max_conns,
        }
    }

    /// The endpoint this pool connects to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The identity this pool binds with.
    #[must_use]
    pub fn auth_info(&self) -> &AuthenticationInfo {
        &self.auth
    }

    /// The pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Whether the pool has been shut down.
    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Disconnect every pooled connection and the master, leaving an empty
    /// but reusable pool.
    ///
    /// Legal only with no outstanding loans; otherwise fails with
    /// [`DirectoryError::IllegalReset`] and changes nothing. Unbind
    /// failures during teardown are logged and the loop continues.
    pub async fn reset(&self) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(DirectoryError::PoolClosed);
        }
        let outstanding = state.total - state.free.len() as u32;
        if outstanding > 0 {
            return Err(DirectoryError::IllegalReset { outstanding });
        }
        for mut conn in std::mem::take(&mut state.free) {
            if let Err(err) = conn.disconnect().await {
                tracing::warn!(error = %err, "error disconnecting pooled connection during reset");
            }
        }
        state.total = 0;
        if let Some(mut master) = state.master.take() {
            if let Err(err) = master.disconnect().await {
                tracing::warn!(error = %err, "error disconnecting master connection during reset");
            }
        }
        self.auth.reset().await;
        tracing::debug!(endpoint = %self.endpoint, "connection pool reset");
        Ok(())
    }

    /// Force-close every connection and the master, outstanding loans
    /// included. Terminal: the pool refuses further acquires.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        for mut conn in std::mem::take(&mut state.free) {
            conn.close();
        }
        if let Some(mut master) = state.master.take() {
            master.close();
        }
        state.total = 0;
        drop(state);
        // Wake every blocked acquirer so it observes PoolClosed.
        self.available.notify_waiters();
        tracing::info!(endpoint = %self.endpoint, "connection pool shut down");
    }

    /// Re-establish the master connection if it is absent or dead.
    async fn ensure_master(&self, state: &mut PoolState) -> Result<(), DirectoryError> {
        if state.master_alive() {
            return Ok(());
        }
        tracing::debug!(endpoint = %self.endpoint, "(re)establishing master connection");
        let mut conn = self.connector.open(&self.endpoint, &self.auth).await?;
        conn.set_pool_tag(self.id);
        if let Some(mut old) = state.master.replace(conn) {
            old.close();
        }
        Ok(())
    }

    /// Top the free list up to `min_conns`, within the `max_conns` ceiling.
    ///
    /// Does nothing while the master is absent; the first acquire will
    /// bring it back and grow on demand.
    async fn fill_minimum(&self, state: &mut PoolState) -> Result<(), DirectoryError> {
        if !state.master_alive() {
            return Ok(());
        }
        while (state.free.len() as u32) < self.config.min_conns
            && state.total < self.config.max_conns
        {
            match self.new_replica(state).await {
                Ok(conn) => {
                    state.free.push(conn);
                    state.total += 1;
                }
                Err(err) if !self.config.error_if_down => {
                    tracing::warn!(error = %err, "stopping pool top-up early");
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Create one pool-owned connection: a clone of the master when
    /// cloning is enabled, a full connect-and-bind otherwise.
    async fn new_replica(&self, state: &PoolState) -> Result<BoundConnection, DirectoryError> {
        let mut conn = match (&state.master, self.config.do_cloning) {
            (Some(master), true) => {
                self.connector
                    .clone_from(&self.endpoint, &self.auth, master)
                    .await?
            }
            _ => self.connector.open(&self.endpoint, &self.auth).await?,
        };
        conn.set_pool_tag(self.id);
        Ok(conn)
    }

    /// Replace a pooled connection whose transport went stale. One attempt
    /// only; the caller adjusts accounting if it fails.
    async fn repair(
        &self,
        state: &PoolState,
        mut stale: BoundConnection,
    ) -> Result<BoundConnection, DirectoryError> {
        tracing::debug!(endpoint = %self.endpoint, "repairing stale pooled connection");
        stale.close();
        self.new_replica(state).await
    }

    fn check_accounting(&self, state: &PoolState) {
        debug_assert!(state.free.len() as u32 <= state.total);
        debug_assert!(state.total <= self.config.max_conns);
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
