//! Bounded connection pool with an explicit lifecycle state machine.
//!
//! The pool owns a set of connections built through a
//! [`ConnectionFactory`]: it grows eagerly toward `min_connections`, caps
//! the total at `max_connections` via a semaphore, validates idle
//! connections before handing them out, and runs a periodic sweep that
//! evicts idle connections past their timeout (never below the minimum)
//! and regrows after churn.
//!
//! Checkouts are RAII guards: dropping a [`PooledConnection`] returns the
//! connection to the idle set on every exit path.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::PoolError;
use crate::factory::ConnectionFactory;

/// Pause between attempts when connection creation fails during a
/// checkout. The overall acquire timeout still bounds the wait.
const CREATE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Pool sizing and timing configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connections the pool keeps warm.
    pub min_connections: usize,
    /// Hard cap on open connections, idle and borrowed combined.
    pub max_connections: usize,
    /// Idle connections past this age are closed by the sweep.
    pub idle_timeout: Duration,
    /// Maximum wait for a checkout before `AcquireTimeout`.
    pub acquire_timeout: Duration,
    /// Interval between eviction sweeps.
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 3,
            max_connections: 10,
            idle_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

impl PoolConfig {
    pub fn with_min_connections(mut self, min: usize) -> Self {
        self.min_connections = min;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    fn validate(&self) -> Result<(), PoolError> {
        if self.max_connections == 0 {
            return Err(PoolError::Config("max_connections must be at least 1".into()));
        }
        if self.min_connections > self.max_connections {
            return Err(PoolError::Config(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }
}

/// Pool lifecycle.
///
/// `Uninitialized → Initializing → Ready → ShuttingDown → Closed`.
/// Checkouts are accepted only in `Ready`; earlier states fail fast with
/// `NotInitialized` rather than queueing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PoolState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    ShuttingDown = 3,
    Closed = 4,
}

impl PoolState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Initializing,
            2 => Self::Ready,
            3 => Self::ShuttingDown,
            _ => Self::Closed,
        }
    }
}

/// Point-in-time snapshot of pool dimensions.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    pub state: PoolState,
    /// Connections parked in the pool.
    pub idle: usize,
    /// Connections checked out by callers.
    pub borrowed: usize,
    /// Open connections, idle and borrowed combined.
    pub open: usize,
    pub max: usize,
}

struct IdleEntry<C> {
    conn: C,
    idle_since: Instant,
}

impl<C> IdleEntry<C> {
    fn new(conn: C) -> Self {
        Self {
            conn,
            idle_since: Instant::now(),
        }
    }
}

/// A bounded connection pool.
///
/// Cheap to clone; clones share the same underlying pool.
pub struct Pool<F: ConnectionFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct PoolInner<F: ConnectionFactory> {
    factory: F,
    config: PoolConfig,
    state: AtomicU8,
    idle: Mutex<Vec<IdleEntry<F::Connection>>>,
    semaphore: Arc<Semaphore>,
    open: AtomicUsize,
    borrowed: AtomicUsize,
    sweeper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<F: ConnectionFactory> Pool<F> {
    /// Create an uninitialized pool. No connections are opened until
    /// [`Pool::initialize`] runs.
    pub fn new(factory: F, config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                semaphore: Arc::new(Semaphore::new(config.max_connections)),
                idle: Mutex::new(Vec::with_capacity(config.max_connections)),
                state: AtomicU8::new(PoolState::Uninitialized as u8),
                open: AtomicUsize::new(0),
                borrowed: AtomicUsize::new(0),
                sweeper: Mutex::new(None),
                factory,
                config,
            }),
        })
    }

    /// Grow to the configured minimum and start the eviction sweep.
    ///
    /// Any error here is unrecoverable: the pool moves to `Closed` and the
    /// caller is expected to terminate rather than serve degraded.
    pub async fn initialize(&self) -> Result<(), PoolError> {
        if self
            .inner
            .state
            .compare_exchange(
                PoolState::Uninitialized as u8,
                PoolState::Initializing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return Err(PoolError::Config("pool already initialized".into()));
        }

        for _ in 0..self.inner.config.min_connections {
            match self.inner.factory.create().await {
                Ok(conn) => {
                    self.inner.open.fetch_add(1, Ordering::SeqCst);
                    self.inner.idle.lock().push(IdleEntry::new(conn));
                }
                Err(err) => {
                    self.teardown().await;
                    self.inner.set_state(PoolState::Closed);
                    return Err(err);
                }
            }
        }

        let weak = Arc::downgrade(&self.inner);
        let sweep_interval = self.inner.config.sweep_interval;
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(sweep_interval);
            // The immediate first tick is a no-op sweep.
            loop {
                tick.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if inner.state() != PoolState::Ready {
                    break;
                }
                inner.sweep().await;
            }
        });
        *self.inner.sweeper.lock() = Some(handle);

        self.inner.set_state(PoolState::Ready);
        tracing::info!(
            min = self.inner.config.min_connections,
            max = self.inner.config.max_connections,
            "connection pool ready"
        );
        Ok(())
    }

    /// Check out a connection.
    ///
    /// Idle connections are validated first; stale ones are destroyed and
    /// replaced without surfacing an error. Replacement work, like waiting
    /// for capacity, counts against the acquire timeout.
    pub async fn acquire(&self) -> Result<PooledConnection<F>, PoolError> {
        match self.state() {
            PoolState::Ready => {}
            PoolState::Uninitialized | PoolState::Initializing => {
                return Err(PoolError::NotInitialized)
            }
            PoolState::ShuttingDown | PoolState::Closed => return Err(PoolError::Closed),
        }

        let timeout = self.inner.config.acquire_timeout;
        tokio::time::timeout(timeout, self.acquire_inner())
            .await
            .map_err(|_| PoolError::AcquireTimeout(timeout))?
    }

    async fn acquire_inner(&self) -> Result<PooledConnection<F>, PoolError> {
        let permit = self
            .inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        loop {
            let candidate = self.inner.idle.lock().pop();
            match candidate {
                Some(mut entry) => {
                    if self.inner.factory.validate(&mut entry.conn).await {
                        return Ok(PooledConnection::new(entry.conn, self.inner.clone(), permit));
                    }
                    tracing::debug!("idle connection failed validation, replacing");
                    self.inner.destroy(entry.conn).await;
                }
                None => match self.inner.factory.create().await {
                    Ok(conn) => {
                        self.inner.open.fetch_add(1, Ordering::SeqCst);
                        return Ok(PooledConnection::new(conn, self.inner.clone(), permit));
                    }
                    Err(err) => {
                        // The pool retries create-on-demand growth itself;
                        // the caller only ever sees AcquireTimeout.
                        tracing::warn!(error = %err, "connection create failed, retrying");
                        tokio::time::sleep(CREATE_RETRY_DELAY).await;
                    }
                },
            }
        }
    }

    /// Drain and close every connection. Borrowed connections are closed
    /// as their guards drop.
    pub async fn close(&self) {
        self.inner.set_state(PoolState::ShuttingDown);
        // Wake queued acquirers with an error instead of letting them wait
        // out the timeout.
        self.inner.semaphore.close();
        if let Some(handle) = self.inner.sweeper.lock().take() {
            handle.abort();
        }
        self.teardown().await;
        self.inner.set_state(PoolState::Closed);
        tracing::info!("connection pool closed");
    }

    async fn teardown(&self) {
        let drained: Vec<_> = self.inner.idle.lock().drain(..).collect();
        for entry in drained {
            self.inner.destroy(entry.conn).await;
        }
    }

    pub fn state(&self) -> PoolState {
        self.inner.state()
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            state: self.inner.state(),
            idle: self.inner.idle.lock().len(),
            borrowed: self.inner.borrowed.load(Ordering::SeqCst),
            open: self.inner.open.load(Ordering::SeqCst),
            max: self.inner.config.max_connections,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl<F: ConnectionFactory> PoolInner<F> {
    fn state(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: PoolState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Return a connection from a dropped guard. Runs on the guard's
    /// (synchronous) drop path, so the idle set uses a non-async lock.
    fn checkin(this: &Arc<Self>, conn: F::Connection, permit: OwnedSemaphorePermit) {
        this.borrowed.fetch_sub(1, Ordering::SeqCst);
        if this.state() == PoolState::Ready {
            this.idle.lock().push(IdleEntry::new(conn));
        } else {
            // Draining: close instead of parking. Close errors are logged
            // by the factory and absorbed.
            let inner = Arc::clone(this);
            tokio::spawn(async move {
                inner.destroy(conn).await;
            });
        }
        // Capacity frees only after the connection is parked, so the next
        // permit holder always sees it.
        drop(permit);
    }

    async fn destroy(&self, conn: F::Connection) {
        self.factory.destroy(conn).await;
        self.open.fetch_sub(1, Ordering::SeqCst);
    }

    /// One maintenance pass: evict idle connections past the idle timeout
    /// (never dropping the pool below min), then regrow toward min after
    /// eviction or validation churn.
    async fn sweep(&self) {
        let expired: Vec<F::Connection> = {
            let mut idle = self.idle.lock();
            let mut open_now = self.open.load(Ordering::SeqCst);
            let mut expired = Vec::new();
            let mut i = 0;
            while i < idle.len() {
                if open_now <= self.config.min_connections {
                    break;
                }
                if idle[i].idle_since.elapsed() >= self.config.idle_timeout {
                    expired.push(idle.remove(i).conn);
                    open_now -= 1;
                } else {
                    i += 1;
                }
            }
            expired
        };

        let evicted = expired.len();
        for conn in expired {
            self.destroy(conn).await;
        }
        if evicted > 0 {
            tracing::debug!(evicted, "evicted idle connections");
        }

        while self.open.load(Ordering::SeqCst) < self.config.min_connections {
            // A permit per new connection keeps growth under the max cap.
            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                break;
            };
            match self.factory.create().await {
                Ok(conn) => {
                    self.open.fetch_add(1, Ordering::SeqCst);
                    self.idle.lock().push(IdleEntry::new(conn));
                    drop(permit);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "maintenance could not replace connection");
                    break;
                }
            }
        }
    }
}

/// A checked-out connection. Returned to the pool on drop.
pub struct PooledConnection<F: ConnectionFactory> {
    conn: Option<F::Connection>,
    pool: Arc<PoolInner<F>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    fn new(conn: F::Connection, pool: Arc<PoolInner<F>>, permit: OwnedSemaphorePermit) -> Self {
        pool.borrowed.fetch_add(1, Ordering::SeqCst);
        Self {
            conn: Some(conn),
            pool,
            permit: Some(permit),
        }
    }
}

impl<F: ConnectionFactory> std::fmt::Debug for PooledConnection<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection").finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<F> {
    type Target = F::Connection;

    fn deref(&self) -> &F::Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut F::Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        if let (Some(conn), Some(permit)) = (self.conn.take(), self.permit.take()) {
            PoolInner::checkin(&self.pool, conn, permit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;

    struct TestConn {
        healthy: Arc<AtomicBool>,
    }

    #[derive(Default)]
    struct TestFactory {
        create_calls: AtomicUsize,
        created: AtomicUsize,
        destroyed: AtomicUsize,
        fail_creates: AtomicBool,
        conns: Mutex<Vec<Arc<AtomicBool>>>,
    }

    #[async_trait]
    impl ConnectionFactory for TestFactory {
        type Connection = TestConn;

        async fn create(&self) -> Result<TestConn, PoolError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_creates.load(Ordering::SeqCst) {
                return Err(PoolError::Connection("connection refused".into()));
            }
            let healthy = Arc::new(AtomicBool::new(true));
            self.conns.lock().push(healthy.clone());
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(TestConn { healthy })
        }

        async fn destroy(&self, _conn: TestConn) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }

        async fn validate(&self, conn: &mut TestConn) -> bool {
            conn.healthy.load(Ordering::SeqCst)
        }
    }

    fn test_pool(config: PoolConfig) -> (Arc<TestFactory>, Pool<Arc<TestFactory>>) {
        let factory = Arc::new(TestFactory::default());
        let pool = Pool::new(factory.clone(), config).expect("valid config");
        (factory, pool)
    }

    /// Drive the runtime until the background sweeper has had a chance to
    /// run after a time advance.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn config_rejects_min_above_max() {
        let config = PoolConfig::default()
            .with_min_connections(5)
            .with_max_connections(2);
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));
    }

    #[tokio::test]
    async fn acquire_before_initialize_fails_fast() {
        let (factory, pool) = test_pool(PoolConfig::default());

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, PoolError::NotInitialized));
        // Fail-fast means no connection creation was attempted.
        assert_eq!(factory.create_calls.load(Ordering::SeqCst), 0);
        assert_eq!(pool.state(), PoolState::Uninitialized);
    }

    #[tokio::test]
    async fn initialize_grows_to_min() {
        let (factory, pool) = test_pool(PoolConfig::default());

        pool.initialize().await.unwrap();
        assert_eq!(pool.state(), PoolState::Ready);

        let status = pool.status();
        assert_eq!(status.idle, 3);
        assert_eq!(status.open, 3);
        assert_eq!(status.borrowed, 0);
        assert_eq!(factory.created.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn initialize_twice_is_an_error() {
        let (_factory, pool) = test_pool(PoolConfig::default());
        pool.initialize().await.unwrap();
        assert!(matches!(
            pool.initialize().await.unwrap_err(),
            PoolError::Config(_)
        ));
    }

    #[tokio::test]
    async fn initialize_failure_closes_the_pool() {
        let (factory, pool) = test_pool(PoolConfig::default());
        factory.fail_creates.store(true, Ordering::SeqCst);

        let err = pool.initialize().await.unwrap_err();
        assert!(matches!(err, PoolError::Connection(_)));
        assert_eq!(pool.status().open, 0);
    }

    #[tokio::test]
    async fn guard_returns_connection_on_drop() {
        let (_factory, pool) = test_pool(PoolConfig::default());
        pool.initialize().await.unwrap();

        let conn = pool.acquire().await.unwrap();
        let status = pool.status();
        assert_eq!(status.borrowed, 1);
        assert_eq!(status.idle, 2);

        drop(conn);
        let status = pool.status();
        assert_eq!(status.borrowed, 0);
        assert_eq!(status.idle, 3);
        assert_eq!(status.open, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn capped_at_max_and_times_out() {
        let config = PoolConfig::default()
            .with_min_connections(0)
            .with_max_connections(2)
            .with_acquire_timeout(Duration::from_millis(500));
        let (factory, pool) = test_pool(config);
        pool.initialize().await.unwrap();

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_eq!(pool.status().open, 2);

        // Both connections are held; the paused clock runs the timeout out.
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, PoolError::AcquireTimeout(_)));
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);

        drop(a);
        drop(b);
        assert_eq!(pool.status().open, 2);
    }

    #[tokio::test]
    async fn stale_idle_connection_is_replaced_transparently() {
        let config = PoolConfig::default()
            .with_min_connections(2)
            .with_max_connections(4);
        let (factory, pool) = test_pool(config);
        pool.initialize().await.unwrap();

        for flag in factory.conns.lock().iter() {
            flag.store(false, Ordering::SeqCst);
        }

        // Both idle connections fail validation; the caller still gets a
        // healthy one without seeing an error.
        let conn = pool.acquire().await.unwrap();
        assert!(conn.healthy.load(Ordering::SeqCst));
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 2);
        assert_eq!(factory.created.load(Ordering::SeqCst), 3);

        let status = pool.status();
        assert_eq!(status.open, 1);
        assert_eq!(status.borrowed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn create_failures_retry_until_timeout() {
        let config = PoolConfig::default()
            .with_min_connections(0)
            .with_max_connections(2)
            .with_acquire_timeout(Duration::from_secs(1));
        let (factory, pool) = test_pool(config);
        pool.initialize().await.unwrap();
        factory.fail_creates.store(true, Ordering::SeqCst);

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, PoolError::AcquireTimeout(_)));
        // The pool kept retrying creation inside the timeout window.
        assert!(factory.create_calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(pool.status().open, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_grows_to_max_then_drains_to_min() {
        let (factory, pool) = test_pool(PoolConfig::default());
        pool.initialize().await.unwrap();

        // Ten concurrent borrowers against min=3/max=10: the three idle
        // connections are reused and exactly seven more are created.
        let barrier = Arc::new(tokio::sync::Barrier::new(10));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let pool = pool.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    let conn = pool.acquire().await.unwrap();
                    barrier.wait().await;
                    drop(conn);
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(factory.created.load(Ordering::SeqCst), 10);
        let status = pool.status();
        assert_eq!(status.open, 10);
        assert_eq!(status.idle, 10);
        assert_eq!(status.borrowed, 0);

        // One sweep past the idle timeout drains back to min.
        tokio::time::advance(Duration::from_secs(31)).await;
        settle().await;

        let status = pool.status();
        assert_eq!(status.open, 3);
        assert_eq!(status.idle, 3);
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_never_drops_below_min() {
        let config = PoolConfig::default()
            .with_min_connections(2)
            .with_max_connections(4);
        let (factory, pool) = test_pool(config);
        pool.initialize().await.unwrap();

        tokio::time::advance(Duration::from_secs(120)).await;
        settle().await;

        assert_eq!(pool.status().open, 2);
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_regrows_toward_min() {
        let config = PoolConfig::default()
            .with_min_connections(2)
            .with_max_connections(4);
        let (factory, pool) = test_pool(config);
        pool.initialize().await.unwrap();

        // Poison both idle connections; a checkout burns them down to one
        // fresh connection, leaving the pool below min once returned.
        for flag in factory.conns.lock().iter() {
            flag.store(false, Ordering::SeqCst);
        }
        drop(pool.acquire().await.unwrap());
        assert_eq!(pool.status().open, 1);

        // The next sweep grows back to min.
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;

        let status = pool.status();
        assert_eq!(status.open, 2);
        assert_eq!(status.idle, 2);
    }

    #[tokio::test]
    async fn close_destroys_idle_and_rejects_acquire() {
        let (factory, pool) = test_pool(PoolConfig::default());
        pool.initialize().await.unwrap();

        pool.close().await;
        assert_eq!(pool.state(), PoolState::Closed);
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 3);
        assert_eq!(pool.status().open, 0);

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, PoolError::Closed));
    }

    #[tokio::test]
    async fn connection_returned_during_shutdown_is_closed() {
        let (factory, pool) = test_pool(PoolConfig::default().with_min_connections(1));
        pool.initialize().await.unwrap();

        let conn = pool.acquire().await.unwrap();
        pool.close().await;

        drop(conn);
        settle().await;
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.status().open, 0);
        assert_eq!(pool.status().idle, 0);
    }
}
