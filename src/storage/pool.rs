//! A small blocking SQLite connection pool.
//!
//! Connections live in a bounded queue. `acquire` waits for a returned
//! connection up to the configured timeout and then opens a fresh one
//! instead of failing, so exhaustion only costs latency. Every borrowed
//! connection is rolled back before it goes back in the queue.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::PoolError;

#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub path: PathBuf,
    pub pool_size: usize,
    pub acquire_timeout: Duration,
    pub busy_timeout: Duration,
}

impl PoolConfig {
    pub fn new(path: impl Into<PathBuf>) -> PoolConfig {
        PoolConfig {
            path: path.into(),
            pool_size: 5,
            acquire_timeout: Duration::from_secs(10),
            busy_timeout: Duration::from_secs(30),
        }
    }
}

pub struct ConnectionPool {
    config: PoolConfig,
    idle: Mutex<VecDeque<Connection>>,
    returned: Condvar,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Opens `pool_size` configured connections up front.
    pub fn open(config: PoolConfig) -> Result<ConnectionPool, PoolError> {
        if config.pool_size == 0 {
            return Err(PoolError::ZeroSize);
        }
        let pool = ConnectionPool {
            idle: Mutex::new(VecDeque::with_capacity(config.pool_size)),
            returned: Condvar::new(),
            closed: AtomicBool::new(false),
            config,
        };
        pool.fill()?;
        info!(path = %pool.config.path.display(), size = pool.config.pool_size, "connection pool initialised");
        Ok(pool)
    }

    pub fn pool_size(&self) -> usize {
        self.config.pool_size
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Connections currently waiting in the queue.
    pub fn idle_count(&self) -> usize {
        self.lock().len()
    }

    /// Borrows a connection until the returned guard is dropped, waiting up
    /// to the configured `acquire_timeout`.
    pub fn acquire(&self) -> Result<PooledConnection<'_>, PoolError> {
        self.acquire_timeout(self.config.acquire_timeout)
    }

    /// Like `acquire`, with an explicit wait before an overflow connection is
    /// opened instead.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection<'_>, PoolError> {
        if self.closed.swap(false, Ordering::AcqRel) {
            self.fill()?;
            info!(size = self.config.pool_size, "connection pool reopened");
        }
        let deadline = Instant::now() + timeout;
        let mut idle = self.lock();
        let queued = loop {
            if let Some(conn) = idle.pop_front() {
                break Some(conn);
            }
            let now = Instant::now();
            if now >= deadline {
                break None;
            }
            idle = match self.returned.wait_timeout(idle, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        };
        drop(idle);

        let conn = match queued {
            Some(conn) => self.revive(conn, is_alive)?,
            None => {
                debug!(?timeout, "pool exhausted; opening an overflow connection");
                self.connect()?
            }
        };
        Ok(PooledConnection { pool: self, conn: Some(conn) })
    }

    /// Runs `f` on a borrowed connection. The connection is rolled back and
    /// released however `f` exits.
    pub fn with_connection<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E>,
        E: From<PoolError>,
    {
        let mut conn = self.acquire()?;
        f(&mut conn)
    }

    /// Closes every queued connection. Borrowed connections are unaffected;
    /// the next `acquire` reopens the pool.
    pub fn close_all(&self) {
        self.closed.store(true, Ordering::Release);
        let drained: Vec<Connection> = self.lock().drain(..).collect();
        let count = drained.len();
        for conn in drained {
            if let Err((_, e)) = conn.close() {
                warn!(error = %e, "failed to close pooled connection");
            }
        }
        info!(closed = count, "connection pool closed");
    }

    fn release(&self, conn: Connection) {
        if !conn.is_autocommit() {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "rollback on release failed; discarding connection");
                return;
            }
        }
        let mut idle = self.lock();
        if idle.len() < self.config.pool_size {
            idle.push_back(conn);
            drop(idle);
            self.returned.notify_one();
        } else {
            drop(idle);
            debug!("pool full; closing returned connection");
            drop(conn);
        }
    }

    /// Opens connections until the queue holds `pool_size` of them.
    fn fill(&self) -> Result<(), PoolError> {
        let missing = self.config.pool_size.saturating_sub(self.idle_count());
        for _ in 0..missing {
            let conn = self.connect()?;
            self.lock().push_back(conn);
        }
        Ok(())
    }

    /// Returns `conn` if it passes `check`, otherwise a fresh replacement.
    fn revive<C>(&self, conn: Connection, check: C) -> Result<Connection, PoolError>
    where
        C: FnOnce(&Connection) -> bool,
    {
        if check(&conn) {
            return Ok(conn);
        }
        warn!("pooled connection failed its liveness check; replacing it");
        drop(conn);
        self.connect()
    }

    fn connect(&self) -> Result<Connection, PoolError> {
        let path = &self.config.path;
        let conn = Connection::open(path)
            .map_err(|source| PoolError::Open { path: path.clone(), source })?;
        conn.busy_timeout(self.config.busy_timeout)
            .and_then(|_| conn.pragma_update(None, "foreign_keys", "ON"))
            .and_then(|_| conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(())))
            .and_then(|_| conn.pragma_update(None, "synchronous", "NORMAL"))
            .map_err(|source| PoolError::Configure { path: path.clone(), source })?;
        Ok(conn)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Connection>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn is_alive(conn: &Connection) -> bool {
    conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.lock().clear();
    }
}

/// A connection on loan from the pool; returned on drop.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Connection>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection taken before drop")
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection taken before drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::sync::Arc;
    use std::thread;

    fn pool(dir: &tempfile::TempDir, size: usize, timeout_ms: u64) -> ConnectionPool {
        let mut config = PoolConfig::new(dir.path().join("pool.db"));
        config.pool_size = size;
        config.acquire_timeout = Duration::from_millis(timeout_ms);
        ConnectionPool::open(config).unwrap()
    }

    #[test]
    fn connections_are_configured() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir, 2, 100);
        let conn = pool.acquire().unwrap();
        let fk: i64 = conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0)).unwrap();
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0)).unwrap();
        assert_eq!(fk, 1);
        assert_eq!(mode, "wal");
    }

    #[test]
    fn guard_returns_connection_to_queue() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir, 2, 100);
        assert_eq!(pool.idle_count(), 2);
        {
            let _a = pool.acquire().unwrap();
            assert_eq!(pool.idle_count(), 1);
        }
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn exhaustion_opens_overflow_connection_and_closes_surplus() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir, 1, 20);
        let first = pool.acquire().unwrap();
        let second = pool.acquire().unwrap();
        assert_eq!(pool.idle_count(), 0);
        drop(first);
        drop(second);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn waiting_acquire_gets_released_connection() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Arc::new(pool(&dir, 1, 5_000));
        let held = pool.acquire().unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.acquire().map(|_| ()).is_ok())
        };
        thread::sleep(Duration::from_millis(50));
        drop(held);
        assert!(waiter.join().unwrap());
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn per_call_timeout_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir, 1, 60_000);
        let _held = pool.acquire().unwrap();

        let started = Instant::now();
        let overflow = pool.acquire_timeout(Duration::from_millis(20)).unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        overflow.query_row("SELECT 1", [], |_| Ok(())).unwrap();
    }

    #[test]
    fn connection_failing_liveness_check_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir, 1, 100);
        let has_marker = |c: &Connection| {
            c.query_row("SELECT COUNT(*) FROM temp.marker", [], |r| r.get::<_, i64>(0)).is_ok()
        };

        let conn = pool.connect().unwrap();
        conn.execute_batch("CREATE TEMP TABLE marker (v INTEGER)").unwrap();
        let kept = pool.revive(conn, is_alive).unwrap();
        assert!(has_marker(&kept));

        let replaced = pool.revive(kept, |_| false).unwrap();
        assert!(!has_marker(&replaced));
        assert!(is_alive(&replaced));
    }

    #[test]
    fn open_transaction_is_rolled_back_on_release() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir, 1, 100);
        pool.with_connection(|c| -> Result<(), StoreError> {
            Ok(c.execute_batch("CREATE TABLE t (v INTEGER)")?)
        })
        .unwrap();

        let result: Result<(), StoreError> = pool.with_connection(|c| {
            c.execute_batch("BEGIN; INSERT INTO t VALUES (1);")?;
            Err(StoreError::MissingOwner)
        });
        assert!(result.is_err());

        let conn = pool.acquire().unwrap();
        assert!(conn.is_autocommit());
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn close_all_then_acquire_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir, 3, 10);
        pool.close_all();
        assert_eq!(pool.idle_count(), 0);
        let conn = pool.acquire().unwrap();
        conn.query_row("SELECT 1", [], |_| Ok(())).unwrap();
        assert_eq!(pool.idle_count(), 2);
        drop(conn);
        assert_eq!(pool.idle_count(), 3);
    }

    #[test]
    fn zero_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PoolConfig::new(dir.path().join("pool.db"));
        config.pool_size = 0;
        assert!(matches!(ConnectionPool::open(config), Err(PoolError::ZeroSize)));
    }

    #[test]
    fn unopenable_path_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = PoolConfig::new(dir.path().join("missing").join("pool.db"));
        assert!(matches!(ConnectionPool::open(config), Err(PoolError::Open { .. })));
    }
}
