use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::store::{HistoryError, HistoryResult};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounded set of SQLite connections to one database file.
///
/// At most `size` connections exist. Callers wait for a permit, then run
/// their closure on the blocking pool with a checked-out connection. The
/// connection goes back to the idle list when the closure returns, fails or
/// panics.
pub struct ConnectionPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl ConnectionPool {
    pub fn new(path: impl Into<PathBuf>, size: usize) -> Self {
        let size = size.max(1);
        Self {
            path: path.into(),
            idle: Mutex::new(Vec::with_capacity(size)),
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Connections currently parked in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Run `f` with a pooled connection on the blocking thread pool.
    pub async fn with_connection<T, F>(self: &Arc<Self>, f: F) -> HistoryResult<T>
    where
        F: FnOnce(&mut Connection) -> HistoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| HistoryError::Unavailable("connection pool closed".to_string()))?;
        let pool = Arc::clone(self);

        tokio::task::spawn_blocking(move || {
            let mut guard = pool.checkout(permit)?;
            let conn = guard.conn.as_mut().ok_or_else(|| {
                HistoryError::Unavailable("connection already returned".to_string())
            })?;
            f(conn)
        })
        .await
        .map_err(|e| HistoryError::Task(e.to_string()))?
    }

    fn checkout(&self, permit: OwnedSemaphorePermit) -> HistoryResult<PooledConnection<'_>> {
        let conn = match self.idle.lock().pop() {
            Some(conn) => conn,
            None => self.connect()?,
        };
        Ok(PooledConnection {
            pool: self,
            conn: Some(conn),
            _permit: permit,
        })
    }

    pub(crate) fn connect(&self) -> HistoryResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        tracing::debug!(path = %self.path.display(), "Opened history connection");
        Ok(conn)
    }

    fn release(&self, conn: Connection) {
        self.idle.lock().push(conn);
    }
}

/// Checked-out connection; returned to the idle list on drop. The permit is
/// released after the connection is parked.
struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Connection>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if conn.is_autocommit() {
                self.pool.release(conn);
            } else {
                // Left mid-transaction by a panic; discard rather than reuse.
                tracing::warn!("Discarding history connection with an open transaction");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(size: usize) -> (tempfile::TempDir, Arc<ConnectionPool>) {
        let dir = tempfile::tempdir().unwrap();
        let pool = Arc::new(ConnectionPool::new(dir.path().join("pool.db"), size));
        (dir, pool)
    }

    #[tokio::test]
    async fn connections_are_reused() {
        let (_dir, pool) = pool(2);
        for _ in 0..5 {
            let one: i64 = pool
                .with_connection(|conn| Ok(conn.query_row("SELECT 1", [], |row| row.get(0))?))
                .await
                .unwrap();
            assert_eq!(one, 1);
        }
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn connection_is_returned_after_error() {
        let (_dir, pool) = pool(1);
        let result: HistoryResult<()> = pool
            .with_connection(|conn| {
                conn.execute("INSERT INTO missing_table VALUES (1)", [])?;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(HistoryError::Database(_))));
        assert_eq!(pool.idle_count(), 1);

        // The single permit is free again.
        pool.with_connection(|_| Ok(())).await.unwrap();
    }

    #[tokio::test]
    async fn connection_is_returned_after_panic() {
        let (_dir, pool) = pool(1);
        let result: HistoryResult<()> = pool
            .with_connection(|_| panic!("boom"))
            .await;
        assert!(matches!(result, Err(HistoryError::Task(_))));
        assert_eq!(pool.idle_count(), 1);
        pool.with_connection(|_| Ok(())).await.unwrap();
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_size() {
        let (_dir, pool) = pool(3);
        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move {
                    pool.with_connection(|conn| {
                        std::thread::sleep(Duration::from_millis(5));
                        Ok(conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?)
                    })
                    .await
                })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 1);
        }
        assert!(pool.idle_count() <= pool.size());
    }
}
