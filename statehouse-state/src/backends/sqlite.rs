//! SQLite backend for state storage
//!
//! All states live in one `states` table keyed by name. Every mutating
//! operation runs inside an `IMMEDIATE` transaction, so the write lock on the
//! database is taken before the current lock status is read. That keeps the
//! check-then-write atomic even when several server processes share the same
//! database file; a contender waits up to the busy timeout for its turn.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Transaction, TransactionBehavior, params};
use statehouse_core::StateName;

use crate::backend::{BackendConfig, BackendError, BackendResult, StateBackend};
use crate::lock::LockRequest;
use crate::state::LockState;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS states (
    name      TEXT PRIMARY KEY NOT NULL,
    data      BLOB,
    locked    INTEGER NOT NULL DEFAULT 0,
    lock_id   TEXT,
    lock_data TEXT,
    CHECK (
        (locked = 0 AND lock_id IS NULL AND lock_data IS NULL)
        OR (locked = 1 AND lock_id IS NOT NULL AND lock_data IS NOT NULL)
    )
);
";

/// SQLite-based state backend
pub struct SqliteBackend {
    /// Path to the database file
    path: PathBuf,
    /// Connection shared by all operations of this backend instance
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Default database file name
    pub const DEFAULT_DATABASE_FILE: &'static str = "statehouse.db";

    /// Default time to wait for another writer, in milliseconds
    pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

    /// Open (or create) a database file with default settings
    pub fn open(path: impl Into<PathBuf>) -> BackendResult<Self> {
        Self::open_with(
            path,
            true,
            Duration::from_millis(Self::DEFAULT_BUSY_TIMEOUT_MS),
        )
    }

    /// Open a database file
    ///
    /// When `create` is false the file must already exist.
    pub fn open_with(
        path: impl Into<PathBuf>,
        create: bool,
        busy_timeout: Duration,
    ) -> BackendResult<Self> {
        let path = path.into();

        let mut flags = OpenFlags::default();
        if !create {
            flags.remove(OpenFlags::SQLITE_OPEN_CREATE);
        }

        let conn = Connection::open_with_flags(&path, flags).map_err(|e| {
            BackendError::storage(format!(
                "Failed to open database {}: {}",
                path.display(),
                e
            ))
        })?;

        conn.busy_timeout(busy_timeout).map_err(storage_error)?;

        // journal_mode reports the resulting mode as a row
        let mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(storage_error)?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "opened state database");

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create a SqliteBackend from configuration
    pub fn from_config(config: &BackendConfig) -> BackendResult<Self> {
        let path = config
            .get_string("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_DATABASE_FILE));

        let busy_timeout_ms = match config.get_int("busy_timeout_ms") {
            Some(ms) => u64::try_from(ms).map_err(|_| {
                BackendError::configuration(format!(
                    "busy_timeout_ms must not be negative, got {}",
                    ms
                ))
            })?,
            None => Self::DEFAULT_BUSY_TIMEOUT_MS,
        };

        let create = config.get_bool_or("create", true);

        Self::open_with(path, create, Duration::from_millis(busy_timeout_ms))
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run blocking database work off the async runtime
    async fn with_connection<T, F>(&self, f: F) -> BackendResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> BackendResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| BackendError::storage("database connection lock poisoned"))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| BackendError::storage(format!("Database task failed: {}", e)))?
    }
}

fn storage_error(e: rusqlite::Error) -> BackendError {
    BackendError::storage(e.to_string())
}

/// Run `f` in an IMMEDIATE transaction, committing only if it succeeds
///
/// Returning early drops the transaction, which rolls it back.
fn in_transaction<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Transaction<'_>) -> BackendResult<T>,
) -> BackendResult<T> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(storage_error)?;
    let value = f(&tx)?;
    tx.commit().map_err(storage_error)?;
    Ok(value)
}

/// Read the lock status of a state, or `None` if the state does not exist
fn read_lock_state(tx: &Transaction<'_>, name: &str) -> BackendResult<Option<LockState>> {
    let row = tx
        .query_row(
            "SELECT locked, lock_id, lock_data FROM states WHERE name = ?1",
            params![name],
            |row| {
                Ok((
                    row.get::<_, bool>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()
        .map_err(storage_error)?;

    match row {
        Some((locked, lock_id, lock_data)) => LockState::from_parts(locked, lock_id, lock_data)
            .map(Some)
            .ok_or_else(|| {
                BackendError::storage(format!("Inconsistent lock columns for state {}", name))
            }),
        None => Ok(None),
    }
}

#[async_trait]
impl StateBackend for SqliteBackend {
    async fn init(&self) -> BackendResult<()> {
        self.with_connection(|conn| conn.execute_batch(SCHEMA).map_err(storage_error))
            .await
    }

    async fn get_state(&self, name: &StateName) -> BackendResult<Option<Vec<u8>>> {
        let name = name.to_string();

        self.with_connection(move |conn| {
            let data = conn
                .query_row(
                    "SELECT data FROM states WHERE name = ?1",
                    params![name],
                    |row| row.get::<_, Option<Vec<u8>>>(0),
                )
                .optional()
                .map_err(storage_error)?;

            Ok(data.flatten())
        })
        .await
    }

    async fn update_state(
        &self,
        name: &StateName,
        document: Vec<u8>,
        lock_id: Option<&str>,
    ) -> BackendResult<()> {
        let name = name.to_string();
        let lock_id = lock_id.map(str::to_string);

        self.with_connection(move |conn| {
            in_transaction(conn, |tx| {
                if let Some(lock) = read_lock_state(tx, &name)? {
                    lock.check_write(lock_id.as_deref())?;
                }

                tx.execute(
                    "INSERT INTO states (name, data, locked) VALUES (?1, ?2, 0)
                     ON CONFLICT(name) DO UPDATE SET data = excluded.data",
                    params![name, document],
                )
                .map_err(storage_error)?;

                Ok(())
            })
        })
        .await
    }

    async fn delete_state(&self, name: &StateName, force: bool) -> BackendResult<()> {
        let name = name.to_string();

        self.with_connection(move |conn| {
            in_transaction(conn, |tx| {
                match read_lock_state(tx, &name)? {
                    Some(lock) => lock.check_delete(force)?,
                    None => return Ok(()),
                }

                tx.execute("DELETE FROM states WHERE name = ?1", params![name])
                    .map_err(storage_error)?;

                Ok(())
            })
        })
        .await
    }

    async fn lock_state(&self, name: &StateName, request: &LockRequest) -> BackendResult<()> {
        request.validate()?;
        let lock_data = request.to_lock_data()?;
        let lock_id = request.id.clone();
        let name = name.to_string();

        self.with_connection(move |conn| {
            in_transaction(conn, |tx| {
                if let Some(lock) = read_lock_state(tx, &name)? {
                    lock.check_lock()?;
                }

                // A state that does not exist yet gets a reservation with no data
                tx.execute(
                    "INSERT INTO states (name, locked, lock_id, lock_data) VALUES (?1, 1, ?2, ?3)
                     ON CONFLICT(name) DO UPDATE SET
                         locked = 1, lock_id = excluded.lock_id, lock_data = excluded.lock_data",
                    params![name, lock_id, lock_data],
                )
                .map_err(storage_error)?;

                Ok(())
            })
        })
        .await
    }

    async fn unlock_state(&self, name: &StateName, request: &LockRequest) -> BackendResult<()> {
        request.validate()?;
        let lock_id = request.id.clone();
        let state_name = name.clone();
        let name = name.to_string();

        self.with_connection(move |conn| {
            in_transaction(conn, |tx| {
                match read_lock_state(tx, &name)? {
                    Some(lock) => lock.check_unlock(&state_name, &lock_id)?,
                    None => return Err(BackendError::NotLocked(name.clone())),
                }

                tx.execute(
                    "UPDATE states SET locked = 0, lock_id = NULL, lock_data = NULL
                     WHERE name = ?1",
                    params![name],
                )
                .map_err(storage_error)?;

                Ok(())
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::conformance;
    use tempfile::tempdir;

    async fn open_backend(path: &Path) -> SqliteBackend {
        let backend = SqliteBackend::open(path).unwrap();
        backend.init().await.unwrap();
        backend
    }

    #[tokio::test]
    async fn test_sqlite_backend_conformance() {
        let dir = tempdir().unwrap();
        let backend = open_backend(&dir.path().join("states.db")).await;
        conformance::run_all(&backend).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sqlite_backend_concurrent_lock_single_instance() {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn StateBackend> =
            Arc::new(open_backend(&dir.path().join("states.db")).await);
        conformance::concurrent_lock(vec![backend; 16]).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sqlite_backend_concurrent_lock_across_instances() {
        // Separate instances each own a connection, like separate server processes
        let dir = tempdir().unwrap();
        let path = dir.path().join("states.db");

        let mut backends: Vec<Arc<dyn StateBackend>> = Vec::new();
        for _ in 0..8 {
            backends.push(Arc::new(open_backend(&path).await));
        }

        conformance::concurrent_lock(backends).await;
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("states.db");
        let name = StateName::parse("persisted").unwrap();
        let request = LockRequest::new("OperationTypeApply");

        {
            let backend = open_backend(&path).await;
            backend
                .update_state(&name, b"{\"serial\":3}".to_vec(), None)
                .await
                .unwrap();
            backend.lock_state(&name, &request).await.unwrap();
        }

        let backend = open_backend(&path).await;
        assert_eq!(
            backend.get_state(&name).await.unwrap(),
            Some(b"{\"serial\":3}".to_vec())
        );
        assert!(matches!(
            backend.lock_state(&name, &LockRequest::new("plan")).await,
            Err(BackendError::Locked { .. })
        ));
        backend.unlock_state(&name, &request).await.unwrap();
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let dir = tempdir().unwrap();
        let backend = open_backend(&dir.path().join("states.db")).await;
        backend.init().await.unwrap();
    }

    #[tokio::test]
    async fn test_inconsistent_row_is_storage_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("states.db");
        let backend = open_backend(&path).await;

        // Drop the constraint by recreating the table, then store a broken row
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "DROP TABLE states;
                 CREATE TABLE states (name TEXT PRIMARY KEY, data BLOB, locked INTEGER,
                                      lock_id TEXT, lock_data TEXT);
                 INSERT INTO states (name, data, locked) VALUES ('broken', x'7b7d', 1);",
            )
            .unwrap();
        }

        let name = StateName::parse("broken").unwrap();
        let result = backend.update_state(&name, b"new".to_vec(), None).await;
        assert!(matches!(result, Err(BackendError::Storage(_))));

        // The failed update left the row alone
        assert_eq!(backend.get_state(&name).await.unwrap(), Some(b"{}".to_vec()));
    }

    #[test]
    fn test_open_without_create_requires_file() {
        let dir = tempdir().unwrap();
        let result = SqliteBackend::open_with(
            dir.path().join("missing.db"),
            false,
            Duration::from_millis(100),
        );
        assert!(matches!(result, Err(BackendError::Storage(_))));
    }

    #[test]
    fn test_sqlite_backend_from_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("configured.db");

        let config = BackendConfig::new("sqlite")
            .with_attribute("path", path.to_string_lossy().to_string())
            .with_attribute("busy_timeout_ms", 100i64);

        let backend = SqliteBackend::from_config(&config).unwrap();
        assert_eq!(backend.path(), path.as_path());
    }

    #[test]
    fn test_sqlite_backend_rejects_negative_timeout() {
        let config = BackendConfig::new("sqlite").with_attribute("busy_timeout_ms", -1i64);

        match SqliteBackend::from_config(&config) {
            Err(BackendError::Configuration(message)) => {
                assert_eq!(message, "busy_timeout_ms must not be negative, got -1");
            }
            Err(other) => panic!("Expected Configuration error, got {:?}", other),
            Ok(_) => panic!("Expected Configuration error"),
        }
    }
}
