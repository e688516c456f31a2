//! SQLite handle shared by every module that persists state.
//!
//! The handle owns a single `rusqlite` connection. Work is shipped to the
//! blocking pool through [`Database::call`] so async handlers never block the
//! executor on disk I/O.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

/// Location understood by SQLite as a private in-memory database.
pub const MEMORY: &str = ":memory:";

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised by the database handle
#[derive(Error, Debug)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("database connection lock poisoned")]
    Poisoned,
}

impl DbError {
    /// True when a statement violated a PRIMARY KEY or UNIQUE constraint.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
                    && matches!(
                        err.extended_code,
                        rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                            | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    )
            }
            _ => false,
        }
    }
}

/// Cloneable handle to the process-wide SQLite connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    location: Arc<str>,
}

impl Database {
    /// Open (or create) the database at `location`.
    pub fn open(location: &str, busy_timeout: Duration) -> Result<Self, DbError> {
        let conn = if location == MEMORY {
            Connection::open_in_memory()?
        } else {
            Connection::open(location)?
        };

        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", true)?;

        tracing::info!(target: "shelf-db", location, "database opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: Arc::from(location),
        })
    }

    /// Open a fresh private in-memory database.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::open(MEMORY, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Run `f` against the connection on the blocking thread pool.
    pub async fn call<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| DbError::Poisoned)?;
            f(&mut *guard).map_err(DbError::from)
        })
        .await?
    }

    /// Apply a migration once, recording it under `(scope, id)`.
    ///
    /// Returns `false` when the migration had already been applied. The
    /// script and its bookkeeping row commit in the same transaction.
    pub async fn apply_migration(
        &self,
        scope: &str,
        id: &str,
        up: &str,
    ) -> Result<bool, DbError> {
        let (scope, id, up) = (scope.to_owned(), id.to_owned(), up.to_owned());

        self.call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS _shelf_migrations (
                    scope      TEXT NOT NULL,
                    id         TEXT NOT NULL,
                    applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    PRIMARY KEY (scope, id)
                )",
            )?;

            let applied: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM _shelf_migrations WHERE scope = ?1 AND id = ?2",
                    params![scope, id],
                    |row| row.get(0),
                )
                .optional()?;
            if applied.is_some() {
                return Ok(false);
            }

            tx.execute_batch(&up)?;
            tx.execute(
                "INSERT INTO _shelf_migrations (scope, id) VALUES (?1, ?2)",
                params![scope, id],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    /// Release the connection.
    ///
    /// Other live clones keep the connection open until they drop.
    pub fn close(self) -> Result<(), DbError> {
        match Arc::try_unwrap(self.conn) {
            Ok(mutex) => {
                let conn = mutex.into_inner().map_err(|_| DbError::Poisoned)?;
                conn.close().map_err(|(_, err)| DbError::Sqlite(err))?;
                tracing::info!(target: "shelf-db", location = %self.location, "database closed");
            }
            Err(_) => {
                tracing::warn!(
                    target: "shelf-db",
                    location = %self.location,
                    "database handle still shared at shutdown"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn call_runs_statements() {
        let db = Database::open_in_memory().unwrap();
        let answer: i64 = db
            .call(|conn| conn.query_row("SELECT 40 + 2", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(answer, 42);
    }

    #[tokio::test]
    async fn migrations_apply_once() {
        let db = Database::open_in_memory().unwrap();
        let up = "CREATE TABLE notes (id TEXT PRIMARY KEY);";

        assert!(db.apply_migration("notes", "001_init", up).await.unwrap());
        assert!(!db.apply_migration("notes", "001_init", up).await.unwrap());

        let recorded: i64 = db
            .call(|conn| {
                conn.query_row("SELECT COUNT(*) FROM _shelf_migrations", [], |row| {
                    row.get(0)
                })
            })
            .await
            .unwrap();
        assert_eq!(recorded, 1);
    }

    #[tokio::test]
    async fn failed_migration_is_not_recorded() {
        let db = Database::open_in_memory().unwrap();

        assert!(db
            .apply_migration("notes", "001_broken", "CREATE TABLE;")
            .await
            .is_err());
        assert!(db
            .apply_migration("notes", "001_broken", "CREATE TABLE notes (id TEXT);")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn detects_primary_key_violation() {
        let db = Database::open_in_memory().unwrap();
        db.apply_migration("notes", "001_init", "CREATE TABLE notes (id TEXT PRIMARY KEY);")
            .await
            .unwrap();

        let insert = |db: Database| async move {
            db.call(|conn| conn.execute("INSERT INTO notes (id) VALUES ('a')", []))
                .await
        };

        insert(db.clone()).await.unwrap();
        let err = insert(db.clone()).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn close_releases_sole_handle() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.location(), MEMORY);
        db.close().unwrap();
    }
}
