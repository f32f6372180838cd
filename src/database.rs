use log::{debug, info, warn};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AbsensiError;
use crate::schema::{CREATE_SCHEMA_SQL, SCHEMA_VERSION};

pub type PooledConn = PooledConnection<SqliteConnectionManager>;

/// Pooled handle to the attendance database. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl Database {
    /// Opens (creating if needed) the database file and ensures the schema is current.
    pub fn open(path: &Path, pool_size: u32) -> Result<Self, AbsensiError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path).with_init(|c| {
            c.execute_batch("PRAGMA foreign_keys = ON;")?;
            c.busy_timeout(Duration::from_secs(5))?;
            // journal_mode answers with a row, so it can't go through execute_batch
            c.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
        });

        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;

        let db = Self {
            pool,
            path: path.to_path_buf(),
        };

        let conn = db.get_connection()?;
        Self::ensure_schema(&conn)?;
        info!("Database opened at: {}", path.display());

        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Checks a connection out of the pool. It returns to the pool when dropped.
    pub fn get_connection(&self) -> Result<PooledConn, AbsensiError> {
        Ok(self.pool.get()?)
    }

    /// Runs `f` with one pooled connection on the blocking thread pool.
    ///
    /// The connection is held only for the duration of `f` and is returned to
    /// the pool whether `f` succeeds or fails.
    pub async fn run<T, F>(&self, f: F) -> Result<T, AbsensiError>
    where
        F: FnOnce(&mut Connection) -> Result<T, AbsensiError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| AbsensiError::Error(format!("Database task failed: {}", e)))?
    }

    /// Runs `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`.
    pub fn immediate_transaction<T, F>(conn: &Connection, f: F) -> Result<T, AbsensiError>
    where
        F: FnOnce(&Connection) -> Result<T, AbsensiError>,
    {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("Rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    pub fn get_schema_version(conn: &Connection) -> Result<Option<String>, AbsensiError> {
        let version = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    fn ensure_schema(conn: &Connection) -> Result<(), AbsensiError> {
        let table_exists: bool = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='meta'",
                [],
                |row| row.get::<_, i32>(0),
            )
            .map(|count| count > 0)?;

        if !table_exists {
            debug!("Creating schema version {}", SCHEMA_VERSION);
            conn.execute_batch(CREATE_SCHEMA_SQL)?;
            return Ok(());
        }

        match Self::get_schema_version(conn)?.as_deref() {
            Some(SCHEMA_VERSION) => Ok(()),
            Some(other) => Err(AbsensiError::Error(format!(
                "Schema version mismatch: database is '{}', expected '{}'",
                other, SCHEMA_VERSION
            ))),
            None => Err(AbsensiError::Error("Schema version missing".to_string())),
        }
    }
}
