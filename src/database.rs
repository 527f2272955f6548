use std::path::Path;
use std::time::Duration;

use log::{error, info};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension};

use crate::error::AlertError;
use crate::schema::{CREATE_SCHEMA_SQL, SCHEMA_VERSION};

pub type DbConnection = PooledConnection<SqliteConnectionManager>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const POOL_SIZE: u32 = 8;

/// Pooled access to the SQLite database holding alerts and the catalog
#[derive(Clone)]
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self, AlertError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|c| {
            c.busy_timeout(BUSY_TIMEOUT)?;
            c.execute_batch("PRAGMA foreign_keys = ON;")
        });

        let pool = Pool::builder().max_size(POOL_SIZE).build(manager)?;
        let db = Database { pool };

        let conn = db.get_connection()?;
        Self::ensure_schema(&conn)?;
        info!("Database opened at: {}", db_path.display());

        Ok(db)
    }

    pub fn get_connection(&self) -> Result<DbConnection, AlertError> {
        Ok(self.pool.get()?)
    }

    fn ensure_schema(conn: &Connection) -> Result<(), AlertError> {
        let table_exists: bool = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='meta'",
                [],
                |row| row.get::<_, i32>(0),
            )
            .map(|count| count > 0)?;

        if !table_exists {
            info!("Creating database schema version {}", SCHEMA_VERSION);
            return Self::immediate_transaction(conn, |c| {
                c.execute_batch(CREATE_SCHEMA_SQL)?;
                Ok(())
            });
        }

        match Self::get_schema_version(conn)?.as_deref() {
            Some(SCHEMA_VERSION) => Ok(()),
            Some(other) => Err(AlertError::Error(format!(
                "Unsupported schema version '{}' (expected '{}')",
                other, SCHEMA_VERSION
            ))),
            None => Err(AlertError::Error(
                "Database is missing its schema version".into(),
            )),
        }
    }

    pub fn get_schema_version(conn: &Connection) -> Result<Option<String>, AlertError> {
        let version = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    /// Runs `f` inside a `BEGIN IMMEDIATE` transaction. SQLite takes the write
    /// lock up front, so concurrent writers on other pooled connections queue
    /// behind this one instead of interleaving with it.
    pub fn immediate_transaction<F, T>(conn: &Connection, f: F) -> Result<T, AlertError>
    where
        F: FnOnce(&Connection) -> Result<T, AlertError>,
    {
        conn.execute_batch("BEGIN IMMEDIATE")?;

        let result = f(conn).and_then(|value| {
            conn.execute_batch("COMMIT")?;
            Ok(value)
        });

        // A failed COMMIT leaves the transaction open on a pooled connection
        if result.is_err() && !conn.is_autocommit() {
            if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                error!("Failed to roll back transaction: {}", rollback_err);
            }
        }
        result
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// Database in a temp directory; the directory lives as long as the returned guard
    pub fn temp_database() -> (TempDir, Database) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db = Database::open(&dir.path().join("test.db")).expect("Failed to open database");
        (dir, db)
    }
}
