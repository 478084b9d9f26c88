use std::path::Path;

use rusqlite::Connection;

use crate::errors::{RelinkError, Result};

/// The embedded SQL schema applied when initializing a new store.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// SQLite store holding reference collections, the synthetic flow namespace
/// and committed inventory databases.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Creates a new store at `db_path`, creating parent directories if needed.
    ///
    /// Opens a SQLite connection, applies pragmas, and executes the schema.
    /// Safe to call on an existing store: the schema only creates what is missing.
    pub fn initialize(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RelinkError::Database {
                message: format!("failed to create database directory: {e}"),
                operation: "initialize".to_string(),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| RelinkError::Database {
            message: format!("failed to open database: {e}"),
            operation: "initialize".to_string(),
        })?;

        Self::from_connection(conn, "initialize")
    }

    /// Opens an existing store at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            return Err(RelinkError::Database {
                message: format!("no store found at '{}'", db_path.display()),
                operation: "open".to_string(),
            });
        }

        let conn = Connection::open(db_path).map_err(|e| RelinkError::Database {
            message: format!("failed to open database: {e}"),
            operation: "open".to_string(),
        })?;

        Self::apply_pragmas(&conn)?;

        Ok(Self { conn })
    }

    /// Creates a throwaway in-memory store with the full schema.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| RelinkError::Database {
            message: format!("failed to open in-memory database: {e}"),
            operation: "in_memory".to_string(),
        })?;

        Self::from_connection(conn, "in_memory")
    }

    fn from_connection(conn: Connection, operation: &str) -> Result<Self> {
        Self::apply_pragmas(&conn)?;

        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| RelinkError::Database {
                message: format!("failed to apply schema: {e}"),
                operation: operation.to_string(),
            })?;

        Ok(Self { conn })
    }

    /// Returns a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Returns the on-disk size of the database file in bytes.
    pub fn size(&self) -> Result<u64> {
        let size: i64 = self
            .conn
            .query_row(
                "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get(0),
            )
            .map_err(|e| RelinkError::Database {
                message: format!("failed to get database size: {e}"),
                operation: "size".to_string(),
            })?;
        Ok(size as u64)
    }

    fn apply_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 120000;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;",
        )
        .map_err(|e| RelinkError::Database {
            message: format!("failed to apply pragmas: {e}"),
            operation: "apply_pragmas".to_string(),
        })
    }
}
