use crate::errors::BridgeError;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid table name {0:?}")]
    InvalidIdentifier(String),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// A SQLite connection. Dropping it closes the connection, so an error
/// halfway through a work item never leaks it; [`close`](Self::close) is the
/// explicit variant that reports close failures.
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn connect(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        tracing::debug!(path = %path.display(), "database connected");
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn execute(&self, sql: &str) -> Result<usize, DbError> {
        Ok(self.conn.execute(sql, [])?)
    }

    /// Creates `table (id, column1, column2)` if it does not exist yet.
    pub fn ensure_pair_table(&self, table: &str) -> Result<(), DbError> {
        let table = identifier(table)?;
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY,
                column1 TEXT NOT NULL,
                column2 TEXT NOT NULL
            )"
        ))?;
        Ok(())
    }

    /// Inserts one row inside a transaction and returns its rowid. The
    /// transaction rolls back if any step fails.
    pub fn insert_pair(&mut self, table: &str, column1: &str, column2: &str) -> Result<i64, DbError> {
        let table = identifier(table)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            &format!("INSERT INTO {table} (column1, column2) VALUES (?1, ?2)"),
            params![column1, column2],
        )?;
        let rowid = tx.last_insert_rowid();
        tx.commit()?;
        tracing::debug!(table, rowid, "row inserted");
        Ok(rowid)
    }

    pub fn count(&self, table: &str) -> Result<i64, DbError> {
        let table = identifier(table)?;
        Ok(self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
    }

    pub fn close(self) -> Result<(), DbError> {
        self.conn.close().map_err(|(_, e)| DbError::Sqlite(e))
    }
}

// Table names are interpolated into SQL, so only plain identifiers pass.
fn identifier(name: &str) -> Result<&str, DbError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(name)
    } else {
        Err(DbError::InvalidIdentifier(name.to_string()))
    }
}
