//! SQLite-backed storage substrate
//!
//! One rusqlite connection guarded by a mutex: the engine assumes a single
//! serialized writer per storage unit, so connection-level locking is the
//! whole concurrency story here. Durability pragmas are applied on open.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::types::{Value as RusqliteValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use serde::Deserialize;

use super::errors::{StorageError, StorageResult};
use super::substrate::{SqlRow, SqlValue, Substrate};

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Journal mode for the underlying SQLite database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    /// Write-ahead log (recommended)
    #[default]
    Wal,
    /// Rollback journal
    Delete,
}

impl JournalMode {
    fn pragma_value(self) -> &'static str {
        match self {
            JournalMode::Wal => "wal",
            JournalMode::Delete => "delete",
        }
    }
}

/// Configuration for a file-backed SQLite substrate
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConfig {
    /// Path to the database file
    pub path: PathBuf,
    /// Busy timeout in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode
    #[serde(default)]
    pub journal_mode: JournalMode,
}

impl SqliteConfig {
    /// Configuration with defaults for the given path
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: JournalMode::default(),
        }
    }
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// SQLite implementation of the [`Substrate`] trait
pub struct SqliteSubstrate {
    connection: Mutex<Connection>,
}

impl SqliteSubstrate {
    /// Opens (creating if needed) a file-backed substrate.
    pub fn open(config: &SqliteConfig) -> StorageResult<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| StorageError::Io(err.to_string()))?;
            }
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let connection = Connection::open_with_flags(&config.path, flags)?;
        connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        connection.execute_batch(&format!(
            "PRAGMA journal_mode = {};",
            config.journal_mode.pragma_value()
        ))?;
        Self::from_connection(connection)
    }

    /// Opens an in-memory substrate (one storage unit per call).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> StorageResult<Self> {
        connection.execute_batch(
            "CREATE TABLE IF NOT EXISTS \"_meta\" (key TEXT PRIMARY KEY, value TEXT NOT NULL);",
        )?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, Connection>> {
        self.connection.lock().map_err(|_| StorageError::Poisoned)
    }
}

impl Substrate for SqliteSubstrate {
    fn execute(&self, sql: &str, params: &[SqlValue]) -> StorageResult<usize> {
        let conn = self.lock()?;
        let affected = conn.execute(sql, params_from_iter(params.iter().map(to_rusqlite)))?;
        Ok(affected)
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> StorageResult<Vec<SqlRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(params.iter().map(to_rusqlite)))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(column_count);
            for i in 0..column_count {
                cells.push(from_rusqlite(row.get_ref(i)?));
            }
            out.push(cells);
        }
        Ok(out)
    }

    fn begin(&self) -> StorageResult<()> {
        self.lock()?.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&self) -> StorageResult<()> {
        self.lock()?.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> StorageResult<()> {
        self.lock()?.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn in_transaction(&self) -> StorageResult<bool> {
        Ok(!self.lock()?.is_autocommit())
    }

    fn kv_get(&self, key: &str) -> StorageResult<Option<String>> {
        let rows = self.query(
            "SELECT value FROM \"_meta\" WHERE key = ?1",
            &[SqlValue::Text(key.to_string())],
        )?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .and_then(|cell| match cell {
                SqlValue::Text(s) => Some(s),
                _ => None,
            }))
    }

    fn kv_put(&self, key: &str, value: &str) -> StorageResult<()> {
        self.execute(
            "INSERT INTO \"_meta\" (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            &[
                SqlValue::Text(key.to_string()),
                SqlValue::Text(value.to_string()),
            ],
        )?;
        Ok(())
    }
}

fn to_rusqlite(value: &SqlValue) -> RusqliteValue {
    match value {
        SqlValue::Null => RusqliteValue::Null,
        SqlValue::Integer(i) => RusqliteValue::Integer(*i),
        SqlValue::Real(f) => RusqliteValue::Real(*f),
        SqlValue::Text(s) => RusqliteValue::Text(s.clone()),
        SqlValue::Blob(b) => RusqliteValue::Blob(b.clone()),
    }
}

fn from_rusqlite(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(f) => SqlValue::Real(f),
        ValueRef::Text(s) => SqlValue::Text(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
    }
}
