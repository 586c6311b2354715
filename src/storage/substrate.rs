//! Storage substrate interface
//!
//! The persistence engine consumes a transactional, SQL-capable storage
//! primitive: execute-with-parameters, row queries, begin/commit/rollback,
//! and a small durable key-value side-store for non-relational bookkeeping.

use super::errors::StorageResult;

/// A parameter or result cell, mirroring SQLite storage classes.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Storage class name for error messages
    pub fn storage_class(&self) -> &'static str {
        match self {
            SqlValue::Null => "NULL",
            SqlValue::Integer(_) => "INTEGER",
            SqlValue::Real(_) => "REAL",
            SqlValue::Text(_) => "TEXT",
            SqlValue::Blob(_) => "BLOB",
        }
    }

    /// Text content, if this is a TEXT cell
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content, if this is an INTEGER cell
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

/// A row of result cells
pub type SqlRow = Vec<SqlValue>;

/// Transactional SQL + key-value storage primitive.
///
/// One substrate instance backs one logical storage unit and assumes a
/// single serialized writer. Implementations surface engine errors with
/// their native messages.
pub trait Substrate: Send + Sync {
    /// Executes a statement, returning the affected-row count.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> StorageResult<usize>;

    /// Runs a query, returning all result rows.
    fn query(&self, sql: &str, params: &[SqlValue]) -> StorageResult<Vec<SqlRow>>;

    /// Begins a transaction.
    fn begin(&self) -> StorageResult<()>;

    /// Commits the open transaction.
    fn commit(&self) -> StorageResult<()>;

    /// Rolls back the open transaction.
    fn rollback(&self) -> StorageResult<()>;

    /// Returns whether a transaction is currently open.
    fn in_transaction(&self) -> StorageResult<bool>;

    /// Reads a key from the durable side-store.
    fn kv_get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Writes a key to the durable side-store.
    fn kv_put(&self, key: &str, value: &str) -> StorageResult<()>;
}
