//! # Document Store Errors

use thiserror::Error;

use crate::schema::SchemaError;
use crate::storage::StorageError;
use crate::value::ValidationError;

/// Result type for document store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by document CRUD and query operations
///
/// Lookups (`get`) and `delete` treat absence as a normal empty result;
/// mutate-by-id operations (`patch`, `replace`) raise explicit not-found
/// errors.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    #[error("Document '{id}' not found in table '{table}'")]
    DocumentNotFound { table: String, id: String },

    #[error("Unknown filter operator '{0}'")]
    UnknownOperator(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
