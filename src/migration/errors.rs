//! # Migration Errors

use thiserror::Error;

use crate::schema::SchemaError;
use crate::storage::StorageError;

/// Result type for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Errors raised while validating or applying a migration
#[derive(Debug, Clone, Error)]
pub enum MigrationError {
    #[error("Version conflict: plan starts from version {expected} but the current version is {current}")]
    VersionConflict { expected: i64, current: i64 },

    #[error("Schema hash mismatch for version {version}: expected {expected}, recorded {recorded}")]
    SchemaHashMismatch {
        version: i64,
        expected: String,
        recorded: String,
    },

    #[error("Invalid target version: plan goes from {from} to {to}, expected exactly {}", .from + 1)]
    InvalidTargetVersion { from: i64, to: i64 },

    #[error("Table '{0}' already exists")]
    DuplicateTable(String),

    #[error("Table '{0}' does not exist")]
    UnknownTable(String),

    #[error("Invalid migration operation: {0}")]
    InvalidOperation(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_messages() {
        let err = MigrationError::VersionConflict {
            expected: 3,
            current: 2,
        };
        let display = format!("{}", err);
        assert!(display.contains('3'));
        assert!(display.contains('2'));

        let err = MigrationError::InvalidTargetVersion { from: 2, to: 5 };
        assert!(format!("{}", err).contains("expected exactly 3"));
    }
}
