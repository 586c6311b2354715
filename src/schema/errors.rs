//! # Schema Errors

use thiserror::Error;

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while validating or compiling a table schema
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("Table name must not be empty")]
    EmptyTableName,

    #[error("Table name '{0}' is reserved")]
    ReservedTable(String),

    #[error("Invalid table name '{0}': must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidTableName(String),

    #[error("Invalid field name '{field}' in table '{table}': must match the identifier pattern and may not start with '_'")]
    InvalidFieldName { table: String, field: String },

    #[error("Field '{field}' in table '{table}' has type 'id' but is missing a table reference")]
    MissingTableReference { table: String, field: String },

    #[error("Index '{index}' on table '{table}' references field '{field}' which does not exist")]
    UnknownIndexField {
        table: String,
        index: String,
        field: String,
    },

    #[error("Invalid index name '{index}' on table '{table}'")]
    InvalidIndexName { table: String, index: String },

    #[error("Unsupported type '{0}'")]
    UnsupportedType(String),

    #[error("Field '{field}' is required but missing or null")]
    RequiredField { field: String },

    #[error("Field '{field}' expects {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Field '{field}' is not declared in the schema for table '{table}'")]
    UndeclaredField { table: String, field: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        let err = SchemaError::MissingTableReference {
            table: "posts".into(),
            field: "author".into(),
        };
        let display = format!("{}", err);
        assert!(display.contains("author"));
        assert!(display.contains("table reference"));

        let err = SchemaError::UnknownIndexField {
            table: "posts".into(),
            index: "by_author".into(),
            field: "author".into(),
        };
        assert!(format!("{}", err).contains("by_author"));
    }
}
