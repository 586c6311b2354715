//! # Value Validation Errors

use thiserror::Error;

/// Result type for value validation
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Errors raised while validating a document payload
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Invalid value at {path}: {reason}")]
    InvalidValue { path: String, reason: String },

    #[error("Field '{0}' is reserved: system fields are auto-generated and cannot be specified")]
    SystemField(String),

    #[error("Field '{0}' is invalid: field names may not start with '_'")]
    ReservedFieldName(String),

    #[error("Document payload must be an object, got {0}")]
    NotAnObject(String),

    #[error("Malformed encoded document: {0}")]
    Malformed(String),
}

impl ValidationError {
    /// Invalid value at a dotted/bracketed path (`a.b[2].c`, or `root`).
    pub fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
