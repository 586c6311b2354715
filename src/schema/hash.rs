//! Canonical schema hashing
//!
//! A schema hash is a deterministic digest of a canonicalized schema
//! definition, used to detect divergence before a migration is applied.
//! Field declarations keep their order, so serializing the schema to JSON
//! yields a canonical byte string.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::types::DatabaseSchema;

/// Hashes a full database schema.
pub fn schema_hash(schema: &DatabaseSchema) -> String {
    hash_canonical(schema)
}

/// Hashes any serializable definition through its canonical JSON form.
pub fn hash_canonical<T: Serialize>(definition: &T) -> String {
    let canonical = serde_json::to_string(definition).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{FieldDef, FieldType, TableSchema};

    fn sample() -> DatabaseSchema {
        DatabaseSchema::new(vec![TableSchema::new("users")
            .with_field("name", FieldDef::required(FieldType::String))])
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(schema_hash(&sample()), schema_hash(&sample()));
    }

    #[test]
    fn test_hash_changes_with_schema() {
        let changed = DatabaseSchema::new(vec![TableSchema::new("users")
            .with_field("name", FieldDef::optional(FieldType::String))]);
        assert_ne!(schema_hash(&sample()), schema_hash(&changed));
    }

    #[test]
    fn test_hash_is_url_safe() {
        let hash = schema_hash(&sample());
        assert!(hash
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
