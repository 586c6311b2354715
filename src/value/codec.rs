//! Document serialization
//!
//! Converts a validated field map to a storage-safe JSON string and back.
//! Integer and byte-buffer values round-trip through tagged wrapper objects
//! so the encoded form stays plain JSON:
//!
//! - `Int64` → `{"__type":"bigint","value":"<decimal string>"}`
//! - `Bytes` → `{"__type":"arraybuffer","value":[byte, ...]}`

use serde_json::{json, Map, Value as JsonValue};

use super::errors::{ValidationError, ValidationResult};
use super::types::{Fields, Value, TAG_BIGINT, TAG_BYTES};
use super::validator::value_from_json;

/// Encodes a field map to its storage string.
pub fn encode(fields: &Fields) -> String {
    JsonValue::Object(fields_to_json(fields)).to_string()
}

/// Decodes a storage string back into a field map.
///
/// Inverse of [`encode`]: `decode(&encode(x)) == x` for every field map
/// built from validator-accepted values.
pub fn decode(blob: &str) -> ValidationResult<Fields> {
    let parsed: JsonValue = serde_json::from_str(blob)
        .map_err(|err| ValidationError::Malformed(err.to_string()))?;
    let obj = parsed
        .as_object()
        .ok_or_else(|| ValidationError::Malformed("encoded document is not an object".into()))?;

    let mut fields = Fields::new();
    for (key, value) in obj {
        fields.insert(key.clone(), value_from_json(value, key)?);
    }
    Ok(fields)
}

/// Converts a field map to its tagged JSON representation.
pub fn fields_to_json(fields: &Fields) -> Map<String, JsonValue> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), value_to_json(v)))
        .collect()
}

/// Converts a single value to its tagged JSON representation.
pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Float(f) => json!(f),
        Value::Int64(n) => json!({ "__type": TAG_BIGINT, "value": n.to_string() }),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Bytes(bytes) => json!({ "__type": TAG_BYTES, "value": bytes }),
        Value::Array(items) => JsonValue::Array(items.iter().map(value_to_json).collect()),
        Value::Object(map) => {
            JsonValue::Object(map.iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect())
        }
    }
}
