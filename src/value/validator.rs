//! Recursive payload validation
//!
//! Converts caller-supplied JSON payloads into the restricted [`Value`]
//! model, depth-first, failing on the first offending value with its
//! dotted/bracketed path. Rules enforced here:
//!
//! - numbers must be finite (no NaN, no infinities)
//! - tagged wrappers (`__type`) must be well-formed and carry a known tag
//! - top-level field names may not start with `_` (reserved for system fields)
//!
//! Functions, symbols, `undefined` and cyclic graphs are unrepresentable in
//! the host value model, so no dynamic check for them is needed.

use serde_json::Value as JsonValue;

use super::errors::{ValidationError, ValidationResult};
use super::types::{Fields, Value, TAG_BIGINT, TAG_BYTES, TAG_KEY};

/// Path label for a top-level offending value
pub const ROOT_PATH: &str = "root";

/// System field exposed to callers as the document id
pub const FIELD_ID: &str = "_id";
/// System field exposed to callers as the creation timestamp
pub const FIELD_CREATION_TIME: &str = "_creationTime";

/// Validates an insert/patch/replace payload and converts it to a field map.
///
/// The payload must be a JSON object. Keys naming system fields or starting
/// with `_` are rejected; values are validated depth-first.
pub fn validate_payload(payload: &JsonValue) -> ValidationResult<Fields> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ValidationError::NotAnObject(json_type_name(payload).to_string()))?;

    let mut fields = Fields::new();
    for (key, value) in obj {
        check_field_name(key)?;
        fields.insert(key.clone(), value_from_json(value, key)?);
    }
    Ok(fields)
}

/// Rejects system fields and reserved (`_`-prefixed) field names.
pub fn check_field_name(name: &str) -> ValidationResult<()> {
    if name == FIELD_ID || name == FIELD_CREATION_TIME {
        return Err(ValidationError::SystemField(name.to_string()));
    }
    if name.starts_with('_') {
        return Err(ValidationError::ReservedFieldName(name.to_string()));
    }
    Ok(())
}

/// Converts a single JSON value at `path`, validating as it descends.
pub fn value_from_json(value: &JsonValue, path: &str) -> ValidationResult<Value> {
    match value {
        JsonValue::Null => Ok(Value::Null),
        JsonValue::Bool(b) => Ok(Value::Bool(*b)),
        JsonValue::Number(n) => {
            let f = n
                .as_f64()
                .ok_or_else(|| ValidationError::invalid(path, "number out of range"))?;
            if !f.is_finite() {
                return Err(ValidationError::invalid(
                    path,
                    "numbers must be finite (no NaN or Infinity)",
                ));
            }
            Ok(Value::Float(f))
        }
        JsonValue::String(s) => Ok(Value::String(s.clone())),
        JsonValue::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(value_from_json(item, &format!("{}[{}]", path, i))?);
            }
            Ok(Value::Array(out))
        }
        JsonValue::Object(obj) => {
            if let Some(tag) = obj.get(TAG_KEY) {
                return tagged_from_json(tag, obj, path);
            }
            let mut out = std::collections::BTreeMap::new();
            for (key, nested) in obj {
                out.insert(
                    key.clone(),
                    value_from_json(nested, &format!("{}.{}", path, key))?,
                );
            }
            Ok(Value::Object(out))
        }
    }
}

/// Decodes a `__type`-tagged wrapper object.
fn tagged_from_json(
    tag: &JsonValue,
    obj: &serde_json::Map<String, JsonValue>,
    path: &str,
) -> ValidationResult<Value> {
    let tag = tag
        .as_str()
        .ok_or_else(|| ValidationError::invalid(path, "__type tag must be a string"))?;
    let payload = obj
        .get("value")
        .ok_or_else(|| ValidationError::invalid(path, "tagged value is missing its payload"))?;
    if obj.len() != 2 {
        return Err(ValidationError::invalid(
            path,
            "tagged value must contain exactly __type and value",
        ));
    }

    match tag {
        TAG_BIGINT => {
            let digits = payload.as_str().ok_or_else(|| {
                ValidationError::invalid(path, "bigint payload must be a decimal string")
            })?;
            let n: i64 = digits.parse().map_err(|_| {
                ValidationError::invalid(
                    path,
                    format!("bigint payload '{}' is not a valid 64-bit integer", digits),
                )
            })?;
            Ok(Value::Int64(n))
        }
        TAG_BYTES => {
            let items = payload.as_array().ok_or_else(|| {
                ValidationError::invalid(path, "arraybuffer payload must be an array of bytes")
            })?;
            let mut bytes = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let byte = item.as_u64().filter(|b| *b <= u8::MAX as u64).ok_or_else(|| {
                    ValidationError::invalid(
                        format!("{}[{}]", path, i),
                        "arraybuffer elements must be integers in 0..=255",
                    )
                })?;
                bytes.push(byte as u8);
            }
            Ok(Value::Bytes(bytes))
        }
        other => Err(ValidationError::invalid(
            path,
            format!("unknown value tag '{}'", other),
        )),
    }
}

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
