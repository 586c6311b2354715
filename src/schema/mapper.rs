//! Type mapping between declared field types and storage columns
//!
//! Maps a declared field type to a concrete SQLite column type and converts
//! individual values between their logical and storage representations.
//!
//! | Declared type | Column |
//! |---|---|
//! | string | TEXT |
//! | number / float64 | REAL |
//! | boolean | INTEGER (0/1) |
//! | int64 | INTEGER |
//! | bytes | BLOB |
//! | id | TEXT (with a same-column CHECK) |
//! | array / object / union | TEXT (JSON-encoded) |
//! | literal | TEXT/REAL/INTEGER by the literal's own type |
//! | null | TEXT, NULL default |

use serde_json::Value as JsonValue;

use super::errors::{SchemaError, SchemaResult};
use super::types::{FieldDef, FieldType};
use crate::storage::SqlValue;
use crate::value::codec::value_to_json;
use crate::value::validator::value_from_json;
use crate::value::Value;

/// Concrete storage column type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Real,
    Integer,
    Blob,
}

impl ColumnType {
    /// SQL keyword for the column type
    pub fn sql(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Real => "REAL",
            ColumnType::Integer => "INTEGER",
            ColumnType::Blob => "BLOB",
        }
    }
}

/// Maps a field definition to its storage column type.
pub fn column_type(def: &FieldDef) -> SchemaResult<ColumnType> {
    match &def.field_type {
        FieldType::String | FieldType::Id { .. } | FieldType::Null => Ok(ColumnType::Text),
        FieldType::Number | FieldType::Float64 => Ok(ColumnType::Real),
        FieldType::Boolean | FieldType::Int64 => Ok(ColumnType::Integer),
        FieldType::Bytes => Ok(ColumnType::Blob),
        FieldType::Array { .. } | FieldType::Object { .. } | FieldType::Union { .. } => {
            Ok(ColumnType::Text)
        }
        FieldType::Literal { value } => match value {
            JsonValue::String(_) => Ok(ColumnType::Text),
            JsonValue::Number(_) => Ok(ColumnType::Real),
            JsonValue::Bool(_) => Ok(ColumnType::Integer),
            other => Err(SchemaError::UnsupportedType(format!(
                "literal of {}",
                crate::value::validator::json_type_name(other)
            ))),
        },
    }
}

/// Converts a logical value into its storage representation for a column.
///
/// `None` (field absent) and `Value::Null` convert to storage NULL only when
/// the field is optional; otherwise a required-field error is raised.
pub fn to_storage_value(
    field: &str,
    def: &FieldDef,
    value: Option<&Value>,
) -> SchemaResult<SqlValue> {
    let value = match value {
        Some(Value::Null) if !matches!(def.field_type, FieldType::Null) => None,
        other => other,
    };
    let Some(value) = value else {
        if def.optional {
            return Ok(SqlValue::Null);
        }
        return Err(SchemaError::RequiredField {
            field: field.to_string(),
        });
    };

    match (&def.field_type, value) {
        (FieldType::String, Value::String(s)) => Ok(SqlValue::Text(s.clone())),
        (FieldType::Id { .. }, Value::String(s)) => Ok(SqlValue::Text(s.clone())),
        (FieldType::Number | FieldType::Float64, Value::Float(f)) => Ok(SqlValue::Real(*f)),
        (FieldType::Boolean, Value::Bool(b)) => Ok(SqlValue::Integer(i64::from(*b))),
        (FieldType::Int64, Value::Int64(n)) => Ok(SqlValue::Integer(*n)),
        (FieldType::Bytes, Value::Bytes(bytes)) => Ok(SqlValue::Blob(bytes.clone())),
        (FieldType::Null, Value::Null) => Ok(SqlValue::Null),
        (FieldType::Array { .. }, Value::Array(_))
        | (FieldType::Object { .. }, Value::Object(_))
        | (FieldType::Union { .. }, _) => Ok(SqlValue::Text(value_to_json(value).to_string())),
        (FieldType::Literal { value: lit }, actual) => literal_to_storage(field, lit, actual),
        (expected, actual) => Err(SchemaError::TypeMismatch {
            field: field.to_string(),
            expected: expected.type_name().to_string(),
            actual: actual.type_name().to_string(),
        }),
    }
}

/// Converts a storage value back into its logical representation.
///
/// Returns `None` when the column is NULL and the field is optional (the
/// field is simply absent from the document).
pub fn from_storage_value(
    field: &str,
    def: &FieldDef,
    stored: &SqlValue,
) -> SchemaResult<Option<Value>> {
    if matches!(stored, SqlValue::Null) {
        if matches!(def.field_type, FieldType::Null) {
            return Ok(Some(Value::Null));
        }
        if def.optional {
            return Ok(None);
        }
        return Err(SchemaError::RequiredField {
            field: field.to_string(),
        });
    }

    let value = match (&def.field_type, stored) {
        (FieldType::String | FieldType::Id { .. }, SqlValue::Text(s)) => {
            Value::String(s.clone())
        }
        (FieldType::Number | FieldType::Float64, SqlValue::Real(f)) => Value::Float(*f),
        (FieldType::Number | FieldType::Float64, SqlValue::Integer(i)) => Value::Float(*i as f64),
        (FieldType::Boolean, SqlValue::Integer(i)) => Value::Bool(*i != 0),
        (FieldType::Int64, SqlValue::Integer(i)) => Value::Int64(*i),
        (FieldType::Bytes, SqlValue::Blob(bytes)) => Value::Bytes(bytes.clone()),
        (
            FieldType::Array { .. } | FieldType::Object { .. } | FieldType::Union { .. },
            SqlValue::Text(json),
        ) => {
            let parsed: JsonValue =
                serde_json::from_str(json).map_err(|err| SchemaError::TypeMismatch {
                    field: field.to_string(),
                    expected: def.field_type.type_name().to_string(),
                    actual: format!("malformed JSON ({})", err),
                })?;
            value_from_json(&parsed, field).map_err(|err| SchemaError::TypeMismatch {
                field: field.to_string(),
                expected: def.field_type.type_name().to_string(),
                actual: err.to_string(),
            })?
        }
        (FieldType::Literal { .. }, SqlValue::Text(s)) => Value::String(s.clone()),
        (FieldType::Literal { .. }, SqlValue::Real(f)) => Value::Float(*f),
        (FieldType::Literal { .. }, SqlValue::Integer(i)) => Value::Bool(*i != 0),
        (expected, actual) => {
            return Err(SchemaError::TypeMismatch {
                field: field.to_string(),
                expected: expected.type_name().to_string(),
                actual: actual.storage_class().to_string(),
            })
        }
    };
    Ok(Some(value))
}

/// Stores a literal-typed value after checking it equals the declared literal.
fn literal_to_storage(field: &str, literal: &JsonValue, actual: &Value) -> SchemaResult<SqlValue> {
    let matches = match (literal, actual) {
        (JsonValue::String(l), Value::String(a)) => l == a,
        (JsonValue::Number(l), Value::Float(a)) => l.as_f64() == Some(*a),
        (JsonValue::Bool(l), Value::Bool(a)) => l == a,
        _ => false,
    };
    if !matches {
        return Err(SchemaError::TypeMismatch {
            field: field.to_string(),
            expected: format!("literal {}", literal),
            actual: actual.type_name().to_string(),
        });
    }
    match actual {
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Float(f) => Ok(SqlValue::Real(*f)),
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        _ => unreachable!("literal match guarantees a scalar"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_column_type_mapping() {
        let cases = vec![
            (FieldType::String, ColumnType::Text),
            (FieldType::Number, ColumnType::Real),
            (FieldType::Float64, ColumnType::Real),
            (FieldType::Boolean, ColumnType::Integer),
            (FieldType::Int64, ColumnType::Integer),
            (FieldType::Bytes, ColumnType::Blob),
            (FieldType::id("users"), ColumnType::Text),
            (FieldType::array(FieldType::String), ColumnType::Text),
            (FieldType::Null, ColumnType::Text),
        ];
        for (field_type, expected) in cases {
            let def = FieldDef::required(field_type);
            assert_eq!(column_type(&def).unwrap(), expected);
        }
    }

    #[test]
    fn test_literal_column_follows_value_type() {
        let text = FieldDef::required(FieldType::Literal {
            value: json!("draft"),
        });
        assert_eq!(column_type(&text).unwrap(), ColumnType::Text);

        let num = FieldDef::required(FieldType::Literal { value: json!(3.5) });
        assert_eq!(column_type(&num).unwrap(), ColumnType::Real);

        let flag = FieldDef::required(FieldType::Literal { value: json!(true) });
        assert_eq!(column_type(&flag).unwrap(), ColumnType::Integer);

        let bad = FieldDef::required(FieldType::Literal { value: json!([1]) });
        assert!(matches!(
            column_type(&bad),
            Err(SchemaError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_boolean_roundtrip() {
        let def = FieldDef::required(FieldType::Boolean);
        let stored = to_storage_value("active", &def, Some(&Value::Bool(true))).unwrap();
        assert_eq!(stored, SqlValue::Integer(1));
        let back = from_storage_value("active", &def, &stored).unwrap();
        assert_eq!(back, Some(Value::Bool(true)));
    }

    #[test]
    fn test_object_stored_as_json_text() {
        let def = FieldDef::required(FieldType::Object { fields: vec![] });
        let mut map = BTreeMap::new();
        map.insert("n".to_string(), Value::Int64(5));
        let value = Value::Object(map);

        let stored = to_storage_value("meta", &def, Some(&value)).unwrap();
        let SqlValue::Text(json) = &stored else {
            panic!("expected TEXT storage");
        };
        assert!(json.contains("bigint"));

        let back = from_storage_value("meta", &def, &stored).unwrap();
        assert_eq!(back, Some(value));
    }

    #[test]
    fn test_required_field_rejects_absence() {
        let def = FieldDef::required(FieldType::String);
        let err = to_storage_value("name", &def, None).unwrap_err();
        assert!(matches!(err, SchemaError::RequiredField { .. }));

        let err = to_storage_value("name", &def, Some(&Value::Null)).unwrap_err();
        assert!(matches!(err, SchemaError::RequiredField { .. }));
    }

    #[test]
    fn test_optional_field_maps_to_null() {
        let def = FieldDef::optional(FieldType::Number);
        assert_eq!(to_storage_value("age", &def, None).unwrap(), SqlValue::Null);
        assert_eq!(from_storage_value("age", &def, &SqlValue::Null).unwrap(), None);
    }

    #[test]
    fn test_type_mismatch_names_field() {
        let def = FieldDef::required(FieldType::Int64);
        let err = to_storage_value("count", &def, Some(&Value::String("x".into()))).unwrap_err();
        let display = format!("{}", err);
        assert!(display.contains("count"));
        assert!(display.contains("int64"));
    }
}
