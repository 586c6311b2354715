//! Documents and id generation

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use serde_json::Value as JsonValue;

use crate::value::codec::{fields_to_json, value_to_json};
use crate::value::{Fields, Value, FIELD_CREATION_TIME, FIELD_ID};

/// Number of random bytes in a document id
const ID_BYTES: usize = 16;

/// A stored document: immutable system fields plus user fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Engine-generated id, unique within its table
    pub id: String,
    /// Server-assigned creation timestamp, unix milliseconds
    pub creation_time: i64,
    /// User fields
    pub fields: Fields,
}

impl Document {
    /// Resolves a field by caller-visible name, including the two system
    /// fields `_id` and `_creationTime`.
    pub fn field_value(&self, name: &str) -> Option<Value> {
        if name == FIELD_ID {
            return Some(Value::String(self.id.clone()));
        }
        if name == FIELD_CREATION_TIME {
            return Some(Value::Float(self.creation_time as f64));
        }
        self.fields.get(name).cloned()
    }

    /// Caller-facing JSON form: system fields merged with tagged user fields.
    pub fn to_json(&self) -> JsonValue {
        let mut obj = fields_to_json(&self.fields);
        obj.insert(FIELD_ID.to_string(), JsonValue::String(self.id.clone()));
        obj.insert(
            FIELD_CREATION_TIME.to_string(),
            value_to_json(&Value::Float(self.creation_time as f64)),
        );
        JsonValue::Object(obj)
    }
}

/// Generates a fresh document id: 16 random bytes, URL-safe base64, no
/// padding.
pub fn generate_id() -> String {
    let mut bytes = [0u8; ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Current unix millisecond timestamp.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
