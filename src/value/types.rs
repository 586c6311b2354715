//! Document value model
//!
//! The restricted value shape legal for document fields:
//! strings, finite 64-bit floats, booleans, null, tagged 64-bit integers,
//! raw byte buffers, ordered lists, and string-keyed maps.

use std::collections::BTreeMap;

/// Wire tag for integer values in encoded documents
pub const TAG_BIGINT: &str = "bigint";
/// Wire tag for raw byte buffers in encoded documents
pub const TAG_BYTES: &str = "arraybuffer";
/// Key carrying the wire tag inside a wrapper object
pub const TAG_KEY: &str = "__type";

/// A validated document field value.
///
/// Floats are always finite; the validator rejects NaN and infinities
/// before a `Value` is ever constructed from caller input.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit null
    Null,
    /// Boolean
    Bool(bool),
    /// Finite 64-bit float
    Float(f64),
    /// Tagged 64-bit integer (wire form `{"__type":"bigint","value":"<decimal>"}`)
    Int64(i64),
    /// UTF-8 string
    String(String),
    /// Raw byte buffer (wire form `{"__type":"arraybuffer","value":[...]}`)
    Bytes(Vec<u8>),
    /// Ordered list of values
    Array(Vec<Value>),
    /// String-keyed map of values
    Object(BTreeMap<String, Value>),
}

/// A document's user field map
pub type Fields = BTreeMap<String, Value>;

impl Value {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Float(_) => "number",
            Value::Int64(_) => "int64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int64(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
