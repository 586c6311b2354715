//! Schema type definitions
//!
//! A table schema declares a field map plus a list of secondary indexes.
//! Fields are kept in declaration order because column order in the emitted
//! DDL follows it.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Supported field types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 string
    String,
    /// 64-bit floating point
    Number,
    /// Boolean
    Boolean,
    /// 64-bit signed integer
    Int64,
    /// 64-bit floating point (alias kept distinct for declarations)
    Float64,
    /// Raw byte buffer
    Bytes,
    /// Reference to a document in another table
    Id {
        /// Referenced table; must be present for a schema to compile
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table: Option<String>,
    },
    /// Homogeneous array
    Array {
        /// Element type (boxed to allow recursion)
        element: Box<FieldType>,
    },
    /// Nested object with its own field schema
    Object {
        /// Nested field definitions, declaration-ordered
        fields: Vec<(String, FieldDef)>,
    },
    /// Union of several possible types
    Union {
        /// Allowed variants
        variants: Vec<FieldType>,
    },
    /// A single literal value
    Literal {
        /// The literal itself (string, number, or boolean)
        value: JsonValue,
    },
    /// Always-null field
    Null,
}

impl FieldType {
    /// Returns the type tag for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Int64 => "int64",
            FieldType::Float64 => "float64",
            FieldType::Bytes => "bytes",
            FieldType::Id { .. } => "id",
            FieldType::Array { .. } => "array",
            FieldType::Object { .. } => "object",
            FieldType::Union { .. } => "union",
            FieldType::Literal { .. } => "literal",
            FieldType::Null => "null",
        }
    }

    /// An `id` field referencing `table`
    pub fn id(table: impl Into<String>) -> Self {
        FieldType::Id {
            table: Some(table.into()),
        }
    }

    /// An array of `element`
    pub fn array(element: FieldType) -> Self {
        FieldType::Array {
            element: Box::new(element),
        }
    }
}

/// A declared field: type plus optionality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field data type
    #[serde(flatten)]
    pub field_type: FieldType,
    /// Whether the field may be absent
    pub optional: bool,
}

impl FieldDef {
    /// A required field of the given type
    pub fn required(field_type: FieldType) -> Self {
        Self {
            field_type,
            optional: false,
        }
    }

    /// An optional field of the given type
    pub fn optional(field_type: FieldType) -> Self {
        Self {
            field_type,
            optional: true,
        }
    }
}

/// A secondary index over one or more fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name, unique within its table
    pub name: String,
    /// Ordered (compound) field list
    pub fields: Vec<String>,
    /// Whether the index enforces uniqueness
    pub unique: bool,
}

impl IndexDef {
    /// A non-unique index
    pub fn new(name: impl Into<String>, fields: Vec<&str>) -> Self {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(String::from).collect(),
            unique: false,
        }
    }

    /// A unique index
    pub fn unique(name: impl Into<String>, fields: Vec<&str>) -> Self {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(String::from).collect(),
            unique: true,
        }
    }

    /// Realized index name, prefixed to avoid cross-table collisions
    pub fn realized_name(&self, table: &str) -> String {
        format!("{}_{}", table, self.name)
    }
}

/// A complete table schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name
    pub name: String,
    /// Declaration-ordered field definitions
    pub fields: Vec<(String, FieldDef)>,
    /// Secondary indexes
    pub indexes: Vec<IndexDef>,
}

impl TableSchema {
    /// Creates an empty schema for `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Appends a field declaration
    pub fn with_field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.push((name.into(), def));
        self
    }

    /// Appends an index declaration
    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Looks up a declared field by name
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, def)| def)
    }
}

/// A full database schema: every table the caller declares
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatabaseSchema {
    /// Declared tables
    pub tables: Vec<TableSchema>,
}

impl DatabaseSchema {
    /// Creates a schema from a table list
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }
}
