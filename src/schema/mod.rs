//! Declarative table schemas
//!
//! Schema types, the type mapper between declared field types and storage
//! columns, the DDL compiler, and canonical schema hashing.

pub mod compiler;
mod errors;
pub mod hash;
pub mod mapper;
mod types;

pub use compiler::{
    compile_create_index, compile_create_table, validate_table_name, validate_table_schema,
    RESERVED_TABLES,
};
pub use errors::{SchemaError, SchemaResult};
pub use hash::schema_hash;
pub use types::{DatabaseSchema, FieldDef, FieldType, IndexDef, TableSchema};
