//! Schema compilation to DDL
//!
//! Validates a table schema and emits the table-creation and index-creation
//! statements. Validation order: table name (non-empty, not reserved,
//! identifier pattern), field names, id-reference targets, index field
//! references.

use std::sync::OnceLock;

use regex::Regex;

use super::errors::{SchemaError, SchemaResult};
use super::mapper::column_type;
use super::types::{FieldDef, FieldType, IndexDef, TableSchema};
use crate::value::{FIELD_CREATION_TIME, FIELD_ID};

/// Tables the engine reserves for its own bookkeeping
pub const RESERVED_TABLES: &[&str] = &["_meta", "_documents", "_schema_versions"];

/// Leading system column holding the document id
pub const COL_ID: &str = "id";
/// Leading system column holding the creation timestamp
pub const COL_CREATION_TIME: &str = "creationTime";

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").expect("static pattern"))
}

/// Returns whether `name` is a legal table/field identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    identifier_pattern().is_match(name)
}

/// Validates a table name against the reserved set and identifier pattern.
pub fn validate_table_name(name: &str) -> SchemaResult<()> {
    if name.is_empty() {
        return Err(SchemaError::EmptyTableName);
    }
    if RESERVED_TABLES.contains(&name) {
        return Err(SchemaError::ReservedTable(name.to_string()));
    }
    if !is_valid_identifier(name) {
        return Err(SchemaError::InvalidTableName(name.to_string()));
    }
    Ok(())
}

/// Validates a full table schema without emitting anything.
pub fn validate_table_schema(schema: &TableSchema) -> SchemaResult<()> {
    validate_table_name(&schema.name)?;

    for (field, def) in &schema.fields {
        if field.starts_with('_') || !is_valid_identifier(field) {
            return Err(SchemaError::InvalidFieldName {
                table: schema.name.clone(),
                field: field.clone(),
            });
        }
        if let FieldType::Id { table } = &def.field_type {
            if table.is_none() {
                return Err(SchemaError::MissingTableReference {
                    table: schema.name.clone(),
                    field: field.clone(),
                });
            }
        }
    }

    for index in &schema.indexes {
        if index.name.is_empty() || !is_valid_identifier(&index.name) {
            return Err(SchemaError::InvalidIndexName {
                table: schema.name.clone(),
                index: index.name.clone(),
            });
        }
        for field in &index.fields {
            let is_system = field == FIELD_ID || field == FIELD_CREATION_TIME;
            if !is_system && schema.field(field).is_none() {
                return Err(SchemaError::UnknownIndexField {
                    table: schema.name.clone(),
                    index: index.name.clone(),
                    field: field.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Compiles a validated schema into its CREATE TABLE statement.
///
/// Emitted layout: `id TEXT PRIMARY KEY`, `creationTime INTEGER NOT NULL`,
/// then one column per declared field in declaration order.
pub fn compile_create_table(schema: &TableSchema) -> SchemaResult<String> {
    validate_table_schema(schema)?;

    let mut columns = vec![
        format!("{} TEXT PRIMARY KEY", quote(COL_ID)),
        format!("{} INTEGER NOT NULL", quote(COL_CREATION_TIME)),
    ];
    for (field, def) in &schema.fields {
        columns.push(compile_column(field, def)?);
    }

    Ok(format!(
        "CREATE TABLE {} ({})",
        quote(&schema.name),
        columns.join(", ")
    ))
}

/// Compiles one declared field into its column definition.
pub fn compile_column(field: &str, def: &FieldDef) -> SchemaResult<String> {
    let column = column_type(def)?;
    let mut decl = format!("{} {}", quote(field), column.sql());

    match &def.field_type {
        FieldType::Null => decl.push_str(" DEFAULT NULL"),
        FieldType::Id { .. } => {
            if !def.optional {
                decl.push_str(" NOT NULL");
            }
            // id references must stay textual even under SQLite type affinity
            decl.push_str(&format!(
                " CHECK (typeof({}) = 'text' OR {} IS NULL)",
                quote(field),
                quote(field)
            ));
        }
        _ => {
            if !def.optional {
                decl.push_str(" NOT NULL");
            }
        }
    }
    Ok(decl)
}

/// Compiles an index definition into its CREATE INDEX statement.
pub fn compile_create_index(table: &str, index: &IndexDef) -> SchemaResult<String> {
    let columns: Vec<String> = index
        .fields
        .iter()
        .map(|field| quote(storage_column(field)))
        .collect();
    let unique = if index.unique { "UNIQUE " } else { "" };
    Ok(format!(
        "CREATE {}INDEX {} ON {} ({})",
        unique,
        quote(&index.realized_name(table)),
        quote(table),
        columns.join(", ")
    ))
}

/// Maps a caller-visible field name to its storage column.
pub fn storage_column(field: &str) -> &str {
    if field == FIELD_ID {
        COL_ID
    } else if field == FIELD_CREATION_TIME {
        COL_CREATION_TIME
    } else {
        field
    }
}

/// Quotes an identifier for SQL.
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::FieldDef;

    fn users_schema() -> TableSchema {
        TableSchema::new("users")
            .with_field("name", FieldDef::required(FieldType::String))
            .with_field("age", FieldDef::optional(FieldType::Number))
            .with_field("manager", FieldDef::optional(FieldType::id("users")))
            .with_index(IndexDef::new("by_age", vec!["age"]))
    }

    #[test]
    fn test_create_table_layout() {
        let ddl = compile_create_table(&users_schema()).unwrap();
        assert!(ddl.starts_with("CREATE TABLE \"users\""));
        assert!(ddl.contains("\"id\" TEXT PRIMARY KEY"));
        assert!(ddl.contains("\"creationTime\" INTEGER NOT NULL"));
        assert!(ddl.contains("\"name\" TEXT NOT NULL"));
        assert!(ddl.contains("\"age\" REAL"));
        // declaration order preserved
        let name_pos = ddl.find("\"name\"").unwrap();
        let age_pos = ddl.find("\"age\"").unwrap();
        assert!(name_pos < age_pos);
    }

    #[test]
    fn test_id_column_gets_check() {
        let ddl = compile_create_table(&users_schema()).unwrap();
        assert!(ddl.contains("CHECK (typeof(\"manager\") = 'text' OR \"manager\" IS NULL)"));
    }

    #[test]
    fn test_create_index_names() {
        let idx = IndexDef::unique("by_email", vec!["email"]);
        let ddl = compile_create_index("users", &idx).unwrap();
        assert_eq!(
            ddl,
            "CREATE UNIQUE INDEX \"users_by_email\" ON \"users\" (\"email\")"
        );
    }

    #[test]
    fn test_index_on_system_fields() {
        let schema = TableSchema::new("events")
            .with_index(IndexDef::new("by_time", vec!["_creationTime"]));
        assert!(validate_table_schema(&schema).is_ok());

        let idx = &schema.indexes[0];
        let ddl = compile_create_index("events", idx).unwrap();
        assert!(ddl.contains("\"creationTime\""));
    }

    #[test]
    fn test_reserved_table_rejected() {
        let schema = TableSchema::new("_documents");
        assert!(matches!(
            validate_table_schema(&schema),
            Err(SchemaError::ReservedTable(_))
        ));
    }

    #[test]
    fn test_bad_table_name_rejected() {
        assert!(matches!(
            validate_table_name(""),
            Err(SchemaError::EmptyTableName)
        ));
        assert!(matches!(
            validate_table_name("no-dashes"),
            Err(SchemaError::InvalidTableName(_))
        ));
        assert!(matches!(
            validate_table_name("1starts_with_digit"),
            Err(SchemaError::InvalidTableName(_))
        ));
        assert!(validate_table_name("_leading_underscore_ok").is_ok());
    }

    #[test]
    fn test_underscore_field_rejected() {
        let schema =
            TableSchema::new("users").with_field("_hidden", FieldDef::required(FieldType::String));
        assert!(matches!(
            validate_table_schema(&schema),
            Err(SchemaError::InvalidFieldName { .. })
        ));
    }

    #[test]
    fn test_id_without_table_reference_rejected() {
        let schema = TableSchema::new("posts")
            .with_field("author", FieldDef::required(FieldType::Id { table: None }));
        let err = validate_table_schema(&schema).unwrap_err();
        assert!(matches!(err, SchemaError::MissingTableReference { .. }));
        assert!(format!("{}", err).contains("author"));
    }

    #[test]
    fn test_index_on_unknown_field_rejected() {
        let schema = TableSchema::new("users")
            .with_field("name", FieldDef::required(FieldType::String))
            .with_index(IndexDef::new("by_email", vec!["email"]));
        let err = validate_table_schema(&schema).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownIndexField { .. }));
        let display = format!("{}", err);
        assert!(display.contains("by_email"));
        assert!(display.contains("email"));
    }
}
