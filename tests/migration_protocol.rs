//! Migration Protocol Tests
//!
//! Version discipline and atomicity through the public handle:
//! - Versions advance one at a time from the recorded current version
//! - The optional schema-hash gate rejects divergent histories
//! - A failing plan leaves no trace: no DDL, no version row
//! - Applied schemas and data survive a close-and-reopen

use docbase::migration::{MigrationOp, MigrationPlan};
use docbase::schema::hash::schema_hash;
use docbase::schema::{DatabaseSchema, FieldDef, FieldType, TableSchema};
use docbase::storage::SqliteConfig;
use docbase::value::Value;
use docbase::Database;
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn db() -> Database {
    Database::open_in_memory().unwrap()
}

fn users_schema() -> DatabaseSchema {
    DatabaseSchema::new(vec![TableSchema::new("users")
        .with_field("name", FieldDef::required(FieldType::String))
        .with_field("age", FieldDef::optional(FieldType::Number))])
}

// =============================================================================
// Version Discipline
// =============================================================================

/// A fresh database sits at version 0; each apply advances by exactly one.
#[test]
fn test_versions_advance_one_at_a_time() {
    let db = db();
    assert_eq!(db.schema_version().unwrap(), 0);

    db.apply_schema(&users_schema()).unwrap();
    assert_eq!(db.schema_version().unwrap(), 1);

    let plan = MigrationPlan::new(
        1,
        vec![MigrationOp::AddColumn {
            table: "users".into(),
            field: "email".into(),
            def: FieldDef::optional(FieldType::String),
        }],
    );
    db.apply_migration(&plan).unwrap();
    assert_eq!(db.schema_version().unwrap(), 2);
}

/// A plan built against a stale version is rejected before anything runs.
#[test]
fn test_stale_from_version_rejected() {
    let db = db();
    db.apply_schema(&users_schema()).unwrap();

    let stale = MigrationPlan::new(
        0,
        vec![MigrationOp::DropTable {
            table: "users".into(),
        }],
    );
    assert!(db.apply_migration(&stale).is_err());
    assert!(db.list_tables().unwrap().contains(&"users".to_string()));
    assert_eq!(db.schema_version().unwrap(), 1);
}

/// The hash gate lets a correct expectation through and stops a wrong one.
#[test]
fn test_schema_hash_gate() {
    let db = db();
    let schema = users_schema();
    db.apply_schema(&schema).unwrap();

    let wrong = MigrationPlan::new(1, vec![]).with_expected_hash("deadbeef");
    assert!(db.apply_migration(&wrong).is_err());
    assert_eq!(db.schema_version().unwrap(), 1);

    let right = MigrationPlan::new(1, vec![]).with_expected_hash(schema_hash(&schema));
    db.apply_migration(&right).unwrap();
    assert_eq!(db.schema_version().unwrap(), 2);
}

/// History records one row per applied version, oldest first.
#[test]
fn test_history_is_complete_and_ordered() {
    let db = db();
    db.apply_schema(&users_schema()).unwrap();
    db.apply_migration(&MigrationPlan::new(1, vec![])).unwrap();

    let history = db.schema_history().unwrap();
    let versions: Vec<i64> = history.iter().map(|entry| entry.version).collect();
    assert_eq!(versions, vec![1, 2]);
    assert!(history.iter().all(|entry| !entry.schema_hash.is_empty()));
    assert!(history.iter().all(|entry| entry.applied_at > 0));
}

// =============================================================================
// Atomicity
// =============================================================================

/// When one operation in a plan fails, none of them happened.
#[test]
fn test_failed_plan_leaves_no_trace() {
    let db = db();
    db.apply_schema(&users_schema()).unwrap();
    let id = db
        .insert("users", &json!({"name": "Alice", "age": 30}))
        .unwrap();

    // the second operation fails: a required column cannot be added to a
    // table without a default
    let plan = MigrationPlan::new(
        1,
        vec![
            MigrationOp::AddColumn {
                table: "users".into(),
                field: "nickname".into(),
                def: FieldDef::optional(FieldType::String),
            },
            MigrationOp::AddColumn {
                table: "users".into(),
                field: "mandatory".into(),
                def: FieldDef::required(FieldType::String),
            },
        ],
    );
    assert!(db.apply_migration(&plan).is_err());

    // version untouched, data untouched, first column absent
    assert_eq!(db.schema_version().unwrap(), 1);
    let doc = db.get("users", &id).unwrap().unwrap();
    assert_eq!(doc.fields.get("name"), Some(&Value::String("Alice".into())));
    assert!(db
        .insert("users", &json!({"name": "Bob", "nickname": "b"}))
        .is_err());
}

/// Dropping a table removes its documents from lookup.
#[test]
fn test_drop_table_removes_documents() {
    let db = db();
    db.apply_schema(&users_schema()).unwrap();
    let id = db.insert("users", &json!({"name": "Alice"})).unwrap();

    let plan = MigrationPlan::new(
        1,
        vec![MigrationOp::DropTable {
            table: "users".into(),
        }],
    );
    db.apply_migration(&plan).unwrap();

    assert!(!db.list_tables().unwrap().contains(&"users".to_string()));
    assert!(db.get("users", &id).unwrap().is_none());
}

// =============================================================================
// Persistence
// =============================================================================

/// Schema version, table layouts, and documents all survive a reopen.
#[test]
fn test_reopen_restores_everything() {
    let dir = TempDir::new().unwrap();
    let config = SqliteConfig::new(dir.path().join("unit.db"));

    let id = {
        let db = Database::open(&config).unwrap();
        db.apply_schema(&users_schema()).unwrap();
        db.insert("users", &json!({"name": "Alice", "age": 30}))
            .unwrap()
    };

    let db = Database::open(&config).unwrap();
    assert_eq!(db.schema_version().unwrap(), 1);
    assert_eq!(db.list_tables().unwrap(), vec!["users"]);

    let doc = db.get("users", &id).unwrap().unwrap();
    assert_eq!(doc.fields.get("name"), Some(&Value::String("Alice".into())));
    assert_eq!(doc.fields.get("age"), Some(&Value::Float(30.0)));

    // the restored layout is still typed: undeclared fields stay rejected
    assert!(db.insert("users", &json!({"ghost": 1})).is_err());
}
