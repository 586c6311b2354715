//! Migration application
//!
//! Applies an ordered operation list as one atomic unit:
//! `Idle -> Validating -> Applying -> Committed | RolledBack`.
//!
//! Validating rejects version conflicts and schema-hash mismatches before
//! any storage mutation. Applying wraps every operation in one storage
//! transaction; a single failure rolls the whole transaction back and
//! surfaces the underlying storage error unchanged. Each successful apply
//! records exactly one new version row.

use std::sync::Arc;

use chrono::Utc;

use super::errors::{MigrationError, MigrationResult};
use super::types::{MigrationOp, MigrationPlan};
use crate::catalog::{Catalog, TableLayout};
use crate::observability::{Logger, Severity};
use crate::schema::compiler::{self, quote};
use crate::schema::hash::{hash_canonical, schema_hash};
use crate::schema::{DatabaseSchema, SchemaError, TableSchema};
use crate::storage::Substrate;

/// Applies migration plans and full schemas against one storage unit
pub struct MigrationEngine {
    substrate: Arc<dyn Substrate>,
    catalog: Arc<Catalog>,
}

impl MigrationEngine {
    /// Creates an engine over a substrate and its catalog.
    pub fn new(substrate: Arc<dyn Substrate>, catalog: Arc<Catalog>) -> Self {
        Self { substrate, catalog }
    }

    /// Applies a migration plan.
    pub fn apply_migration(&self, plan: &MigrationPlan) -> MigrationResult<()> {
        self.catalog.ensure_initialized()?;
        self.validate_plan(plan)?;

        let hash = hash_canonical(&plan.operations);
        self.apply_operations(&plan.operations, plan.to_version, &hash)?;

        Logger::log(
            Severity::Info,
            "migration_applied",
            &[
                ("version", &plan.to_version.to_string()),
                ("operations", &plan.operations.len().to_string()),
            ],
        );
        Ok(())
    }

    /// Applies a full database schema, creating every declared table, and
    /// records the canonical schema hash as the next version.
    pub fn apply_schema(&self, schema: &DatabaseSchema) -> MigrationResult<()> {
        self.catalog.ensure_initialized()?;

        let operations: Vec<MigrationOp> = schema
            .tables
            .iter()
            .map(|table| MigrationOp::CreateTable {
                schema: table.clone(),
            })
            .collect();
        for op in &operations {
            self.validate_op(op)?;
        }

        let to_version = self.catalog.current_version()? + 1;
        let hash = schema_hash(schema);
        self.apply_operations(&operations, to_version, &hash)?;

        Logger::log(
            Severity::Info,
            "schema_applied",
            &[
                ("version", &to_version.to_string()),
                ("tables", &schema.tables.len().to_string()),
            ],
        );
        Ok(())
    }

    /// Validating phase: version precondition, hash gate, per-op checks.
    /// Runs entirely before any storage mutation.
    fn validate_plan(&self, plan: &MigrationPlan) -> MigrationResult<()> {
        let current = self.catalog.current_version()?;
        if plan.from_version != current {
            return Err(MigrationError::VersionConflict {
                expected: plan.from_version,
                current,
            });
        }
        if plan.to_version != plan.from_version + 1 {
            return Err(MigrationError::InvalidTargetVersion {
                from: plan.from_version,
                to: plan.to_version,
            });
        }
        if let Some(expected) = &plan.expected_schema_hash {
            let recorded = self
                .catalog
                .version_hash(plan.from_version)?
                .unwrap_or_default();
            if expected != &recorded {
                return Err(MigrationError::SchemaHashMismatch {
                    version: plan.from_version,
                    expected: expected.clone(),
                    recorded,
                });
            }
        }
        for op in &plan.operations {
            self.validate_op(op)?;
        }
        Ok(())
    }

    fn validate_op(&self, op: &MigrationOp) -> MigrationResult<()> {
        match op {
            MigrationOp::CreateTable { schema } => {
                compiler::validate_table_schema(schema)?;
                if self.catalog.has_table(&schema.name) {
                    return Err(MigrationError::DuplicateTable(schema.name.clone()));
                }
            }
            MigrationOp::DropTable { table } => {
                self.require_table(table)?;
            }
            MigrationOp::AddColumn { table, field, def } => {
                self.require_typed(table)?;
                // compiles the column up front so bad names/types fail here
                compiler::compile_column(field, def)?;
                if field.starts_with('_') || !compiler::is_valid_identifier(field) {
                    return Err(SchemaError::InvalidFieldName {
                        table: table.clone(),
                        field: field.clone(),
                    }
                    .into());
                }
            }
            MigrationOp::DropColumn { table, field } => {
                let schema = self.require_typed(table)?;
                if schema.field(field).is_none() {
                    return Err(SchemaError::UndeclaredField {
                        table: table.clone(),
                        field: field.clone(),
                    }
                    .into());
                }
            }
            MigrationOp::CreateIndex { table, index } => {
                let schema = self.require_typed(table)?;
                let probe = TableSchema {
                    name: schema.name.clone(),
                    fields: schema.fields.clone(),
                    indexes: vec![index.clone()],
                };
                compiler::validate_table_schema(&probe)?;
            }
            MigrationOp::DropIndex { table, .. } => {
                self.require_table(table)?;
            }
        }
        Ok(())
    }

    /// Applying + Committed phases. Rolls back on any operation failure.
    fn apply_operations(
        &self,
        operations: &[MigrationOp],
        to_version: i64,
        hash: &str,
    ) -> MigrationResult<()> {
        self.substrate.begin()?;

        for op in operations {
            if let Err(err) = self.execute_op(op) {
                let _ = self.substrate.rollback();
                Logger::log(
                    Severity::Warn,
                    "migration_rolled_back",
                    &[("reason", &err.to_string())],
                );
                return Err(err);
            }
        }
        if let Err(err) = self
            .catalog
            .record_version(to_version, Utc::now().timestamp_millis(), hash)
        {
            let _ = self.substrate.rollback();
            return Err(err.into());
        }
        self.substrate.commit()?;

        // registry updates only after the transaction is durable
        for op in operations {
            self.update_catalog(op)?;
        }
        Ok(())
    }

    fn execute_op(&self, op: &MigrationOp) -> MigrationResult<()> {
        match op {
            MigrationOp::CreateTable { schema } => {
                let ddl = compiler::compile_create_table(schema)?;
                self.substrate.execute(&ddl, &[])?;
                for index in &schema.indexes {
                    let ddl = compiler::compile_create_index(&schema.name, index)?;
                    self.substrate.execute(&ddl, &[])?;
                }
            }
            MigrationOp::DropTable { table } => {
                self.substrate
                    .execute(&format!("DROP TABLE {}", quote(table)), &[])?;
                self.catalog.index_remove_table(table)?;
            }
            MigrationOp::AddColumn { table, field, def } => {
                let column = compiler::compile_column(field, def)?;
                self.substrate.execute(
                    &format!("ALTER TABLE {} ADD COLUMN {}", quote(table), column),
                    &[],
                )?;
            }
            MigrationOp::DropColumn { table, field } => {
                self.substrate.execute(
                    &format!("ALTER TABLE {} DROP COLUMN {}", quote(table), quote(field)),
                    &[],
                )?;
            }
            MigrationOp::CreateIndex { table, index } => {
                let ddl = compiler::compile_create_index(table, index)?;
                self.substrate.execute(&ddl, &[])?;
            }
            MigrationOp::DropIndex { table, index } => {
                self.substrate.execute(
                    &format!("DROP INDEX {}", quote(&format!("{}_{}", table, index))),
                    &[],
                )?;
            }
        }
        Ok(())
    }

    /// Mirrors a committed operation into the in-memory catalog.
    fn update_catalog(&self, op: &MigrationOp) -> MigrationResult<()> {
        match op {
            MigrationOp::CreateTable { schema } => {
                self.catalog.register_table(
                    &schema.name,
                    TableLayout::Typed {
                        schema: schema.clone(),
                    },
                )?;
            }
            MigrationOp::DropTable { table } => {
                self.catalog.forget_table(table)?;
            }
            MigrationOp::AddColumn { table, field, def } => {
                if let Some(mut schema) = self.typed_schema(table) {
                    schema.fields.push((field.clone(), def.clone()));
                    self.catalog
                        .register_table(table, TableLayout::Typed { schema })?;
                }
            }
            MigrationOp::DropColumn { table, field } => {
                if let Some(mut schema) = self.typed_schema(table) {
                    schema.fields.retain(|(name, _)| name != field);
                    self.catalog
                        .register_table(table, TableLayout::Typed { schema })?;
                }
            }
            MigrationOp::CreateIndex { table, index } => {
                if let Some(mut schema) = self.typed_schema(table) {
                    schema.indexes.push(index.clone());
                    self.catalog
                        .register_table(table, TableLayout::Typed { schema })?;
                }
            }
            MigrationOp::DropIndex { table, index } => {
                if let Some(mut schema) = self.typed_schema(table) {
                    schema.indexes.retain(|idx| &idx.name != index);
                    self.catalog
                        .register_table(table, TableLayout::Typed { schema })?;
                }
            }
        }
        Ok(())
    }

    fn typed_schema(&self, table: &str) -> Option<TableSchema> {
        match self.catalog.table_layout(table) {
            Some(TableLayout::Typed { schema }) => Some(schema),
            _ => None,
        }
    }

    fn require_table(&self, table: &str) -> MigrationResult<()> {
        if !self.catalog.has_table(table) {
            return Err(MigrationError::UnknownTable(table.to_string()));
        }
        Ok(())
    }

    fn require_typed(&self, table: &str) -> MigrationResult<TableSchema> {
        match self.catalog.table_layout(table) {
            Some(TableLayout::Typed { schema }) => Ok(schema),
            Some(TableLayout::Blob) => Err(MigrationError::InvalidOperation(format!(
                "table '{}' has no declared schema; column operations need a typed table",
                table
            ))),
            None => Err(MigrationError::UnknownTable(table.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, FieldType, IndexDef};
    use crate::storage::SqliteSubstrate;

    fn engine() -> MigrationEngine {
        let substrate: Arc<dyn Substrate> = Arc::new(SqliteSubstrate::open_in_memory().unwrap());
        let catalog = Arc::new(Catalog::new(Arc::clone(&substrate)));
        MigrationEngine::new(substrate, catalog)
    }

    fn users_table() -> TableSchema {
        TableSchema::new("users")
            .with_field("name", FieldDef::required(FieldType::String))
            .with_field("age", FieldDef::optional(FieldType::Number))
    }

    #[test]
    fn test_apply_schema_records_one_version() {
        let engine = engine();
        let schema = DatabaseSchema::new(vec![users_table()]);
        engine.apply_schema(&schema).unwrap();

        assert_eq!(engine.catalog.current_version().unwrap(), 1);
        assert!(engine.catalog.has_table("users"));
        assert_eq!(
            engine.catalog.version_hash(1).unwrap(),
            Some(schema_hash(&schema))
        );
    }

    #[test]
    fn test_version_conflict_detected_before_apply() {
        let engine = engine();
        let plan = MigrationPlan::new(
            3,
            vec![MigrationOp::CreateTable {
                schema: users_table(),
            }],
        );
        let err = engine.apply_migration(&plan).unwrap_err();
        assert!(matches!(err, MigrationError::VersionConflict { .. }));
        assert!(!engine.catalog.has_table("users"));
    }

    #[test]
    fn test_skipping_versions_rejected() {
        let engine = engine();
        let mut plan = MigrationPlan::new(0, vec![]);
        plan.to_version = 2;
        let err = engine.apply_migration(&plan).unwrap_err();
        assert!(matches!(err, MigrationError::InvalidTargetVersion { .. }));
    }

    #[test]
    fn test_hash_gate() {
        let engine = engine();
        let schema = DatabaseSchema::new(vec![users_table()]);
        engine.apply_schema(&schema).unwrap();

        let plan = MigrationPlan::new(1, vec![]).with_expected_hash("wrong-hash");
        let err = engine.apply_migration(&plan).unwrap_err();
        assert!(matches!(err, MigrationError::SchemaHashMismatch { .. }));

        let plan = MigrationPlan::new(1, vec![]).with_expected_hash(schema_hash(&schema));
        engine.apply_migration(&plan).unwrap();
        assert_eq!(engine.catalog.current_version().unwrap(), 2);
    }

    #[test]
    fn test_add_and_drop_column() {
        let engine = engine();
        engine
            .apply_schema(&DatabaseSchema::new(vec![users_table()]))
            .unwrap();

        let plan = MigrationPlan::new(
            1,
            vec![MigrationOp::AddColumn {
                table: "users".into(),
                field: "email".into(),
                def: FieldDef::optional(FieldType::String),
            }],
        );
        engine.apply_migration(&plan).unwrap();

        let TableLayout::Typed { schema } = engine.catalog.table_layout("users").unwrap() else {
            panic!("expected typed layout");
        };
        assert!(schema.field("email").is_some());

        let plan = MigrationPlan::new(
            2,
            vec![MigrationOp::DropColumn {
                table: "users".into(),
                field: "email".into(),
            }],
        );
        engine.apply_migration(&plan).unwrap();
        let TableLayout::Typed { schema } = engine.catalog.table_layout("users").unwrap() else {
            panic!("expected typed layout");
        };
        assert!(schema.field("email").is_none());
        assert_eq!(engine.catalog.current_version().unwrap(), 3);
    }

    #[test]
    fn test_failed_operation_rolls_back_everything() {
        let engine = engine();
        engine
            .apply_schema(&DatabaseSchema::new(vec![users_table()]))
            .unwrap();
        engine
            .substrate
            .execute(
                "INSERT INTO users (id, \"creationTime\", name) VALUES ('u1', 0, 'Alice')",
                &[],
            )
            .unwrap();

        // second operation fails: a required column cannot be added to a
        // non-empty table without a default
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
        let err = engine.apply_migration(&plan).unwrap_err();
        assert!(matches!(err, MigrationError::Storage(_)));

        // version history untouched
        assert_eq!(engine.catalog.current_version().unwrap(), 1);
        // first operation rolled back too: the column is not there
        let rows = engine
            .substrate
            .query("SELECT name FROM pragma_table_info('users')", &[])
            .unwrap();
        let columns: Vec<String> = rows
            .into_iter()
            .filter_map(|row| row.into_iter().next()?.as_text().map(String::from))
            .collect();
        assert!(!columns.contains(&"nickname".to_string()));
        // catalog layout unchanged
        let TableLayout::Typed { schema } = engine.catalog.table_layout("users").unwrap() else {
            panic!("expected typed layout");
        };
        assert!(schema.field("nickname").is_none());
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let engine = engine();
        engine
            .apply_schema(&DatabaseSchema::new(vec![users_table()]))
            .unwrap();
        let plan = MigrationPlan::new(
            1,
            vec![MigrationOp::CreateTable {
                schema: users_table(),
            }],
        );
        let err = engine.apply_migration(&plan).unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateTable(_)));
    }

    #[test]
    fn test_create_and_drop_index() {
        let engine = engine();
        engine
            .apply_schema(&DatabaseSchema::new(vec![users_table()]))
            .unwrap();

        let plan = MigrationPlan::new(
            1,
            vec![MigrationOp::CreateIndex {
                table: "users".into(),
                index: IndexDef::unique("by_name", vec!["name"]),
            }],
        );
        engine.apply_migration(&plan).unwrap();

        let plan = MigrationPlan::new(
            2,
            vec![MigrationOp::DropIndex {
                table: "users".into(),
                index: "by_name".into(),
            }],
        );
        engine.apply_migration(&plan).unwrap();
        assert_eq!(engine.catalog.current_version().unwrap(), 3);
    }

    #[test]
    fn test_drop_table_clears_document_index() {
        let engine = engine();
        engine
            .apply_schema(&DatabaseSchema::new(vec![users_table()]))
            .unwrap();
        engine.catalog.index_insert("doc1", "users", 1).unwrap();

        let plan = MigrationPlan::new(
            1,
            vec![MigrationOp::DropTable {
                table: "users".into(),
            }],
        );
        engine.apply_migration(&plan).unwrap();
        assert!(!engine.catalog.has_table("users"));
        assert_eq!(engine.catalog.index_lookup("doc1").unwrap(), None);
    }
}
