//! Migration plan types

use serde::{Deserialize, Serialize};

use crate::schema::{FieldDef, IndexDef, TableSchema};

/// A single schema-change operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MigrationOp {
    /// Adds a column to an existing typed table
    AddColumn {
        table: String,
        field: String,
        def: FieldDef,
    },
    /// Drops a column from an existing typed table
    DropColumn { table: String, field: String },
    /// Creates a table from a complete embedded schema
    CreateTable { schema: TableSchema },
    /// Drops a table and its document-index entries
    DropTable { table: String },
    /// Creates a secondary index
    CreateIndex { table: String, index: IndexDef },
    /// Drops a secondary index by its declared (unprefixed) name
    DropIndex { table: String, index: String },
}

/// An ordered list of operations taking the schema from one version to the
/// next, preconditioned on the caller's believed current version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Version the caller believes is current
    pub from_version: i64,
    /// Version after a successful apply; must be `from_version + 1`
    pub to_version: i64,
    /// Operations applied as one atomic unit
    pub operations: Vec<MigrationOp>,
    /// Optional content hash the caller recorded for `from_version`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_schema_hash: Option<String>,
}

impl MigrationPlan {
    /// A plan stepping from `from_version` with the given operations.
    pub fn new(from_version: i64, operations: Vec<MigrationOp>) -> Self {
        Self {
            from_version,
            to_version: from_version + 1,
            operations,
            expected_schema_hash: None,
        }
    }

    /// Attaches the schema hash the caller expects for `from_version`.
    pub fn with_expected_hash(mut self, hash: impl Into<String>) -> Self {
        self.expected_schema_hash = Some(hash.into());
        self
    }
}
