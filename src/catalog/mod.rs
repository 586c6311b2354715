//! Catalog bookkeeping
//!
//! Per-storage-unit state: which tables exist (and with which layout), the
//! document-to-table index, and the applied-schema-version history.
//!
//! Initialization is lazy, idempotent, and single-flight: the in-memory
//! state sits behind a mutex, so under concurrent first callers exactly one
//! performs the physical initialization while the rest block and then no-op.
//! On a restart the table set is restored from the durable side-store.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::observability::{Logger, Severity};
use crate::schema::TableSchema;
use crate::storage::{SqlValue, StorageError, StorageResult, Substrate};

/// Side-store key holding the live table-name/layout set
const META_KEY_TABLES: &str = "tables";

/// Reserved document-index table
pub const DOCUMENT_INDEX_TABLE: &str = "_documents";
/// Reserved schema-version history table
pub const SCHEMA_VERSION_TABLE: &str = "_schema_versions";

/// Physical layout of a document table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "lowercase")]
pub enum TableLayout {
    /// Lazily created table: one JSON blob column for all user fields
    Blob,
    /// Schema-declared table: one column per declared field
    Typed {
        /// The declared schema
        schema: TableSchema,
    },
}

/// One applied schema version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Version number, monotonically increasing by 1
    pub version: i64,
    /// Unix millisecond timestamp of the apply
    pub applied_at: i64,
    /// Hash of the definition that produced this version
    pub schema_hash: String,
}

#[derive(Debug, Default)]
struct CatalogState {
    initialized: bool,
    tables: BTreeMap<String, TableLayout>,
}

/// Per-storage-unit catalog
pub struct Catalog {
    substrate: Arc<dyn Substrate>,
    state: Mutex<CatalogState>,
}

impl Catalog {
    /// Creates an uninitialized catalog over a substrate.
    pub fn new(substrate: Arc<dyn Substrate>) -> Self {
        Self {
            substrate,
            state: Mutex::new(CatalogState::default()),
        }
    }

    /// Lazily initializes the catalog. Idempotent and safe under concurrent
    /// first callers; racers wait on the state lock and then no-op.
    pub fn ensure_initialized(&self) -> StorageResult<()> {
        let mut state = self.lock_state()?;
        if state.initialized {
            return Ok(());
        }

        self.substrate.execute(
            "CREATE TABLE IF NOT EXISTS \"_documents\" (\
             id TEXT PRIMARY KEY, \"table\" TEXT NOT NULL, \"creationTime\" INTEGER NOT NULL)",
            &[],
        )?;
        self.substrate.execute(
            "CREATE TABLE IF NOT EXISTS \"_schema_versions\" (\
             version INTEGER PRIMARY KEY, \"appliedAt\" INTEGER NOT NULL, \
             \"schemaHash\" TEXT NOT NULL)",
            &[],
        )?;

        // restart, not a fresh unit: restore the table set
        if let Some(raw) = self.substrate.kv_get(META_KEY_TABLES)? {
            state.tables = serde_json::from_str(&raw).map_err(|err| {
                let detail = err.to_string();
                Logger::log(
                    Severity::Error,
                    "catalog_metadata_corrupted",
                    &[("error", detail.as_str())],
                );
                StorageError::Io(format!("catalog metadata corrupted: {}", err))
            })?;
        }

        state.initialized = true;
        Logger::log(
            Severity::Info,
            "catalog_initialized",
            &[("tables", &state.tables.len().to_string())],
        );
        Ok(())
    }

    /// Returns whether initialization has completed.
    pub fn is_initialized(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.initialized)
            .unwrap_or(false)
    }

    /// Current schema version: the maximum recorded, or 0 when none exists.
    pub fn current_version(&self) -> StorageResult<i64> {
        let rows = self.substrate.query(
            "SELECT MAX(version) FROM \"_schema_versions\"",
            &[],
        )?;
        Ok(rows
            .first()
            .and_then(|row| row.first())
            .and_then(SqlValue::as_integer)
            .unwrap_or(0))
    }

    /// Hash recorded for a specific version, if any.
    pub fn version_hash(&self, version: i64) -> StorageResult<Option<String>> {
        let rows = self.substrate.query(
            "SELECT \"schemaHash\" FROM \"_schema_versions\" WHERE version = ?1",
            &[SqlValue::Integer(version)],
        )?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .and_then(|cell| match cell {
                SqlValue::Text(s) => Some(s),
                _ => None,
            }))
    }

    /// Appends a row to the schema-version history.
    pub fn record_version(&self, version: i64, applied_at: i64, hash: &str) -> StorageResult<()> {
        self.substrate.execute(
            "INSERT INTO \"_schema_versions\" (version, \"appliedAt\", \"schemaHash\") \
             VALUES (?1, ?2, ?3)",
            &[
                SqlValue::Integer(version),
                SqlValue::Integer(applied_at),
                SqlValue::Text(hash.to_string()),
            ],
        )?;
        Ok(())
    }

    /// Full applied-version history, oldest first.
    pub fn schema_history(&self) -> StorageResult<Vec<SchemaVersion>> {
        let rows = self.substrate.query(
            "SELECT version, \"appliedAt\", \"schemaHash\" FROM \"_schema_versions\" \
             ORDER BY version",
            &[],
        )?;
        let mut history = Vec::with_capacity(rows.len());
        for row in rows {
            let (Some(version), Some(applied_at), Some(SqlValue::Text(hash))) =
                (row.first().and_then(SqlValue::as_integer),
                 row.get(1).and_then(SqlValue::as_integer),
                 row.get(2).cloned())
            else {
                return Err(StorageError::Io("schema version row corrupted".into()));
            };
            history.push(SchemaVersion {
                version,
                applied_at,
                schema_hash: hash,
            });
        }
        Ok(history)
    }

    /// Records a table (and its layout) as existing.
    pub fn register_table(&self, name: &str, layout: TableLayout) -> StorageResult<()> {
        let mut state = self.lock_state()?;
        state.tables.insert(name.to_string(), layout);
        self.persist_tables(&state)
    }

    /// Removes a table from the catalog.
    pub fn forget_table(&self, name: &str) -> StorageResult<()> {
        let mut state = self.lock_state()?;
        state.tables.remove(name);
        self.persist_tables(&state)
    }

    /// Copies the current table registry.
    ///
    /// Taken before opening a caller transaction so that tables lazily
    /// registered inside it can be forgotten again on rollback.
    pub fn snapshot_tables(&self) -> StorageResult<BTreeMap<String, TableLayout>> {
        Ok(self.lock_state()?.tables.clone())
    }

    /// Resets the in-memory table registry to a snapshot.
    ///
    /// The durable copy in the side-store needs no correction here: a
    /// rollback already reverted it.
    pub fn restore_tables(&self, tables: BTreeMap<String, TableLayout>) -> StorageResult<()> {
        self.lock_state()?.tables = tables;
        Ok(())
    }

    /// Returns whether the catalog knows `name`.
    pub fn has_table(&self, name: &str) -> bool {
        self.state
            .lock()
            .map(|state| state.tables.contains_key(name))
            .unwrap_or(false)
    }

    /// Layout of a known table.
    pub fn table_layout(&self, name: &str) -> Option<TableLayout> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.tables.get(name).cloned())
    }

    /// All known table names.
    pub fn list_tables(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|state| state.tables.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Adds a document to the document index.
    pub fn index_insert(&self, id: &str, table: &str, creation_time: i64) -> StorageResult<()> {
        self.substrate.execute(
            "INSERT INTO \"_documents\" (id, \"table\", \"creationTime\") VALUES (?1, ?2, ?3)",
            &[
                SqlValue::Text(id.to_string()),
                SqlValue::Text(table.to_string()),
                SqlValue::Integer(creation_time),
            ],
        )?;
        Ok(())
    }

    /// Removes a document from the document index.
    pub fn index_remove(&self, id: &str) -> StorageResult<()> {
        self.substrate.execute(
            "DELETE FROM \"_documents\" WHERE id = ?1",
            &[SqlValue::Text(id.to_string())],
        )?;
        Ok(())
    }

    /// Removes every document-index entry for a table.
    pub fn index_remove_table(&self, table: &str) -> StorageResult<()> {
        self.substrate.execute(
            "DELETE FROM \"_documents\" WHERE \"table\" = ?1",
            &[SqlValue::Text(table.to_string())],
        )?;
        Ok(())
    }

    /// Looks up which table a document lives in.
    pub fn index_lookup(&self, id: &str) -> StorageResult<Option<(String, i64)>> {
        let rows = self.substrate.query(
            "SELECT \"table\", \"creationTime\" FROM \"_documents\" WHERE id = ?1",
            &[SqlValue::Text(id.to_string())],
        )?;
        Ok(rows.into_iter().next().and_then(|row| {
            match (row.first().cloned(), row.get(1).and_then(SqlValue::as_integer)) {
                (Some(SqlValue::Text(table)), Some(time)) => Some((table, time)),
                _ => None,
            }
        }))
    }

    fn persist_tables(&self, state: &MutexGuard<'_, CatalogState>) -> StorageResult<()> {
        let raw = serde_json::to_string(&state.tables)
            .map_err(|err| StorageError::Io(err.to_string()))?;
        self.substrate.kv_put(META_KEY_TABLES, &raw)
    }

    fn lock_state(&self) -> StorageResult<MutexGuard<'_, CatalogState>> {
        self.state.lock().map_err(|_| StorageError::Poisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteSubstrate;

    fn catalog() -> (Arc<dyn Substrate>, Catalog) {
        let substrate: Arc<dyn Substrate> = Arc::new(SqliteSubstrate::open_in_memory().unwrap());
        let catalog = Catalog::new(Arc::clone(&substrate));
        (substrate, catalog)
    }

    #[test]
    fn test_initialization_is_idempotent() {
        let (_s, catalog) = catalog();
        assert!(!catalog.is_initialized());
        catalog.ensure_initialized().unwrap();
        assert!(catalog.is_initialized());
        catalog.ensure_initialized().unwrap();
        assert!(catalog.is_initialized());
    }

    #[test]
    fn test_current_version_defaults_to_zero() {
        let (_s, catalog) = catalog();
        catalog.ensure_initialized().unwrap();
        assert_eq!(catalog.current_version().unwrap(), 0);
    }

    #[test]
    fn test_version_history() {
        let (_s, catalog) = catalog();
        catalog.ensure_initialized().unwrap();
        catalog.record_version(1, 1000, "hash-1").unwrap();
        catalog.record_version(2, 2000, "hash-2").unwrap();

        assert_eq!(catalog.current_version().unwrap(), 2);
        assert_eq!(catalog.version_hash(1).unwrap(), Some("hash-1".into()));
        assert_eq!(catalog.version_hash(3).unwrap(), None);

        let history = catalog.schema_history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].version, 1);
        assert_eq!(history[1].schema_hash, "hash-2");
    }

    #[test]
    fn test_table_registry_survives_restart() {
        let substrate: Arc<dyn Substrate> = Arc::new(SqliteSubstrate::open_in_memory().unwrap());
        {
            let catalog = Catalog::new(Arc::clone(&substrate));
            catalog.ensure_initialized().unwrap();
            catalog.register_table("users", TableLayout::Blob).unwrap();
        }
        // same storage unit, fresh in-memory catalog
        let catalog = Catalog::new(Arc::clone(&substrate));
        catalog.ensure_initialized().unwrap();
        assert!(catalog.has_table("users"));
        assert_eq!(catalog.table_layout("users"), Some(TableLayout::Blob));
    }

    #[test]
    fn test_snapshot_restore_forgets_later_tables() {
        let (_s, catalog) = catalog();
        catalog.ensure_initialized().unwrap();
        catalog.register_table("kept", TableLayout::Blob).unwrap();

        let snapshot = catalog.snapshot_tables().unwrap();
        catalog.register_table("doomed", TableLayout::Blob).unwrap();
        catalog.restore_tables(snapshot).unwrap();

        assert!(catalog.has_table("kept"));
        assert!(!catalog.has_table("doomed"));
    }

    #[test]
    fn test_document_index() {
        let (_s, catalog) = catalog();
        catalog.ensure_initialized().unwrap();
        catalog.index_insert("doc1", "users", 123).unwrap();
        assert_eq!(
            catalog.index_lookup("doc1").unwrap(),
            Some(("users".into(), 123))
        );
        catalog.index_remove("doc1").unwrap();
        assert_eq!(catalog.index_lookup("doc1").unwrap(), None);
    }

    #[test]
    fn test_corrupted_metadata_surfaces_as_error() {
        let (substrate, catalog) = catalog();
        substrate.kv_put("tables", "not json").unwrap();
        let err = catalog.ensure_initialized().unwrap_err();
        assert!(format!("{}", err).contains("corrupted"));
        assert!(!catalog.is_initialized());
    }

    #[test]
    fn test_concurrent_first_callers() {
        let substrate: Arc<dyn Substrate> = Arc::new(SqliteSubstrate::open_in_memory().unwrap());
        let catalog = Arc::new(Catalog::new(substrate));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let catalog = Arc::clone(&catalog);
                std::thread::spawn(move || catalog.ensure_initialized())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert!(catalog.is_initialized());
    }
}
