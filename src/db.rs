//! Top-level database handle
//!
//! Wires one storage unit's substrate, catalog, document store, and
//! migration engine together behind a single owned handle. Everything here
//! delegates; the behavior lives in the component modules.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::catalog::{Catalog, SchemaVersion};
use crate::migration::{MigrationEngine, MigrationPlan, MigrationResult};
use crate::schema::DatabaseSchema;
use crate::store::{
    ChangeListener, Document, DocumentStore, Filter, QueryOptions, StoreResult,
};
use crate::storage::{SqliteConfig, SqliteSubstrate, StorageResult, Substrate};

/// A single database: one storage unit and its engine components
pub struct Database {
    catalog: Arc<Catalog>,
    store: DocumentStore,
    migrations: MigrationEngine,
}

impl Database {
    /// Opens (creating if needed) a database at the configured path.
    pub fn open(config: &SqliteConfig) -> StorageResult<Self> {
        Ok(Self::with_substrate(Arc::new(SqliteSubstrate::open(
            config,
        )?)))
    }

    /// Opens a throwaway in-memory database.
    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(Self::with_substrate(Arc::new(
            SqliteSubstrate::open_in_memory()?,
        )))
    }

    /// Builds a database over any substrate implementation.
    pub fn with_substrate(substrate: Arc<dyn Substrate>) -> Self {
        let catalog = Arc::new(Catalog::new(Arc::clone(&substrate)));
        let store = DocumentStore::new(Arc::clone(&substrate), Arc::clone(&catalog));
        let migrations = MigrationEngine::new(substrate, Arc::clone(&catalog));
        Self {
            catalog,
            store,
            migrations,
        }
    }

    // ---- documents ----

    /// Inserts a document, returning its generated id.
    pub fn insert(&self, table: &str, payload: &JsonValue) -> StoreResult<String> {
        self.store.insert(table, payload)
    }

    /// Fetches a document by id.
    pub fn get(&self, table: &str, id: &str) -> StoreResult<Option<Document>> {
        self.store.get(table, id)
    }

    /// Merges a partial payload onto an existing document.
    pub fn patch(&self, table: &str, id: &str, payload: &JsonValue) -> StoreResult<()> {
        self.store.patch(table, id, payload)
    }

    /// Replaces a document's user fields wholesale.
    pub fn replace(&self, table: &str, id: &str, payload: &JsonValue) -> StoreResult<()> {
        self.store.replace(table, id, payload)
    }

    /// Deletes a document; absent documents are a no-op.
    pub fn delete(&self, table: &str, id: &str) -> StoreResult<()> {
        self.store.delete(table, id)
    }

    /// Runs a filtered, ordered query.
    pub fn query(
        &self,
        table: &str,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> StoreResult<Vec<Document>> {
        self.store.query(table, filters, options)
    }

    /// Runs `f` inside one transaction; any error rolls everything back.
    pub fn run_transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&DocumentStore) -> StoreResult<T>,
    {
        self.store.run_transaction(f)
    }

    /// Registers a listener notified after every committed change.
    pub fn subscribe(&self, listener: Arc<dyn ChangeListener>) {
        self.store.register_listener(listener);
    }

    // ---- schema ----

    /// Applies a declarative schema as the next migration version.
    pub fn apply_schema(&self, schema: &DatabaseSchema) -> MigrationResult<()> {
        self.migrations.apply_schema(schema)
    }

    /// Applies an explicit migration plan.
    pub fn apply_migration(&self, plan: &MigrationPlan) -> MigrationResult<()> {
        self.migrations.apply_migration(plan)
    }

    /// Current schema version; 0 before any migration.
    pub fn schema_version(&self) -> StorageResult<i64> {
        self.catalog.ensure_initialized()?;
        self.catalog.current_version()
    }

    /// Applied-migration history, oldest first.
    pub fn schema_history(&self) -> StorageResult<Vec<SchemaVersion>> {
        self.catalog.ensure_initialized()?;
        self.catalog.schema_history()
    }

    /// Names of every known table, sorted.
    pub fn list_tables(&self) -> StorageResult<Vec<String>> {
        self.catalog.ensure_initialized()?;
        Ok(self.catalog.list_tables())
    }
}
