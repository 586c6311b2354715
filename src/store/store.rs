//! Document CRUD and query surface
//!
//! Every operation lazily initializes the catalog; writes to an unseen
//! table first create it with the JSON-blob layout. Tables declared through
//! the migration engine use their typed column layout instead, and filters
//! on them compile to real column comparisons.

use std::sync::{Arc, RwLock};

use serde_json::Value as JsonValue;

use super::document::{generate_id, now_ms, Document};
use super::errors::{StoreError, StoreResult};
use super::query::{self, Filter, FilterOp, Order, QueryOptions};
use crate::catalog::{Catalog, TableLayout};
use crate::observability::{Logger, Severity};
use crate::schema::compiler::{self, quote, storage_column, COL_CREATION_TIME, COL_ID};
use crate::schema::mapper::{from_storage_value, to_storage_value};
use crate::schema::{FieldDef, FieldType, SchemaError, TableSchema};
use crate::storage::{SqlValue, Substrate};
use crate::value::codec::{self, value_to_json};
use crate::value::{validate_payload, Fields, Value, FIELD_CREATION_TIME, FIELD_ID};

/// Observer notified after a committed change to a table.
///
/// Delivery is best-effort fan-out of the table name only; observers that
/// need the data re-query through the store.
pub trait ChangeListener: Send + Sync {
    /// Called after any committed mutation of `table`.
    fn table_changed(&self, table: &str);
}

/// The document CRUD + query surface over one storage unit
pub struct DocumentStore {
    substrate: Arc<dyn Substrate>,
    catalog: Arc<Catalog>,
    listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
}

impl DocumentStore {
    /// Creates a store over a substrate and its catalog.
    pub fn new(substrate: Arc<dyn Substrate>, catalog: Arc<Catalog>) -> Self {
        Self {
            substrate,
            catalog,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Registers a change listener.
    pub fn register_listener(&self, listener: Arc<dyn ChangeListener>) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(listener);
        }
    }

    /// Inserts a new document, returning its generated id.
    pub fn insert(&self, table: &str, payload: &JsonValue) -> StoreResult<String> {
        self.catalog.ensure_initialized()?;
        let fields = validate_payload(payload)?;
        let layout = self.ensure_table(table)?;

        let id = generate_id();
        let creation_time = now_ms();
        // row and index entry land together or not at all
        self.write_atomically(|| {
            match &layout {
                TableLayout::Blob => {
                    self.substrate.execute(
                        &format!(
                            "INSERT INTO {} ({}, {}, \"data\") VALUES (?1, ?2, ?3)",
                            quote(table),
                            quote(COL_ID),
                            quote(COL_CREATION_TIME)
                        ),
                        &[
                            SqlValue::Text(id.clone()),
                            SqlValue::Integer(creation_time),
                            SqlValue::Text(codec::encode(&fields)),
                        ],
                    )?;
                }
                TableLayout::Typed { schema } => {
                    self.write_typed_insert(schema, &id, creation_time, &fields)?;
                }
            }
            self.catalog.index_insert(&id, table, creation_time)?;
            Ok(())
        })?;

        Logger::log(Severity::Trace, "document_inserted", &[("table", table)]);
        self.notify(table);
        Ok(id)
    }

    /// Fetches a document; `None` for an unknown table or absent id.
    pub fn get(&self, table: &str, id: &str) -> StoreResult<Option<Document>> {
        self.catalog.ensure_initialized()?;
        let Some(layout) = self.catalog.table_layout(table) else {
            return Ok(None);
        };
        self.read_document(table, &layout, id)
    }

    /// Merges `payload` onto an existing document: patch keys override,
    /// other fields stay untouched.
    pub fn patch(&self, table: &str, id: &str, payload: &JsonValue) -> StoreResult<()> {
        self.catalog.ensure_initialized()?;
        let patch = validate_payload(payload)?;
        let layout = self
            .catalog
            .table_layout(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        let existing = self
            .read_document(table, &layout, id)?
            .ok_or_else(|| StoreError::DocumentNotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;

        let mut merged = existing.fields;
        for (key, value) in patch {
            merged.insert(key, value);
        }
        self.write_fields(table, &layout, id, &merged)?;

        Logger::log(Severity::Trace, "document_patched", &[("table", table)]);
        self.notify(table);
        Ok(())
    }

    /// Replaces a document's entire field set; fields absent from the new
    /// payload disappear.
    pub fn replace(&self, table: &str, id: &str, payload: &JsonValue) -> StoreResult<()> {
        self.catalog.ensure_initialized()?;
        let fields = validate_payload(payload)?;
        let layout = self
            .catalog
            .table_layout(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        if self.read_document(table, &layout, id)?.is_none() {
            return Err(StoreError::DocumentNotFound {
                table: table.to_string(),
                id: id.to_string(),
            });
        }
        self.write_fields(table, &layout, id, &fields)?;

        Logger::log(Severity::Trace, "document_replaced", &[("table", table)]);
        self.notify(table);
        Ok(())
    }

    /// Deletes a document. Idempotent: absence of the table or the id is a
    /// normal no-op.
    pub fn delete(&self, table: &str, id: &str) -> StoreResult<()> {
        self.catalog.ensure_initialized()?;
        if self.catalog.table_layout(table).is_none() {
            return Ok(());
        }
        let affected = self.write_atomically(|| {
            let affected = self.substrate.execute(
                &format!("DELETE FROM {} WHERE {} = ?1", quote(table), quote(COL_ID)),
                &[SqlValue::Text(id.to_string())],
            )?;
            if affected > 0 {
                self.catalog.index_remove(id)?;
            }
            Ok(affected)
        })?;
        if affected > 0 {
            Logger::log(Severity::Trace, "document_deleted", &[("table", table)]);
            self.notify(table);
        }
        Ok(())
    }

    /// Runs a filtered, ordered, limited query. Unknown tables yield an
    /// empty result.
    pub fn query(
        &self,
        table: &str,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> StoreResult<Vec<Document>> {
        self.catalog.ensure_initialized()?;
        let Some(layout) = self.catalog.table_layout(table) else {
            return Ok(Vec::new());
        };
        match &layout {
            TableLayout::Blob => self.query_blob(table, filters, options),
            TableLayout::Typed { schema } => self.query_typed(schema, filters, options),
        }
    }

    /// Runs `f` inside one storage transaction: every write commits
    /// together, or none do.
    pub fn run_transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&DocumentStore) -> StoreResult<T>,
    {
        self.catalog.ensure_initialized()?;
        let tables_before = self.catalog.snapshot_tables()?;
        self.substrate.begin()?;
        match f(self) {
            Ok(value) => {
                self.substrate.commit()?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.substrate.rollback();
                // tables lazily created inside the transaction died with it
                self.catalog.restore_tables(tables_before)?;
                let reason = err.to_string();
                Logger::log(
                    Severity::Warn,
                    "transaction_rolled_back",
                    &[("reason", reason.as_str())],
                );
                Err(err)
            }
        }
    }

    /// Runs paired writes as one unit, opening a short transaction unless
    /// the caller already holds one.
    fn write_atomically<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce() -> StoreResult<T>,
    {
        if self.substrate.in_transaction()? {
            return f();
        }
        self.substrate.begin()?;
        match f() {
            Ok(value) => {
                self.substrate.commit()?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.substrate.rollback();
                Err(err)
            }
        }
    }

    // ---- table management ----

    /// Returns the table's layout, lazily creating a blob-layout table for
    /// a first write to an unseen name.
    fn ensure_table(&self, table: &str) -> StoreResult<TableLayout> {
        if let Some(layout) = self.catalog.table_layout(table) {
            return Ok(layout);
        }
        compiler::validate_table_name(table)?;
        self.substrate.execute(
            &format!(
                "CREATE TABLE {} ({} TEXT PRIMARY KEY, {} INTEGER NOT NULL, \"data\" TEXT NOT NULL)",
                quote(table),
                quote(COL_ID),
                quote(COL_CREATION_TIME)
            ),
            &[],
        )?;
        self.catalog.register_table(table, TableLayout::Blob)?;
        Logger::log(Severity::Info, "table_created", &[("table", table), ("layout", "blob")]);
        Ok(TableLayout::Blob)
    }

    // ---- reads ----

    fn read_document(
        &self,
        table: &str,
        layout: &TableLayout,
        id: &str,
    ) -> StoreResult<Option<Document>> {
        match layout {
            TableLayout::Blob => {
                let rows = self.substrate.query(
                    &format!(
                        "SELECT {}, \"data\" FROM {} WHERE {} = ?1",
                        quote(COL_CREATION_TIME),
                        quote(table),
                        quote(COL_ID)
                    ),
                    &[SqlValue::Text(id.to_string())],
                )?;
                let Some(row) = rows.into_iter().next() else {
                    return Ok(None);
                };
                Ok(Some(self.blob_row_to_document(id, &row)?))
            }
            TableLayout::Typed { schema } => {
                let columns = typed_select_columns(schema);
                let rows = self.substrate.query(
                    &format!(
                        "SELECT {} FROM {} WHERE {} = ?1",
                        columns,
                        quote(&schema.name),
                        quote(COL_ID)
                    ),
                    &[SqlValue::Text(id.to_string())],
                )?;
                let Some(row) = rows.into_iter().next() else {
                    return Ok(None);
                };
                Ok(Some(typed_row_to_document(schema, &row)?))
            }
        }
    }

    fn blob_row_to_document(&self, id: &str, row: &[SqlValue]) -> StoreResult<Document> {
        let creation_time = row
            .first()
            .and_then(SqlValue::as_integer)
            .ok_or_else(|| StoreError::Validation(
                crate::value::ValidationError::Malformed("creation time missing".into()),
            ))?;
        let data = row
            .get(1)
            .and_then(|cell| cell.as_text())
            .ok_or_else(|| StoreError::Validation(
                crate::value::ValidationError::Malformed("document blob missing".into()),
            ))?;
        Ok(Document {
            id: id.to_string(),
            creation_time,
            fields: codec::decode(data)?,
        })
    }

    // ---- writes ----

    fn write_fields(
        &self,
        table: &str,
        layout: &TableLayout,
        id: &str,
        fields: &Fields,
    ) -> StoreResult<()> {
        match layout {
            TableLayout::Blob => {
                self.substrate.execute(
                    &format!(
                        "UPDATE {} SET \"data\" = ?1 WHERE {} = ?2",
                        quote(table),
                        quote(COL_ID)
                    ),
                    &[
                        SqlValue::Text(codec::encode(fields)),
                        SqlValue::Text(id.to_string()),
                    ],
                )?;
            }
            TableLayout::Typed { schema } => {
                check_declared(schema, fields)?;
                let mut assignments = Vec::with_capacity(schema.fields.len());
                let mut params = Vec::with_capacity(schema.fields.len() + 1);
                for (i, (name, def)) in schema.fields.iter().enumerate() {
                    assignments.push(format!("{} = ?{}", quote(name), i + 1));
                    params.push(to_storage_value(name, def, fields.get(name))?);
                }
                params.push(SqlValue::Text(id.to_string()));
                self.substrate.execute(
                    &format!(
                        "UPDATE {} SET {} WHERE {} = ?{}",
                        quote(&schema.name),
                        assignments.join(", "),
                        quote(COL_ID),
                        params.len()
                    ),
                    &params,
                )?;
            }
        }
        Ok(())
    }

    fn write_typed_insert(
        &self,
        schema: &TableSchema,
        id: &str,
        creation_time: i64,
        fields: &Fields,
    ) -> StoreResult<()> {
        check_declared(schema, fields)?;
        let mut columns = vec![quote(COL_ID), quote(COL_CREATION_TIME)];
        let mut params = vec![SqlValue::Text(id.to_string()), SqlValue::Integer(creation_time)];
        for (name, def) in &schema.fields {
            columns.push(quote(name));
            params.push(to_storage_value(name, def, fields.get(name))?);
        }
        let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("?{}", i)).collect();
        self.substrate.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(&schema.name),
                columns.join(", "),
                placeholders.join(", ")
            ),
            &params,
        )?;
        Ok(())
    }

    // ---- queries ----

    fn query_blob(
        &self,
        table: &str,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> StoreResult<Vec<Document>> {
        let rows = self.substrate.query(
            &format!(
                "SELECT {}, {}, \"data\" FROM {} ORDER BY rowid",
                quote(COL_ID),
                quote(COL_CREATION_TIME),
                quote(table)
            ),
            &[],
        )?;

        let mut documents = Vec::new();
        for row in rows {
            let Some(SqlValue::Text(id)) = row.first().cloned() else {
                continue;
            };
            documents.push(self.blob_row_to_document(&id, &row[1..])?);
        }

        documents.retain(|doc| query::matches(doc, filters));
        let (order_field, order) = options
            .order
            .clone()
            .unwrap_or_else(|| (FIELD_CREATION_TIME.to_string(), Order::Asc));
        query::sort_documents(&mut documents, &order_field, order);
        if let Some(limit) = options.limit {
            documents.truncate(limit);
        }
        Ok(documents)
    }

    fn query_typed(
        &self,
        schema: &TableSchema,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> StoreResult<Vec<Document>> {
        let mut clauses = Vec::with_capacity(filters.len());
        let mut params = Vec::new();
        for filter in filters {
            let (clause, param) = compile_filter(schema, filter, params.len() + 1)?;
            clauses.push(clause);
            if let Some(param) = param {
                params.push(param);
            }
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let (order_field, order) = options
            .order
            .clone()
            .unwrap_or_else(|| (FIELD_CREATION_TIME.to_string(), Order::Asc));
        let order_column = resolve_column(schema, &order_field)?;
        let direction = match order {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        };
        let limit_sql = options
            .limit
            .map(|limit| format!(" LIMIT {}", limit))
            .unwrap_or_default();

        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {} {}, rowid ASC{}",
            typed_select_columns(schema),
            quote(&schema.name),
            where_sql,
            quote(&order_column),
            direction,
            limit_sql
        );
        let rows = self.substrate.query(&sql, &params)?;
        rows.iter()
            .map(|row| typed_row_to_document(schema, row))
            .collect()
    }

    fn notify(&self, table: &str) {
        if let Ok(listeners) = self.listeners.read() {
            for listener in listeners.iter() {
                listener.table_changed(table);
            }
        }
    }
}

/// Rejects payload fields not declared in the table schema.
fn check_declared(schema: &TableSchema, fields: &Fields) -> StoreResult<()> {
    for name in fields.keys() {
        if schema.field(name).is_none() {
            return Err(SchemaError::UndeclaredField {
                table: schema.name.clone(),
                field: name.clone(),
            }
            .into());
        }
    }
    Ok(())
}

/// SELECT column list for a typed table: id, creationTime, then declared
/// fields in declaration order.
fn typed_select_columns(schema: &TableSchema) -> String {
    let mut columns = vec![quote(COL_ID), quote(COL_CREATION_TIME)];
    columns.extend(schema.fields.iter().map(|(name, _)| quote(name)));
    columns.join(", ")
}

fn typed_row_to_document(schema: &TableSchema, row: &[SqlValue]) -> StoreResult<Document> {
    let (Some(SqlValue::Text(id)), Some(creation_time)) =
        (row.first().cloned(), row.get(1).and_then(SqlValue::as_integer))
    else {
        return Err(StoreError::Validation(
            crate::value::ValidationError::Malformed("typed row missing system columns".into()),
        ));
    };
    let mut fields = Fields::new();
    for (i, (name, def)) in schema.fields.iter().enumerate() {
        let cell = row.get(i + 2).cloned().unwrap_or(SqlValue::Null);
        if let Some(value) = from_storage_value(name, def, &cell)? {
            fields.insert(name.clone(), value);
        }
    }
    Ok(Document {
        id,
        creation_time,
        fields,
    })
}

/// Maps a filter/order field to its storage column, erroring on fields the
/// schema does not declare.
fn resolve_column(schema: &TableSchema, field: &str) -> StoreResult<String> {
    if field == FIELD_ID || field == FIELD_CREATION_TIME {
        return Ok(storage_column(field).to_string());
    }
    if schema.field(field).is_none() {
        return Err(SchemaError::UndeclaredField {
            table: schema.name.clone(),
            field: field.to_string(),
        }
        .into());
    }
    Ok(field.to_string())
}

/// Compiles one filter to a SQL clause plus an optional bound parameter.
///
/// A comparison value of a kind the column can never hold is unsatisfiable:
/// it matches nothing, except `neq`, which matches every row where the
/// column is present.
fn compile_filter(
    schema: &TableSchema,
    filter: &Filter,
    placeholder: usize,
) -> StoreResult<(String, Option<SqlValue>)> {
    let column = resolve_column(schema, &filter.field)?;
    let param = if filter.field == FIELD_ID || filter.field == FIELD_CREATION_TIME {
        system_filter_param(&filter.field, &filter.value)
    } else {
        let def = schema
            .field(&filter.field)
            .cloned()
            .unwrap_or(FieldDef::optional(FieldType::Null));
        typed_filter_param(&def, filter.op, &filter.value)
    };

    match param {
        Some(param) => Ok((
            format!("{} {} ?{}", quote(&column), filter.op.sql(), placeholder),
            Some(param),
        )),
        None if filter.op == FilterOp::Neq => {
            Ok((format!("{} IS NOT NULL", quote(&column)), None))
        }
        None => Ok(("0 = 1".to_string(), None)),
    }
}

fn system_filter_param(field: &str, value: &Value) -> Option<SqlValue> {
    if field == FIELD_ID {
        return match value {
            Value::String(s) => Some(SqlValue::Text(s.clone())),
            _ => None,
        };
    }
    match value {
        Value::Float(f) => Some(SqlValue::Real(*f)),
        Value::Int64(i) => Some(SqlValue::Integer(*i)),
        _ => None,
    }
}

fn typed_filter_param(def: &FieldDef, op: FilterOp, value: &Value) -> Option<SqlValue> {
    match (&def.field_type, value) {
        (FieldType::String | FieldType::Id { .. }, Value::String(s)) => {
            Some(SqlValue::Text(s.clone()))
        }
        (FieldType::Number | FieldType::Float64 | FieldType::Int64, Value::Float(f)) => {
            Some(SqlValue::Real(*f))
        }
        (FieldType::Number | FieldType::Float64 | FieldType::Int64, Value::Int64(i)) => {
            Some(SqlValue::Integer(*i))
        }
        (FieldType::Boolean, Value::Bool(b)) => Some(SqlValue::Integer(i64::from(*b))),
        (FieldType::Bytes, Value::Bytes(bytes)) => Some(SqlValue::Blob(bytes.clone())),
        (
            FieldType::Array { .. } | FieldType::Object { .. } | FieldType::Union { .. },
            nested,
        ) => {
            // JSON-encoded columns support exact comparison only
            if matches!(op, FilterOp::Eq | FilterOp::Neq) {
                Some(SqlValue::Text(value_to_json(nested).to_string()))
            } else {
                None
            }
        }
        (FieldType::Literal { .. }, Value::String(s)) => Some(SqlValue::Text(s.clone())),
        (FieldType::Literal { .. }, Value::Float(f)) => Some(SqlValue::Real(*f)),
        (FieldType::Literal { .. }, Value::Bool(b)) => Some(SqlValue::Integer(i64::from(*b))),
        _ => None,
    }
}
