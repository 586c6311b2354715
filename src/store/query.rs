//! Query evaluation
//!
//! Filters are a flat AND over decoded field values: no type coercion, a
//! missing field never matches. Ordering is stable and type-ranked so sorts
//! are deterministic even across mixed-type fields.

use std::cmp::Ordering;

use serde_json::Value as JsonValue;

use super::document::Document;
use super::errors::{StoreError, StoreResult};
use crate::value::validator::{value_from_json, ROOT_PATH};
use crate::value::Value;

/// Comparison operator for a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl FilterOp {
    /// Parses an operator name, rejecting unknown ones by name.
    pub fn parse(name: &str) -> StoreResult<Self> {
        match name {
            "eq" => Ok(FilterOp::Eq),
            "neq" => Ok(FilterOp::Neq),
            "lt" => Ok(FilterOp::Lt),
            "lte" => Ok(FilterOp::Lte),
            "gt" => Ok(FilterOp::Gt),
            "gte" => Ok(FilterOp::Gte),
            other => Err(StoreError::UnknownOperator(other.to_string())),
        }
    }

    /// SQL comparison operator, for typed-table filter compilation.
    pub fn sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Neq => "!=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
        }
    }
}

/// One filter condition; a query is a flat AND of these
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Field name, or `_creationTime` / `_id` for system fields
    pub field: String,
    /// Comparison operator
    pub op: FilterOp,
    /// Comparison value
    pub value: Value,
}

impl Filter {
    /// Builds a filter from an operator name and a JSON comparison value.
    pub fn new(field: impl Into<String>, operator: &str, value: &JsonValue) -> StoreResult<Self> {
        Ok(Self {
            field: field.into(),
            op: FilterOp::parse(operator)?,
            value: value_from_json(value, ROOT_PATH)?,
        })
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

/// Query options: ordering and result limit
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Field and direction; defaults to ascending `_creationTime`
    pub order: Option<(String, Order)>,
    /// Truncates the result after ordering
    pub limit: Option<usize>,
}

impl QueryOptions {
    /// Orders by `field` in the given direction.
    pub fn order_by(field: impl Into<String>, order: Order) -> Self {
        Self {
            order: Some((field.into(), order)),
            limit: None,
        }
    }

    /// Caps the result length.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Checks whether a document matches every filter (AND semantics).
pub fn matches(document: &Document, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| matches_one(document, filter))
}

fn matches_one(document: &Document, filter: &Filter) -> bool {
    let actual = match document.field_value(&filter.field) {
        Some(value) => value,
        // missing field never matches
        None => return false,
    };
    match filter.op {
        FilterOp::Eq => values_equal(&actual, &filter.value),
        FilterOp::Neq => !values_equal(&actual, &filter.value),
        FilterOp::Lt => partial_compare(&actual, &filter.value) == Some(Ordering::Less),
        FilterOp::Lte => matches!(
            partial_compare(&actual, &filter.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOp::Gt => partial_compare(&actual, &filter.value) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(
            partial_compare(&actual, &filter.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

/// Equality across the numeric kinds compares numerically; everything else
/// is exact structural equality.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Float(x), Value::Int64(y)) | (Value::Int64(y), Value::Float(x)) => {
            *x == *y as f64
        }
        _ => a == b,
    }
}

/// Range comparison for same-kind pairs; cross-kind pairs are incomparable
/// (no coercion) apart from the two numeric kinds.
fn partial_compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Int64(x), Value::Int64(y)) => Some(x.cmp(y)),
        (Value::Float(x), Value::Int64(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Int64(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Stable, type-ranked ordering used for sorting query results.
///
/// Absent < null < boolean < number < string < bytes < array < object.
pub fn rank_compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            let rank = |v: &Value| -> u8 {
                match v {
                    Value::Null => 0,
                    Value::Bool(_) => 1,
                    Value::Float(_) | Value::Int64(_) => 2,
                    Value::String(_) => 3,
                    Value::Bytes(_) => 4,
                    Value::Array(_) => 5,
                    Value::Object(_) => 6,
                }
            };
            let (ra, rb) = (rank(a), rank(b));
            if ra != rb {
                return ra.cmp(&rb);
            }
            match (a, b) {
                (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
                (Value::String(x), Value::String(y)) => x.cmp(y),
                (Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
                _ => partial_compare(a, b).unwrap_or(Ordering::Equal),
            }
        }
    }
}

/// Sorts documents by a field (system or user), stably.
pub fn sort_documents(documents: &mut [Document], field: &str, order: Order) {
    documents.sort_by(|a, b| {
        let ordering = rank_compare(a.field_value(field).as_ref(), b.field_value(field).as_ref());
        match order {
            Order::Asc => ordering,
            Order::Desc => ordering.reverse(),
        }
    });
}
