//! In-process [`RowStore`] backend.
//!
//! Deterministic stand-in for the remote store: sequential ids, synthetic
//! timestamps derived from the id, and scriptable single-shot failure
//! injection so compensation paths can be exercised without a network.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::{Condition, Filter, Order, RowStore, SelectQuery, StoreError};

/// Which store call a scripted failure should intercept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Vec<Map<String, Value>>>,
    sequences: HashMap<String, i64>,
    failures: Vec<(String, StoreOp)>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a one-shot failure: the next matching call on `table` fails with
    /// a rejected-write error instead of touching the data.
    pub async fn fail_once(&self, table: &str, op: StoreOp) {
        let mut inner = self.inner.lock().await;
        inner.failures.push((table.to_string(), op));
    }

    /// Inserts a row verbatim, assigning an id when the row has none.
    /// Intended for test fixtures that bypass the services.
    pub async fn seed(&self, table: &str, row: Value) -> Value {
        let mut inner = self.inner.lock().await;
        let stored = inner.store_row(table, row);
        Value::Object(stored)
    }

    /// Snapshot of a table, in insertion order.
    pub async fn dump(&self, table: &str) -> Vec<Value> {
        let inner = self.inner.lock().await;
        inner
            .tables
            .get(table)
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }
}

impl Inner {
    fn take_failure(&mut self, table: &str, op: StoreOp) -> Option<StoreError> {
        let position = self
            .failures
            .iter()
            .position(|(t, o)| t == table && *o == op)?;
        self.failures.remove(position);
        Some(StoreError::Rejected {
            table: table.to_string(),
            status: 500,
            message: "injected failure".to_string(),
        })
    }

    fn store_row(&mut self, table: &str, row: Value) -> Map<String, Value> {
        let mut object = match row {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        let sequence = self.sequences.entry(table.to_string()).or_insert(0);
        let id = match object.get("id").and_then(Value::as_i64) {
            Some(given) => {
                *sequence = (*sequence).max(given);
                given
            }
            None => {
                *sequence += 1;
                let id = *sequence;
                object.insert("id".to_string(), Value::from(id));
                id
            }
        };
        if !object.contains_key("created_at") {
            object.insert(
                "created_at".to_string(),
                Value::String(synthetic_timestamp(id).to_rfc3339()),
            );
        }
        self.tables
            .entry(table.to_string())
            .or_default()
            .push(object.clone());
        object
    }
}

/// Monotonic per-row timestamp so "newest first" orderings are total.
fn synthetic_timestamp(id: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + id, 0).single().unwrap_or_else(Utc::now)
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn select(&self, table: &str, query: SelectQuery) -> Result<Vec<Value>, StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(err) = inner.take_failure(table, StoreOp::Select) {
            return Err(err);
        }
        let mut rows: Vec<Map<String, Value>> = inner
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_filter(row, &query.filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        for order in query.order.iter().rev() {
            sort_rows(&mut rows, order);
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows.into_iter().map(Value::Object).collect())
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(err) = inner.take_failure(table, StoreOp::Insert) {
            return Err(err);
        }
        Ok(Value::Object(inner.store_row(table, row)))
    }

    async fn update(&self, table: &str, filter: Filter, patch: Value) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(err) = inner.take_failure(table, StoreOp::Update) {
            return Err(err);
        }
        let patch = match patch {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::Decode(format!(
                    "patch for '{}' must be an object, got {}",
                    table, other
                )))
            }
        };
        let mut affected = 0;
        if let Some(rows) = inner.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| matches_filter(row, &filter)) {
                for (key, value) in &patch {
                    row.insert(key.clone(), value.clone());
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn delete(&self, table: &str, filter: Filter) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(err) = inner.take_failure(table, StoreOp::Delete) {
            return Err(err);
        }
        let mut affected = 0;
        if let Some(rows) = inner.tables.get_mut(table) {
            rows.retain(|row| {
                let matched = matches_filter(row, &filter);
                if matched {
                    affected += 1;
                }
                !matched
            });
        }
        Ok(affected)
    }
}

fn matches_filter(row: &Map<String, Value>, filter: &Filter) -> bool {
    filter.conditions().iter().all(|condition| match condition {
        Condition::Eq(column, expected) => row
            .get(column)
            .map(|actual| values_equal(actual, expected))
            .unwrap_or(false),
        Condition::IsNull(column) => row.get(column).map(Value::is_null).unwrap_or(true),
    })
}

/// Equality with numeric awareness: the services serialize decimals as
/// strings while seeds may use JSON numbers, and `70` must equal `70.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (as_decimal(a), as_decimal(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

fn sort_rows(rows: &mut [Map<String, Value>], order: &Order) {
    rows.sort_by(|a, b| {
        let left = a.get(&order.column);
        let right = b.get(&order.column);
        let ordering = compare_values(left, right);
        if order.descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => {
            if let (Some(dx), Some(dy)) = (as_decimal(x), as_decimal(y)) {
                return dx.cmp(&dy);
            }
            match (x, y) {
                (Value::String(sx), Value::String(sy)) => sx.cmp(sy),
                (Value::Bool(bx), Value::Bool(by)) => bx.cmp(by),
                _ => Ordering::Equal,
            }
        }
    }
}
