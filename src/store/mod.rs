//! Remote row-store abstraction.
//!
//! The backend exposes a row-oriented CRUD+filter API over named tables and
//! guarantees nothing across calls: no transactions, no locks. Every service
//! in this crate treats each call as independently failable and layers the
//! compensation policy on top. [`RowStore`] is the seam; [`rest::RestStore`]
//! talks to the real PostgREST-style endpoint and [`memory::MemoryStore`]
//! backs tests and demos.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub mod memory;
pub mod rest;

/// Logical table names, fixed by the remote schema.
pub mod tables {
    pub const INVENTORY: &str = "inventory";
    pub const INVENTORY_MOVEMENTS: &str = "inventory_movements";
    pub const PRODUCTS: &str = "products";
    pub const PRODUCT_RECIPES: &str = "product_recipes";
    pub const PRODUCTION_ORDERS: &str = "production_orders";
    pub const PRODUCTION_LOG: &str = "production_log";
    pub const WORKERS: &str = "workers";
    pub const SELLERS: &str = "sellers";
    pub const SELLER_INVENTORY: &str = "seller_inventory";
    pub const SELLER_MOVEMENTS: &str = "seller_movements";
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store answered and said no (constraint violation, bad request,
    /// missing table, auth failure).
    #[error("store rejected call on '{table}' ({status}): {message}")]
    Rejected {
        table: String,
        status: u16,
        message: String,
    },

    /// The call never completed (connection, timeout, DNS).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The store answered with a payload this crate could not decode.
    #[error("decode failure: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// One conjunct of a row filter. Equality and null checks are the only
/// operators this system needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    IsNull(String),
}

/// Conjunction of conditions applied to `select`/`update`/`delete`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(Vec<Condition>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push(Condition::Eq(column.into(), value.into()));
        self
    }

    pub fn is_null(mut self, column: impl Into<String>) -> Self {
        self.0.push(Condition::IsNull(column.into()));
        self
    }

    pub fn by_id(id: i64) -> Self {
        Self::new().eq("id", id)
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Sort key for `select`.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self { column: column.into(), descending: false }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self { column: column.into(), descending: true }
    }
}

/// Parameters of one `select` call.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub filter: Filter,
    pub order: Vec<Order>,
    pub limit: Option<u64>,
}

impl SelectQuery {
    pub fn filtered(filter: Filter) -> Self {
        Self { filter, ..Self::default() }
    }

    pub fn order_by(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// The row store contract exposed by the remote backend.
///
/// `update` and `delete` return the number of affected rows; callers use a
/// zero count on a quantity-guarded update filter to detect that a concurrent
/// writer won the race.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn select(&self, table: &str, query: SelectQuery) -> Result<Vec<Value>, StoreError>;

    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError>;

    async fn update(&self, table: &str, filter: Filter, patch: Value) -> Result<u64, StoreError>;

    async fn delete(&self, table: &str, filter: Filter) -> Result<u64, StoreError>;
}

/// Typed `select`: decodes every returned row.
pub async fn select_as<T: DeserializeOwned>(
    store: &dyn RowStore,
    table: &str,
    query: SelectQuery,
) -> Result<Vec<T>, StoreError> {
    let rows = store.select(table, query).await?;
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(StoreError::from))
        .collect()
}

/// Typed `select` expecting at most one row.
pub async fn select_one<T: DeserializeOwned>(
    store: &dyn RowStore,
    table: &str,
    filter: Filter,
) -> Result<Option<T>, StoreError> {
    let query = SelectQuery::filtered(filter).limit(1);
    Ok(select_as(store, table, query).await?.into_iter().next())
}

/// Typed `select` by primary key.
pub async fn find_by_id<T: DeserializeOwned>(
    store: &dyn RowStore,
    table: &str,
    id: i64,
) -> Result<Option<T>, StoreError> {
    select_one(store, table, Filter::by_id(id)).await
}

/// Typed `insert`: serializes the new row and decodes the stored one
/// (ids and timestamps are store-assigned).
pub async fn insert_as<N: Serialize, T: DeserializeOwned>(
    store: &dyn RowStore,
    table: &str,
    row: &N,
) -> Result<T, StoreError> {
    let value = serde_json::to_value(row)?;
    let stored = store.insert(table, value).await?;
    serde_json::from_value(stored).map_err(StoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_builder_collects_conditions() {
        let filter = Filter::new().eq("seller_id", 4).eq("inventory_id", 7);
        assert_eq!(filter.conditions().len(), 2);
        assert!(!filter.is_empty());
        assert_eq!(
            filter.conditions()[0],
            Condition::Eq("seller_id".into(), Value::from(4))
        );
    }

    #[test]
    fn select_query_builder() {
        let q = SelectQuery::filtered(Filter::by_id(9))
            .order_by(Order::desc("created_at"))
            .limit(100);
        assert_eq!(q.limit, Some(100));
        assert!(q.order[0].descending);
    }
}
