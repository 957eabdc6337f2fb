//! Read-only reporting over the ledger and the production log.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::instrument;

use crate::errors::ServiceError;
use crate::models::{InventoryItem, ProductionLogEntry};
use crate::services::inventory::{InventoryService, ItemListQuery};
use crate::store::{self, tables, Order, RowStore, SelectQuery};

/// Total produced per inventory item over a date range.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductionTotal {
    pub inventory_id: i64,
    pub total: Decimal,
}

#[derive(Clone)]
pub struct ReportsService {
    store: Arc<dyn RowStore>,
    inventory: Arc<InventoryService>,
}

impl ReportsService {
    pub fn new(store: Arc<dyn RowStore>, inventory: Arc<InventoryService>) -> Self {
        Self { store, inventory }
    }

    /// Items currently below their low-stock threshold.
    #[instrument(skip(self))]
    pub async fn low_stock_items(&self) -> Result<Vec<InventoryItem>, ServiceError> {
        let mut items = self.inventory.list_items(ItemListQuery::default()).await?;
        items.retain(InventoryItem::is_low_stock);
        Ok(items)
    }

    /// Produced quantities grouped by item for `from..=to`. Aggregation is
    /// client-side, the way the dashboard derives its charts.
    #[instrument(skip(self))]
    pub async fn production_totals(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ProductionTotal>, ServiceError> {
        if from > to {
            return Err(ServiceError::InvalidInput(
                "date range start is after its end".to_string(),
            ));
        }
        let logs: Vec<ProductionLogEntry> = store::select_as(
            self.store.as_ref(),
            tables::PRODUCTION_LOG,
            SelectQuery::default().order_by(Order::desc("production_date")),
        )
        .await?;

        let mut totals: BTreeMap<i64, Decimal> = BTreeMap::new();
        for log in logs
            .iter()
            .filter(|log| log.production_date >= from && log.production_date <= to)
        {
            *totals.entry(log.inventory_id).or_insert(Decimal::ZERO) += log.quantity;
        }
        Ok(totals
            .into_iter()
            .map(|(inventory_id, total)| ProductionTotal { inventory_id, total })
            .collect())
    }
}
