//! Stock ledger and movement log.
//!
//! The single vetted implementation of the invariant "current quantity =
//! initial quantity + sum of non-cancelled movement deltas". Every quantity
//! mutation in the crate funnels through [`InventoryService::adjust_quantity`],
//! which performs a compare-and-swap on the quantity column so concurrent
//! writers surface as conflicts instead of silently losing updates.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::compensation::{CompoundWrite, FailedWrite};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{
    InventoryItem, InventoryMovement, ItemCategory, ItemPatch, MovementRecord, MovementType,
    NewItem, NewMovement, SavedItem,
};
use crate::store::{self, tables, Filter, Order, RowStore, SelectQuery};

const DEFAULT_CAS_RETRIES: u32 = 3;
const DEFAULT_MOVEMENT_PAGE_LIMIT: u64 = 100;

/// Whether an outbound delta may drive the quantity below zero.
///
/// Operator-facing outbound forms are `Checked`; manual corrective edits and
/// recipe-driven consumption are `Unchecked` (a negative result there warns
/// rather than blocks).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockPolicy {
    Checked,
    Unchecked,
}

/// Before/after quantities of one counter update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantityShift {
    pub previous: Decimal,
    pub current: Decimal,
}

/// Filters for listing inventory items.
#[derive(Debug, Clone, Default)]
pub struct ItemListQuery {
    pub brand: Option<crate::models::Brand>,
    pub category: Option<ItemCategory>,
    pub search: Option<String>,
}

#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn RowStore>,
    events: Option<EventSender>,
    cas_retries: u32,
    movement_page_limit: u64,
}

impl InventoryService {
    pub fn new(store: Arc<dyn RowStore>, events: Option<EventSender>) -> Self {
        Self {
            store,
            events,
            cas_retries: DEFAULT_CAS_RETRIES,
            movement_page_limit: DEFAULT_MOVEMENT_PAGE_LIMIT,
        }
    }

    pub fn with_limits(mut self, cas_retries: u32, movement_page_limit: u64) -> Self {
        self.cas_retries = cas_retries.max(1);
        self.movement_page_limit = movement_page_limit.max(1);
        self
    }

    fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    pub async fn get_item(&self, inventory_id: i64) -> Result<InventoryItem, ServiceError> {
        store::find_by_id(self.store.as_ref(), tables::INVENTORY, inventory_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("inventory item {}", inventory_id)))
    }

    pub async fn current_quantity(&self, inventory_id: i64) -> Result<Decimal, ServiceError> {
        Ok(self.get_item(inventory_id).await?.quantity)
    }

    /// Lists items ordered by name. Brand and category narrow the remote
    /// query; the name search is applied client-side, as the form does.
    #[instrument(skip(self))]
    pub async fn list_items(
        &self,
        query: ItemListQuery,
    ) -> Result<Vec<InventoryItem>, ServiceError> {
        let mut filter = Filter::new();
        if let Some(brand) = query.brand {
            filter = filter.eq("brand", brand.to_string());
        }
        if let Some(category) = query.category {
            filter = filter.eq("type", category.to_string());
        }
        let mut items: Vec<InventoryItem> = store::select_as(
            self.store.as_ref(),
            tables::INVENTORY,
            SelectQuery::filtered(filter).order_by(Order::asc("name")),
        )
        .await?;
        if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let needle = term.to_lowercase();
            items.retain(|item| item.name.to_lowercase().contains(&needle));
        }
        Ok(items)
    }

    /// Creates an item; a starting quantity > 0 seeds the initial Entrada
    /// movement so the ledger starts reconciled. A failed seed keeps the
    /// item and reports the audit gap instead of rolling back.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_item(&self, input: NewItem) -> Result<SavedItem, ServiceError> {
        input.validate()?;
        let item: InventoryItem =
            store::insert_as(self.store.as_ref(), tables::INVENTORY, &input).await?;
        info!("Inventory item created: id={}, name={}", item.id, item.name);

        let mut audit_gap = None;
        if item.quantity > Decimal::ZERO {
            let record = MovementRecord::for_delta(
                item.id,
                item.quantity,
                Some("Stock Inicial (Creación de artículo)".to_string()),
            );
            if let Err(err) = self.insert_movement(&record).await {
                warn!(
                    "Initial movement for item {} could not be logged: {}",
                    item.id, err
                );
                audit_gap = Some(format!(
                    "El artículo fue creado, pero el movimiento inicial no quedó en el historial: {}",
                    err
                ));
            }
            self.emit(Event::StockAdjusted {
                inventory_id: item.id,
                delta: item.quantity,
                new_quantity: item.quantity,
            });
        }
        Ok(SavedItem { item, audit_gap })
    }

    /// Full-row edit. A quantity change implies a synthetic adjustment
    /// movement logged after the row update; a failed movement insert does
    /// not roll the quantity back (stock correctness over audit
    /// completeness) but is reported via `audit_gap`.
    #[instrument(skip(self, patch))]
    pub async fn update_item(
        &self,
        inventory_id: i64,
        patch: ItemPatch,
    ) -> Result<SavedItem, ServiceError> {
        patch.validate()?;
        let original = self.get_item(inventory_id).await?;
        let delta = patch.quantity - original.quantity;

        // Guard on the previously-seen quantity: an edit based on a stale
        // form must not clobber a concurrent ledger write.
        let guard = Filter::by_id(inventory_id).eq("quantity", decimal_value(original.quantity));
        let affected = self
            .store
            .update(tables::INVENTORY, guard, serde_json::to_value(&patch).map_err(crate::store::StoreError::from)?)
            .await?;
        if affected == 0 {
            return match store::find_by_id::<InventoryItem>(
                self.store.as_ref(),
                tables::INVENTORY,
                inventory_id,
            )
            .await?
            {
                Some(_) => Err(ServiceError::Conflict(format!(
                    "inventory item {}",
                    inventory_id
                ))),
                None => Err(ServiceError::NotFound(format!(
                    "inventory item {}",
                    inventory_id
                ))),
            };
        }

        let mut audit_gap = None;
        if delta != Decimal::ZERO {
            let record = MovementRecord::for_delta(
                inventory_id,
                delta,
                Some("Ajuste manual desde formulario de edición".to_string()),
            );
            if let Err(err) = self.insert_movement(&record).await {
                warn!(
                    "Manual adjustment for item {} could not be logged: {}",
                    inventory_id, err
                );
                audit_gap = Some(format!(
                    "El artículo fue actualizado, pero el ajuste no quedó en el historial: {}",
                    err
                ));
            }
            self.emit(Event::StockAdjusted {
                inventory_id,
                delta,
                new_quantity: patch.quantity,
            });
        }

        let item = InventoryItem {
            id: inventory_id,
            name: patch.name,
            category: patch.category,
            quantity: patch.quantity,
            low_stock_threshold: patch.low_stock_threshold,
            unit: patch.unit,
            brand: patch.brand,
        };
        Ok(SavedItem { item, audit_gap })
    }

    /// Deletes the item row. Historical movements are left in place; they
    /// render against a missing item (known referential gap, preserved).
    #[instrument(skip(self))]
    pub async fn delete_item(&self, inventory_id: i64) -> Result<(), ServiceError> {
        let affected = self
            .store
            .delete(tables::INVENTORY, Filter::by_id(inventory_id))
            .await?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "inventory item {}",
                inventory_id
            )));
        }
        info!("Inventory item deleted: id={}", inventory_id);
        Ok(())
    }

    /// The ledger primitive: read, compute, reject a checked negative
    /// result, then write guarded by the quantity just read. Zero affected
    /// rows means a concurrent writer won; re-read and retry up to the
    /// configured bound.
    pub(crate) async fn adjust_quantity(
        &self,
        inventory_id: i64,
        delta: Decimal,
        policy: StockPolicy,
    ) -> Result<QuantityShift, ServiceError> {
        for _ in 0..self.cas_retries {
            let item = self.get_item(inventory_id).await?;
            let next = item.quantity + delta;
            if policy == StockPolicy::Checked && delta < Decimal::ZERO && next < Decimal::ZERO {
                return Err(ServiceError::InsufficientStock {
                    inventory_id,
                    requested: -delta,
                    available: item.quantity,
                });
            }
            let guard = Filter::by_id(inventory_id).eq("quantity", decimal_value(item.quantity));
            let affected = self
                .store
                .update(tables::INVENTORY, guard, json!({ "quantity": decimal_value(next) }))
                .await?;
            if affected > 0 {
                if next < Decimal::ZERO {
                    warn!(
                        "Inventory item {} driven negative: {} -> {}",
                        inventory_id, item.quantity, next
                    );
                }
                return Ok(QuantityShift {
                    previous: item.quantity,
                    current: next,
                });
            }
        }
        Err(ServiceError::Conflict(format!(
            "inventory item {}",
            inventory_id
        )))
    }

    /// Applies a signed delta and appends the matching movement, in that
    /// order. A failed movement append is compensated by reverting the
    /// quantity; only a failed revert abandons the operation.
    #[instrument(skip(self, reason))]
    pub async fn apply_delta(
        &self,
        inventory_id: i64,
        delta: Decimal,
        reason: impl Into<Option<String>>,
        policy: StockPolicy,
    ) -> Result<InventoryMovement, ServiceError> {
        if delta == Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "a stock delta must not be zero".to_string(),
            ));
        }
        let reason = reason.into();
        let mut op = CompoundWrite::begin(format!("ajuste de stock del artículo {}", inventory_id));

        let shift = self.adjust_quantity(inventory_id, delta, policy).await?;
        op.applied(tables::INVENTORY, inventory_id, delta);

        let record = MovementRecord::for_delta(inventory_id, delta, reason);
        match self.insert_movement(&record).await {
            Ok(movement) => {
                op.complete();
                info!(
                    "Stock adjusted: item={}, delta={:+}, quantity={}",
                    inventory_id, delta, shift.current
                );
                self.emit(Event::StockAdjusted {
                    inventory_id,
                    delta,
                    new_quantity: shift.current,
                });
                Ok(movement)
            }
            Err(append_err) => {
                match self
                    .adjust_quantity(inventory_id, -delta, StockPolicy::Unchecked)
                    .await
                {
                    Ok(_) => {
                        warn!(
                            "Movement append failed for item {}, quantity reverted: {}",
                            inventory_id, append_err
                        );
                        Err(append_err)
                    }
                    Err(revert_err) => {
                        let discrepancy = op.abandon(vec![
                            FailedWrite {
                                table: tables::INVENTORY_MOVEMENTS,
                                row_id: inventory_id,
                                delta,
                                reason: append_err.to_string(),
                            },
                            FailedWrite {
                                table: tables::INVENTORY,
                                row_id: inventory_id,
                                delta: -delta,
                                reason: revert_err.to_string(),
                            },
                        ]);
                        Err(ServiceError::PartialConsistency(discrepancy))
                    }
                }
            }
        }
    }

    /// Stock-movement form entry point. This call site logs the movement
    /// first and updates the quantity second, so the cheap compensation is
    /// deleting the just-inserted movement row.
    #[instrument(skip(self, input), fields(inventory_id = input.inventory_id))]
    pub async fn record_movement(
        &self,
        input: NewMovement,
    ) -> Result<InventoryMovement, ServiceError> {
        input.validate()?;
        let item = self.get_item(input.inventory_id).await?;
        let delta = match input.movement_type {
            MovementType::Entrada => input.quantity,
            MovementType::Salida => -input.quantity,
        };
        if input.movement_type == MovementType::Salida && item.quantity + delta < Decimal::ZERO {
            return Err(ServiceError::InsufficientStock {
                inventory_id: item.id,
                requested: input.quantity,
                available: item.quantity,
            });
        }

        let mut op = CompoundWrite::begin(format!("movimiento de stock del artículo {}", item.id));
        let record = MovementRecord::for_delta(item.id, delta, input.reason);
        let movement = self.insert_movement(&record).await?;
        op.applied(tables::INVENTORY_MOVEMENTS, movement.id, delta);

        match self.adjust_quantity(item.id, delta, StockPolicy::Checked).await {
            Ok(shift) => {
                op.complete();
                info!(
                    "Movement recorded: id={}, item={}, delta={:+}, quantity={}",
                    movement.id, item.id, delta, shift.current
                );
                self.emit(Event::StockAdjusted {
                    inventory_id: item.id,
                    delta,
                    new_quantity: shift.current,
                });
                Ok(movement)
            }
            Err(update_err) => {
                let deleted = self
                    .store
                    .delete(tables::INVENTORY_MOVEMENTS, Filter::by_id(movement.id))
                    .await;
                match deleted {
                    Ok(_) => {
                        warn!(
                            "Quantity update failed for item {}, movement {} rolled back: {}",
                            item.id, movement.id, update_err
                        );
                        Err(update_err)
                    }
                    Err(delete_err) => {
                        let discrepancy = op.abandon(vec![
                            FailedWrite {
                                table: tables::INVENTORY,
                                row_id: item.id,
                                delta,
                                reason: update_err.to_string(),
                            },
                            FailedWrite {
                                table: tables::INVENTORY_MOVEMENTS,
                                row_id: movement.id,
                                delta: -delta,
                                reason: delete_err.to_string(),
                            },
                        ]);
                        Err(ServiceError::PartialConsistency(discrepancy))
                    }
                }
            }
        }
    }

    /// Soft-voids a movement: applies the inverse delta to the item, then
    /// flips the flag. Cancelling never appends a new movement row, so the
    /// ledger invariant keeps holding once the flag excludes the original.
    #[instrument(skip(self))]
    pub async fn cancel_movement(
        &self,
        movement_id: i64,
    ) -> Result<InventoryMovement, ServiceError> {
        let movement: InventoryMovement =
            store::find_by_id(self.store.as_ref(), tables::INVENTORY_MOVEMENTS, movement_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("movement {}", movement_id)))?;
        if movement.is_cancelled {
            return Err(ServiceError::InvalidOperation(format!(
                "movement {} is already cancelled",
                movement_id
            )));
        }

        let inverse = -movement.quantity_change;
        let mut op = CompoundWrite::begin(format!("cancelación del movimiento {}", movement_id));
        let shift = self
            .adjust_quantity(movement.inventory_id, inverse, StockPolicy::Unchecked)
            .await?;
        op.applied(tables::INVENTORY, movement.inventory_id, inverse);

        // Flag flip guarded on is_cancelled=false: a concurrent cancel must
        // not double-apply the inverse.
        let flag_result = self
            .store
            .update(
                tables::INVENTORY_MOVEMENTS,
                Filter::by_id(movement_id).eq("is_cancelled", false),
                json!({ "is_cancelled": true }),
            )
            .await;
        let flip_failure = match flag_result {
            Ok(affected) if affected > 0 => None,
            Ok(_) => Some(ServiceError::InvalidOperation(format!(
                "movement {} is already cancelled",
                movement_id
            ))),
            Err(err) => Some(ServiceError::Store(err)),
        };

        match flip_failure {
            None => {
                op.complete();
                info!(
                    "Movement cancelled: id={}, item={}, quantity={}",
                    movement_id, movement.inventory_id, shift.current
                );
                self.emit(Event::MovementCancelled {
                    movement_id,
                    inventory_id: movement.inventory_id,
                });
                Ok(InventoryMovement {
                    is_cancelled: true,
                    ..movement
                })
            }
            Some(flip_err) => {
                match self
                    .adjust_quantity(movement.inventory_id, -inverse, StockPolicy::Unchecked)
                    .await
                {
                    Ok(_) => {
                        warn!(
                            "Cancel flag update failed for movement {}, quantity restored: {}",
                            movement_id, flip_err
                        );
                        Err(flip_err)
                    }
                    Err(revert_err) => {
                        let discrepancy = op.abandon(vec![
                            FailedWrite {
                                table: tables::INVENTORY_MOVEMENTS,
                                row_id: movement_id,
                                delta: Decimal::ZERO,
                                reason: flip_err.to_string(),
                            },
                            FailedWrite {
                                table: tables::INVENTORY,
                                row_id: movement.inventory_id,
                                delta: -inverse,
                                reason: revert_err.to_string(),
                            },
                        ]);
                        Err(ServiceError::PartialConsistency(discrepancy))
                    }
                }
            }
        }
    }

    /// Movement history, newest first, capped at the configured page size.
    #[instrument(skip(self))]
    pub async fn recent_movements(
        &self,
        limit: Option<u64>,
    ) -> Result<Vec<InventoryMovement>, ServiceError> {
        let limit = limit
            .unwrap_or(self.movement_page_limit)
            .min(self.movement_page_limit);
        let query = SelectQuery::default()
            .order_by(Order::desc("created_at"))
            .limit(limit);
        Ok(store::select_as(self.store.as_ref(), tables::INVENTORY_MOVEMENTS, query).await?)
    }

    async fn insert_movement(
        &self,
        record: &MovementRecord,
    ) -> Result<InventoryMovement, ServiceError> {
        Ok(store::insert_as(self.store.as_ref(), tables::INVENTORY_MOVEMENTS, record).await?)
    }
}

pub(crate) fn decimal_value(value: Decimal) -> Value {
    Value::String(value.to_string())
}
