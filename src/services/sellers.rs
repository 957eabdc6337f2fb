//! Seller (mobile truck) sub-ledger.
//!
//! Each seller carries per-item stock that mirrors the central ledger
//! semantics. Carga and Devolución are transfers — the sum of central plus
//! truck quantities is conserved — while Venta only decrements the truck:
//! sold goods leave the system.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::compensation::{CompoundWrite, FailedWrite};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{
    Seller, SellerMovement, SellerMovementType, SellerStock, TruckOperation, TruckTransfer,
};
use crate::services::inventory::{decimal_value, InventoryService, StockPolicy};
use crate::store::{self, tables, Filter, Order, RowStore, SelectQuery};

const CAS_RETRIES: u32 = 3;

#[derive(Clone)]
pub struct SellerService {
    store: Arc<dyn RowStore>,
    inventory: Arc<InventoryService>,
    events: Option<EventSender>,
}

impl SellerService {
    pub fn new(
        store: Arc<dyn RowStore>,
        inventory: Arc<InventoryService>,
        events: Option<EventSender>,
    ) -> Self {
        Self {
            store,
            inventory,
            events,
        }
    }

    fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    pub async fn get_seller(&self, seller_id: i64) -> Result<Seller, ServiceError> {
        store::find_by_id(self.store.as_ref(), tables::SELLERS, seller_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("seller {}", seller_id)))
    }

    #[instrument(skip(self))]
    pub async fn list_sellers(&self) -> Result<Vec<Seller>, ServiceError> {
        Ok(store::select_as(
            self.store.as_ref(),
            tables::SELLERS,
            SelectQuery::default().order_by(Order::asc("name")),
        )
        .await?)
    }

    #[instrument(skip(self))]
    pub async fn create_seller(&self, name: &str) -> Result<Seller, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::ValidationError(
                "el nombre del vendedor es obligatorio".to_string(),
            ));
        }
        let seller: Seller =
            store::insert_as(self.store.as_ref(), tables::SELLERS, &json!({ "name": name }))
                .await?;
        info!("Seller created: id={}, name={}", seller.id, seller.name);
        Ok(seller)
    }

    /// Removes a seller together with its truck stock and movement history
    /// (the original schema cascades the same way).
    #[instrument(skip(self))]
    pub async fn delete_seller(&self, seller_id: i64) -> Result<(), ServiceError> {
        self.store
            .delete(
                tables::SELLER_MOVEMENTS,
                Filter::new().eq("seller_id", seller_id),
            )
            .await?;
        self.store
            .delete(
                tables::SELLER_INVENTORY,
                Filter::new().eq("seller_id", seller_id),
            )
            .await?;
        let affected = self
            .store
            .delete(tables::SELLERS, Filter::by_id(seller_id))
            .await?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!("seller {}", seller_id)));
        }
        info!("Seller deleted: id={}", seller_id);
        Ok(())
    }

    /// The seller's current truck stock.
    #[instrument(skip(self))]
    pub async fn truck_stock(&self, seller_id: i64) -> Result<Vec<SellerStock>, ServiceError> {
        self.get_seller(seller_id).await?;
        Ok(store::select_as(
            self.store.as_ref(),
            tables::SELLER_INVENTORY,
            SelectQuery::filtered(Filter::new().eq("seller_id", seller_id)),
        )
        .await?)
    }

    /// Seller movement history, newest first.
    #[instrument(skip(self))]
    pub async fn recent_movements(
        &self,
        seller_id: i64,
        limit: Option<u64>,
    ) -> Result<Vec<SellerMovement>, ServiceError> {
        self.get_seller(seller_id).await?;
        let query = SelectQuery::filtered(Filter::new().eq("seller_id", seller_id))
            .order_by(Order::desc("created_at"))
            .limit(limit.unwrap_or(100).min(100));
        Ok(store::select_as(self.store.as_ref(), tables::SELLER_MOVEMENTS, query).await?)
    }

    /// Carga: transfer central → truck. The central debit goes through the
    /// stock ledger (checked, with its own movement); a failed truck credit
    /// re-credits the central ledger so the transfer nets to nothing.
    #[instrument(skip(self, input), fields(seller_id = input.seller_id, inventory_id = input.inventory_id))]
    pub async fn load_truck(&self, input: TruckOperation) -> Result<TruckTransfer, ServiceError> {
        input.validate()?;
        let seller = self.get_seller(input.seller_id).await?;
        self.inventory.get_item(input.inventory_id).await?;

        let mut op = CompoundWrite::begin(format!(
            "carga de camión del vendedor {} artículo {}",
            seller.id, input.inventory_id
        ));
        self.inventory
            .apply_delta(
                input.inventory_id,
                -input.quantity,
                Some(format!("Carga a Vendedor: {}", seller.name)),
                StockPolicy::Checked,
            )
            .await?;
        op.applied(tables::INVENTORY, input.inventory_id, -input.quantity);

        let seller_stock = match self
            .shift_truck_stock(seller.id, input.inventory_id, input.quantity)
            .await
        {
            Ok(row) => row,
            Err(truck_err) => {
                let recredit = self
                    .inventory
                    .apply_delta(
                        input.inventory_id,
                        input.quantity,
                        Some(format!("Reversión de carga fallida: {}", seller.name)),
                        StockPolicy::Unchecked,
                    )
                    .await;
                return match recredit {
                    Ok(_) => {
                        warn!(
                            "Truck credit failed for seller {}, central stock re-credited: {}",
                            seller.id, truck_err
                        );
                        Err(truck_err)
                    }
                    Err(revert_err) => {
                        let discrepancy = op.abandon(vec![
                            FailedWrite {
                                table: tables::SELLER_INVENTORY,
                                row_id: seller.id,
                                delta: input.quantity,
                                reason: truck_err.to_string(),
                            },
                            FailedWrite {
                                table: tables::INVENTORY,
                                row_id: input.inventory_id,
                                delta: input.quantity,
                                reason: revert_err.to_string(),
                            },
                        ]);
                        Err(ServiceError::PartialConsistency(discrepancy))
                    }
                };
            }
        };
        op.complete();

        let (movement, audit_gap) = self
            .append_movement(&input, SellerMovementType::Carga)
            .await;
        self.emit(Event::TruckMovement {
            seller_id: seller.id,
            inventory_id: input.inventory_id,
            movement_type: SellerMovementType::Carga,
            quantity: input.quantity,
        });
        info!(
            "Truck loaded: seller={}, item={}, quantity={}, on_truck={}",
            seller.id, input.inventory_id, input.quantity, seller_stock.quantity
        );
        Ok(TruckTransfer {
            seller_stock,
            movement,
            audit_gap,
        })
    }

    /// Venta: goods leave the system from the truck; the central ledger is
    /// untouched.
    #[instrument(skip(self, input), fields(seller_id = input.seller_id, inventory_id = input.inventory_id))]
    pub async fn record_sale(&self, input: TruckOperation) -> Result<TruckTransfer, ServiceError> {
        input.validate()?;
        let seller = self.get_seller(input.seller_id).await?;

        let seller_stock = self
            .shift_truck_stock(seller.id, input.inventory_id, -input.quantity)
            .await?;

        let (movement, audit_gap) = self
            .append_movement(&input, SellerMovementType::Venta)
            .await;
        self.emit(Event::TruckMovement {
            seller_id: seller.id,
            inventory_id: input.inventory_id,
            movement_type: SellerMovementType::Venta,
            quantity: input.quantity,
        });
        info!(
            "Truck sale: seller={}, item={}, quantity={}, on_truck={}",
            seller.id, input.inventory_id, input.quantity, seller_stock.quantity
        );
        Ok(TruckTransfer {
            seller_stock,
            movement,
            audit_gap,
        })
    }

    /// Devolución: transfer truck → central. A failed central credit
    /// restores the truck quantity so the transfer nets to nothing.
    #[instrument(skip(self, input), fields(seller_id = input.seller_id, inventory_id = input.inventory_id))]
    pub async fn return_to_central(
        &self,
        input: TruckOperation,
    ) -> Result<TruckTransfer, ServiceError> {
        input.validate()?;
        let seller = self.get_seller(input.seller_id).await?;
        self.inventory.get_item(input.inventory_id).await?;

        let mut op = CompoundWrite::begin(format!(
            "devolución del vendedor {} artículo {}",
            seller.id, input.inventory_id
        ));
        let seller_stock = self
            .shift_truck_stock(seller.id, input.inventory_id, -input.quantity)
            .await?;
        op.applied(tables::SELLER_INVENTORY, seller_stock.id, -input.quantity);

        if let Err(credit_err) = self
            .inventory
            .apply_delta(
                input.inventory_id,
                input.quantity,
                Some(format!("Devolución de Vendedor: {}", seller.name)),
                StockPolicy::Unchecked,
            )
            .await
        {
            let restore = self
                .shift_truck_stock(seller.id, input.inventory_id, input.quantity)
                .await;
            return match restore {
                Ok(_) => {
                    warn!(
                        "Central credit failed for seller {} return, truck stock restored: {}",
                        seller.id, credit_err
                    );
                    Err(credit_err)
                }
                Err(revert_err) => {
                    let discrepancy = op.abandon(vec![
                        FailedWrite {
                            table: tables::INVENTORY,
                            row_id: input.inventory_id,
                            delta: input.quantity,
                            reason: credit_err.to_string(),
                        },
                        FailedWrite {
                            table: tables::SELLER_INVENTORY,
                            row_id: seller_stock.id,
                            delta: input.quantity,
                            reason: revert_err.to_string(),
                        },
                    ]);
                    Err(ServiceError::PartialConsistency(discrepancy))
                }
            };
        }
        op.complete();

        let (movement, audit_gap) = self
            .append_movement(&input, SellerMovementType::Devolucion)
            .await;
        self.emit(Event::TruckMovement {
            seller_id: seller.id,
            inventory_id: input.inventory_id,
            movement_type: SellerMovementType::Devolucion,
            quantity: input.quantity,
        });
        info!(
            "Truck return: seller={}, item={}, quantity={}, on_truck={}",
            seller.id, input.inventory_id, input.quantity, seller_stock.quantity
        );
        Ok(TruckTransfer {
            seller_stock,
            movement,
            audit_gap,
        })
    }

    /// Counter update on the (seller, item) row, guarded on the quantity
    /// just read. A negative result is always refused: the truck cannot owe
    /// goods. A positive delta on a missing row creates it.
    async fn shift_truck_stock(
        &self,
        seller_id: i64,
        inventory_id: i64,
        delta: Decimal,
    ) -> Result<SellerStock, ServiceError> {
        for _ in 0..CAS_RETRIES {
            let existing: Option<SellerStock> = store::select_one(
                self.store.as_ref(),
                tables::SELLER_INVENTORY,
                Filter::new()
                    .eq("seller_id", seller_id)
                    .eq("inventory_id", inventory_id),
            )
            .await?;

            let Some(row) = existing else {
                if delta < Decimal::ZERO {
                    return Err(ServiceError::InsufficientStock {
                        inventory_id,
                        requested: -delta,
                        available: Decimal::ZERO,
                    });
                }
                let created: SellerStock = store::insert_as(
                    self.store.as_ref(),
                    tables::SELLER_INVENTORY,
                    &json!({
                        "seller_id": seller_id,
                        "inventory_id": inventory_id,
                        "quantity": delta,
                        "last_updated": Utc::now(),
                    }),
                )
                .await?;
                return Ok(created);
            };

            let next = row.quantity + delta;
            if next < Decimal::ZERO {
                return Err(ServiceError::InsufficientStock {
                    inventory_id,
                    requested: -delta,
                    available: row.quantity,
                });
            }
            let guard = Filter::by_id(row.id).eq("quantity", decimal_value(row.quantity));
            let affected = self
                .store
                .update(
                    tables::SELLER_INVENTORY,
                    guard,
                    json!({ "quantity": next, "last_updated": Utc::now() }),
                )
                .await?;
            if affected > 0 {
                return Ok(SellerStock {
                    quantity: next,
                    last_updated: Some(Utc::now()),
                    ..row
                });
            }
        }
        Err(ServiceError::Conflict(format!(
            "seller {} inventory item {}",
            seller_id, inventory_id
        )))
    }

    /// Appends the seller movement row. Not compensated: the stock is
    /// already correct, so a failure here is an audit gap, not a rollback.
    async fn append_movement(
        &self,
        input: &TruckOperation,
        movement_type: SellerMovementType,
    ) -> (Option<SellerMovement>, Option<String>) {
        let result: Result<SellerMovement, _> = store::insert_as(
            self.store.as_ref(),
            tables::SELLER_MOVEMENTS,
            &json!({
                "seller_id": input.seller_id,
                "inventory_id": input.inventory_id,
                "type": movement_type,
                "quantity": input.quantity,
                "notes": input.notes,
            }),
        )
        .await;
        match result {
            Ok(movement) => (Some(movement), None),
            Err(err) => {
                warn!(
                    "Seller movement ({}) could not be logged for seller {}: {}",
                    movement_type, input.seller_id, err
                );
                (
                    None,
                    Some(format!(
                        "La operación quedó aplicada, pero el movimiento no quedó en el historial: {}",
                        err
                    )),
                )
            }
        }
    }
}
