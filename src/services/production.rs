//! Production consumption engine, feasibility checking, the production log
//! and production orders.
//!
//! Logging production is the event that moves stock: the finished good is
//! credited and every recipe line is debited. Deleting a log entry runs the
//! exact mirror. Orders never move stock by themselves; they are plan
//! records that complete when logged production covers them.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::compensation::{Discrepancy, FailedWrite, LedgerChange};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{
    NewOrder, NewProductionLog, OrderStatus, ProductionLogEntry, ProductionOrder, RecipeLine,
    Worker,
};
use crate::services::inventory::{InventoryService, StockPolicy};
use crate::services::recipes::RecipeService;
use crate::store::{self, tables, Filter, Order, RowStore, SelectQuery};

const LOG_PAGE_LIMIT: u64 = 100;

const REASON_PRODUCED: &str = "Producción registrada";
const REASON_CONSUMED: &str = "Consumo producción";
const REASON_REVERSED: &str = "Reversión de producción";
const REASON_RESTORED: &str = "Devolución consumo producción";

/// One material's requirement against current stock, as shown to the
/// operator before an order is created.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialRequirement {
    pub inventory_id: i64,
    pub name: String,
    pub unit: String,
    pub required: Decimal,
    pub available: Decimal,
    pub sufficient: bool,
}

/// Advisory pre-check result: reads current stock at check time and reserves
/// nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct FeasibilityReport {
    pub product_id: i64,
    pub quantity: Decimal,
    pub has_recipe: bool,
    pub feasible: bool,
    pub per_material: Vec<MaterialRequirement>,
}

impl fmt::Display for FeasibilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_recipe {
            return write!(f, "product {} has no recipe defined", self.product_id);
        }
        write!(f, "product {} for quantity {}", self.product_id, self.quantity)?;
        let short: Vec<&MaterialRequirement> =
            self.per_material.iter().filter(|m| !m.sufficient).collect();
        if short.is_empty() {
            return write!(f, ": all materials available");
        }
        write!(f, ": insufficient")?;
        for m in short {
            write!(
                f,
                " [{} required {} available {} {}]",
                m.name, m.required, m.available, m.unit
            )?;
        }
        Ok(())
    }
}

/// The signed ledger effect of one apply/reverse run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductionImpact {
    pub finished_inventory_id: i64,
    pub finished_delta: Decimal,
    pub consumed: Vec<MaterialConsumption>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialConsumption {
    pub inventory_id: i64,
    pub delta: Decimal,
}

/// Result of registering a production event.
#[derive(Debug, Clone)]
pub struct ProductionRecord {
    pub entry: ProductionLogEntry,
    pub impact: ProductionImpact,
    pub order_status: Option<OrderStatus>,
    /// Non-fatal problems the operator must see (e.g. the linked order's
    /// status could not be refreshed).
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct ProductionService {
    store: Arc<dyn RowStore>,
    inventory: Arc<InventoryService>,
    recipes: Arc<RecipeService>,
    events: Option<EventSender>,
}

impl ProductionService {
    pub fn new(
        store: Arc<dyn RowStore>,
        inventory: Arc<InventoryService>,
        recipes: Arc<RecipeService>,
        events: Option<EventSender>,
    ) -> Self {
        Self {
            store,
            inventory,
            recipes,
            events,
        }
    }

    fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    /// Credits the finished good and debits every recipe line for a produced
    /// quantity. The per-line debits are independent writes issued
    /// concurrently and jointly awaited; any that fail are reported together
    /// with what did land — never silently.
    #[instrument(skip(self))]
    pub async fn apply(
        &self,
        product_inventory_id: i64,
        quantity: Decimal,
    ) -> Result<ProductionImpact, ServiceError> {
        self.run_engine(product_inventory_id, quantity, EngineDirection::Apply)
            .await
    }

    /// Exact mirror of [`apply`](Self::apply): debits the finished good and
    /// credits every recipe line. The recipe is resolved at reversal time,
    /// so an edited recipe reverses with its current lines.
    #[instrument(skip(self))]
    pub async fn reverse(
        &self,
        product_inventory_id: i64,
        quantity: Decimal,
    ) -> Result<ProductionImpact, ServiceError> {
        self.run_engine(product_inventory_id, quantity, EngineDirection::Reverse)
            .await
    }

    async fn run_engine(
        &self,
        product_inventory_id: i64,
        quantity: Decimal,
        direction: EngineDirection,
    ) -> Result<ProductionImpact, ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "produced quantity must be positive".to_string(),
            ));
        }

        let lines = match self
            .recipes
            .find_by_finished_inventory(product_inventory_id)
            .await?
        {
            Some(product) => self.recipes.resolve(product.id).await?,
            None => {
                warn!(
                    "No product defined for inventory item {}; only product stock will be updated",
                    product_inventory_id
                );
                Vec::new()
            }
        };

        let (finished_delta, finished_reason) = match direction {
            EngineDirection::Apply => (quantity, REASON_PRODUCED),
            EngineDirection::Reverse => (-quantity, REASON_REVERSED),
        };
        self.inventory
            .apply_delta(
                product_inventory_id,
                finished_delta,
                Some(finished_reason.to_string()),
                StockPolicy::Unchecked,
            )
            .await?;

        let material_reason = match direction {
            EngineDirection::Apply => REASON_CONSUMED,
            EngineDirection::Reverse => REASON_RESTORED,
        };
        let debits = lines.iter().map(|line| {
            let delta = match direction {
                EngineDirection::Apply => -(line.quantity_required * quantity),
                EngineDirection::Reverse => line.quantity_required * quantity,
            };
            let inventory = Arc::clone(&self.inventory);
            async move {
                let result = inventory
                    .apply_delta(
                        line.raw_material_inventory_id,
                        delta,
                        Some(material_reason.to_string()),
                        StockPolicy::Unchecked,
                    )
                    .await;
                (line, delta, result)
            }
        });
        let settled = join_all(debits).await;

        let mut consumed = Vec::with_capacity(settled.len());
        let mut failed = Vec::new();
        for (line, delta, result) in settled {
            match result {
                Ok(_) => consumed.push(MaterialConsumption {
                    inventory_id: line.raw_material_inventory_id,
                    delta,
                }),
                Err(err) => failed.push(FailedWrite {
                    table: tables::INVENTORY,
                    row_id: line.raw_material_inventory_id,
                    delta,
                    reason: err.to_string(),
                }),
            }
        }

        let impact = ProductionImpact {
            finished_inventory_id: product_inventory_id,
            finished_delta,
            consumed,
        };

        if !failed.is_empty() {
            // No cross-row transaction exists to undo the lines that did
            // land; the duty here is an exact account for manual
            // reconciliation.
            let mut discrepancy = Discrepancy::new(match direction {
                EngineDirection::Apply => {
                    format!("consumo de producción del artículo {}", product_inventory_id)
                }
                EngineDirection::Reverse => {
                    format!("reversión de producción del artículo {}", product_inventory_id)
                }
            });
            discrepancy.applied.push(LedgerChange {
                table: tables::INVENTORY,
                row_id: product_inventory_id,
                delta: finished_delta,
            });
            discrepancy
                .applied
                .extend(impact.consumed.iter().map(|c| LedgerChange {
                    table: tables::INVENTORY,
                    row_id: c.inventory_id,
                    delta: c.delta,
                }));
            discrepancy.failed = failed;
            return Err(ServiceError::PartialConsistency(discrepancy));
        }

        info!(
            "Production {} for item {}: quantity={}, materials={}",
            match direction {
                EngineDirection::Apply => "applied",
                EngineDirection::Reverse => "reversed",
            },
            product_inventory_id,
            quantity,
            impact.consumed.len()
        );
        Ok(impact)
    }

    /// Reads current stock against the recipe for a desired quantity.
    /// Advisory only: nothing is locked or reserved between this check and
    /// order creation.
    #[instrument(skip(self))]
    pub async fn check_feasibility(
        &self,
        product_id: i64,
        quantity: Decimal,
    ) -> Result<FeasibilityReport, ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "la cantidad a producir debe ser positiva".to_string(),
            ));
        }
        let lines = self.recipes.resolve(product_id).await?;
        if lines.is_empty() {
            return Ok(FeasibilityReport {
                product_id,
                quantity,
                has_recipe: false,
                feasible: false,
                per_material: Vec::new(),
            });
        }

        let mut per_material = Vec::with_capacity(lines.len());
        for line in &lines {
            let required = line.quantity_required * quantity;
            let (name, unit, available) = match self
                .inventory
                .get_item(line.raw_material_inventory_id)
                .await
            {
                Ok(item) => (item.name, item.unit, item.quantity),
                Err(ServiceError::NotFound(_)) => {
                    ("Desconocido".to_string(), String::new(), Decimal::ZERO)
                }
                Err(err) => return Err(err),
            };
            per_material.push(MaterialRequirement {
                inventory_id: line.raw_material_inventory_id,
                name,
                unit,
                required,
                available,
                sufficient: available >= required,
            });
        }
        let feasible = per_material.iter().all(|m| m.sufficient);
        Ok(FeasibilityReport {
            product_id,
            quantity,
            has_recipe: true,
            feasible,
            per_material,
        })
    }

    /// Creates a plan record after the feasibility gate passes. Stock is not
    /// consumed here.
    #[instrument(skip(self, input), fields(product_id = input.product_id))]
    pub async fn create_order(&self, input: NewOrder) -> Result<ProductionOrder, ServiceError> {
        input.validate()?;
        let report = self
            .check_feasibility(input.product_id, input.quantity_to_produce)
            .await?;
        if !report.feasible {
            return Err(ServiceError::Infeasible(report));
        }

        let order: ProductionOrder = store::insert_as(
            self.store.as_ref(),
            tables::PRODUCTION_ORDERS,
            &json!({
                "product_id": input.product_id,
                "quantity_to_produce": input.quantity_to_produce,
                "status": OrderStatus::Pendiente,
            }),
        )
        .await?;
        info!(
            "Production order created: id={}, product={}, quantity={}",
            order.id, order.product_id, order.quantity_to_produce
        );
        Ok(order)
    }

    pub async fn get_order(&self, order_id: i64) -> Result<ProductionOrder, ServiceError> {
        store::find_by_id(self.store.as_ref(), tables::PRODUCTION_ORDERS, order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("production order {}", order_id)))
    }

    #[instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<ProductionOrder>, ServiceError> {
        Ok(store::select_as(
            self.store.as_ref(),
            tables::PRODUCTION_ORDERS,
            SelectQuery::default().order_by(Order::desc("created_at")),
        )
        .await?)
    }

    /// Registers an executed production event. The log row is inserted
    /// first; the stock effects follow. A failed stock update leaves the log
    /// row standing (it is the traceability needed to reconcile) and the
    /// error accounts for both.
    #[instrument(skip(self, input), fields(inventory_id = input.inventory_id))]
    pub async fn log_production(
        &self,
        input: NewProductionLog,
    ) -> Result<ProductionRecord, ServiceError> {
        input.validate()?;
        let _worker: Worker =
            store::find_by_id(self.store.as_ref(), tables::WORKERS, input.worker_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("worker {}", input.worker_id)))?;
        self.inventory.get_item(input.inventory_id).await?;

        if let Some(order_id) = input.production_order_id {
            let order = self.get_order(order_id).await?;
            let product = self.recipes.get_product(order.product_id).await?;
            if product.finished_product_inventory_id != input.inventory_id {
                return Err(ServiceError::InvalidOperation(format!(
                    "order {} is for product '{}', not inventory item {}",
                    order_id, product.name, input.inventory_id
                )));
            }
        }

        let entry: ProductionLogEntry = store::insert_as(
            self.store.as_ref(),
            tables::PRODUCTION_LOG,
            &json!({
                "worker_id": input.worker_id,
                "inventory_id": input.inventory_id,
                "quantity": input.quantity,
                "production_date": input.production_date,
                "production_order_id": input.production_order_id,
            }),
        )
        .await?;

        let impact = match self.apply(input.inventory_id, input.quantity).await {
            Ok(impact) => impact,
            Err(ServiceError::PartialConsistency(mut discrepancy)) => {
                discrepancy.applied.insert(
                    0,
                    LedgerChange {
                        table: tables::PRODUCTION_LOG,
                        row_id: entry.id,
                        delta: input.quantity,
                    },
                );
                return Err(ServiceError::PartialConsistency(discrepancy));
            }
            Err(err) => {
                // Nothing of the stock effect landed, but the log row did:
                // account for it rather than letting a retry double-log.
                let mut discrepancy =
                    Discrepancy::new(format!("registro de producción {}", entry.id));
                discrepancy.applied.push(LedgerChange {
                    table: tables::PRODUCTION_LOG,
                    row_id: entry.id,
                    delta: input.quantity,
                });
                discrepancy.failed.push(FailedWrite {
                    table: tables::INVENTORY,
                    row_id: input.inventory_id,
                    delta: input.quantity,
                    reason: err.to_string(),
                });
                return Err(ServiceError::PartialConsistency(discrepancy));
            }
        };

        self.emit(Event::ProductionLogged {
            log_id: entry.id,
            inventory_id: entry.inventory_id,
            quantity: entry.quantity,
            production_date: entry.production_date,
        });

        let mut warnings = Vec::new();
        let order_status = match input.production_order_id {
            Some(order_id) => match self.refresh_order_progress(order_id).await {
                Ok(status) => Some(status),
                Err(err) => {
                    warn!("Order {} status refresh failed: {}", order_id, err);
                    warnings.push(format!(
                        "La producción quedó registrada, pero el estado de la orden {} no pudo actualizarse: {}",
                        order_id, err
                    ));
                    None
                }
            },
            None => None,
        };

        Ok(ProductionRecord {
            entry,
            impact,
            order_status,
            warnings,
        })
    }

    /// Deletes a production log entry, reversing its stock effects first.
    /// When the reversal fails the row is kept — losing it would destroy the
    /// trace needed for manual reconciliation.
    #[instrument(skip(self))]
    pub async fn delete_log(&self, log_id: i64) -> Result<(), ServiceError> {
        let entry: ProductionLogEntry =
            store::find_by_id(self.store.as_ref(), tables::PRODUCTION_LOG, log_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("production log {}", log_id)))?;

        let impact = self.reverse(entry.inventory_id, entry.quantity).await?;

        match self
            .store
            .delete(tables::PRODUCTION_LOG, Filter::by_id(log_id))
            .await
        {
            Ok(_) => {}
            Err(delete_err) => {
                // Stock is already reversed; a retry of this whole call
                // would reverse it twice. Name every applied delta.
                let mut discrepancy =
                    Discrepancy::new(format!("eliminación del registro de producción {}", log_id));
                discrepancy.applied.push(LedgerChange {
                    table: tables::INVENTORY,
                    row_id: impact.finished_inventory_id,
                    delta: impact.finished_delta,
                });
                discrepancy
                    .applied
                    .extend(impact.consumed.iter().map(|c| LedgerChange {
                        table: tables::INVENTORY,
                        row_id: c.inventory_id,
                        delta: c.delta,
                    }));
                discrepancy.failed.push(FailedWrite {
                    table: tables::PRODUCTION_LOG,
                    row_id: log_id,
                    delta: -entry.quantity,
                    reason: delete_err.to_string(),
                });
                return Err(ServiceError::PartialConsistency(discrepancy));
            }
        }

        info!(
            "Production log deleted: id={}, item={}, quantity={}",
            log_id, entry.inventory_id, entry.quantity
        );
        self.emit(Event::ProductionReversed {
            log_id,
            inventory_id: entry.inventory_id,
            quantity: entry.quantity,
        });
        Ok(())
    }

    /// Recent log entries, newest production date first.
    #[instrument(skip(self))]
    pub async fn recent_logs(
        &self,
        limit: Option<u64>,
    ) -> Result<Vec<ProductionLogEntry>, ServiceError> {
        let query = SelectQuery::default()
            .order_by(Order::desc("production_date"))
            .order_by(Order::desc("created_at"))
            .limit(limit.unwrap_or(LOG_PAGE_LIMIT).min(LOG_PAGE_LIMIT));
        Ok(store::select_as(self.store.as_ref(), tables::PRODUCTION_LOG, query).await?)
    }

    /// Order lifecycle: a log against a Pendiente order moves it to "En
    /// Proceso"; when logged production covers the ordered quantity the
    /// order completes and the completion time is stamped. Orders never
    /// regress automatically.
    async fn refresh_order_progress(&self, order_id: i64) -> Result<OrderStatus, ServiceError> {
        let order = self.get_order(order_id).await?;
        if order.status == OrderStatus::Completado {
            return Ok(OrderStatus::Completado);
        }

        let logged: Vec<ProductionLogEntry> = store::select_as(
            self.store.as_ref(),
            tables::PRODUCTION_LOG,
            SelectQuery::filtered(Filter::new().eq("production_order_id", order_id)),
        )
        .await?;
        let total: Decimal = logged.iter().map(|entry| entry.quantity).sum();

        if total >= order.quantity_to_produce {
            self.store
                .update(
                    tables::PRODUCTION_ORDERS,
                    Filter::by_id(order_id),
                    json!({
                        "status": OrderStatus::Completado,
                        "completed_at": Utc::now(),
                    }),
                )
                .await?;
            info!("Production order completed: id={}, total={}", order_id, total);
            self.emit(Event::OrderCompleted { order_id });
            Ok(OrderStatus::Completado)
        } else if order.status == OrderStatus::Pendiente {
            self.store
                .update(
                    tables::PRODUCTION_ORDERS,
                    Filter::by_id(order_id),
                    json!({ "status": OrderStatus::EnProceso }),
                )
                .await?;
            Ok(OrderStatus::EnProceso)
        } else {
            Ok(order.status)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineDirection {
    Apply,
    Reverse,
}
