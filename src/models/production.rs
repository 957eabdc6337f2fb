use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use validator::Validate;

use super::validate_positive;

/// A named finished good with a defined recipe. Exactly one product per
/// finished-good inventory item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub finished_product_inventory_id: i64,
    pub created_at: DateTime<Utc>,
}

/// One bill-of-materials line: raw material required per unit of product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeLine {
    pub id: i64,
    pub product_id: i64,
    pub raw_material_inventory_id: i64,
    pub quantity_required: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum OrderStatus {
    Pendiente,
    #[serde(rename = "En Proceso")]
    #[strum(serialize = "En Proceso")]
    EnProceso,
    Completado,
}

/// A planned production run. Creation is a plan record only; stock effects
/// happen through production log entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionOrder {
    pub id: i64,
    pub product_id: i64,
    pub quantity_to_produce: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// An executed production event; creating one drives the consumption engine
/// and deleting one drives its reversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionLogEntry {
    pub id: i64,
    pub worker_id: i64,
    pub inventory_id: i64,
    pub quantity: Decimal,
    pub production_date: NaiveDate,
    #[serde(default)]
    pub production_order_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Worker lookup row; the production log validates the reference exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub shift: Option<String>,
}

#[derive(Debug, Clone, Validate)]
pub struct NewRecipeLine {
    pub product_id: i64,
    pub raw_material_inventory_id: i64,
    #[validate(custom = "validate_positive")]
    pub quantity_required: Decimal,
}

#[derive(Debug, Clone, Validate)]
pub struct NewOrder {
    pub product_id: i64,
    #[validate(custom = "validate_positive")]
    pub quantity_to_produce: Decimal,
}

#[derive(Debug, Clone, Validate)]
pub struct NewProductionLog {
    pub worker_id: i64,
    pub inventory_id: i64,
    #[validate(custom = "validate_positive")]
    pub quantity: Decimal,
    pub production_date: NaiveDate,
    pub production_order_id: Option<i64>,
}
