use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use validator::Validate;

use super::validate_positive;

/// A mobile seller (truck) carrying its own sub-ledger of goods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seller {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Per-(seller, item) stock on the truck; mirrors the central ledger
/// semantics at a smaller scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerStock {
    pub id: i64,
    pub seller_id: i64,
    pub inventory_id: i64,
    pub quantity: Decimal,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Carga moves goods central → truck, Venta takes them out of the system,
/// Devolución moves them truck → central.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum SellerMovementType {
    Carga,
    Venta,
    #[serde(rename = "Devolución")]
    #[strum(serialize = "Devolución")]
    Devolucion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerMovement {
    pub id: i64,
    pub seller_id: i64,
    pub inventory_id: i64,
    #[serde(rename = "type")]
    pub movement_type: SellerMovementType,
    pub quantity: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Shared form input for the three truck operations.
#[derive(Debug, Clone, Validate)]
pub struct TruckOperation {
    pub seller_id: i64,
    pub inventory_id: i64,
    #[validate(custom = "validate_positive")]
    pub quantity: Decimal,
    pub notes: Option<String>,
}

/// Outcome of a truck operation. Like item edits, the trailing movement
/// insert is not compensated: a failed audit write leaves the stock correct
/// and `audit_gap` tells the operator the history is incomplete.
#[derive(Debug, Clone)]
pub struct TruckTransfer {
    pub seller_stock: SellerStock,
    pub movement: Option<SellerMovement>,
    pub audit_gap: Option<String>,
}
