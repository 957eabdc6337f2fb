use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use validator::Validate;

use super::{validate_non_negative, validate_positive};

/// Units offered by the item form; anything else is accepted as free text.
pub const STANDARD_UNITS: &[&str] = &["docenas", "unidades", "kg", "metros"];

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum ItemCategory {
    #[serde(rename = "Materia Prima")]
    #[strum(serialize = "Materia Prima")]
    RawMaterial,
    #[serde(rename = "Producto Terminado")]
    #[strum(serialize = "Producto Terminado")]
    FinishedGood,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum Brand {
    Duramaxi,
    Avanty,
    Diletta,
    Generica,
}

/// Sign tag of a movement; must match the sign of `quantity_change`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum MovementType {
    Entrada,
    Salida,
}

impl MovementType {
    /// The tag a signed delta must carry.
    pub fn for_delta(delta: Decimal) -> Self {
        if delta >= Decimal::ZERO {
            Self::Entrada
        } else {
            Self::Salida
        }
    }
}

/// A trackable stock unit. `quantity` is the authoritative current stock and
/// is only ever mutated through movement-logged operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub category: ItemCategory,
    pub quantity: Decimal,
    pub low_stock_threshold: Decimal,
    pub unit: String,
    pub brand: Brand,
}

impl InventoryItem {
    pub fn is_low_stock(&self) -> bool {
        self.quantity < self.low_stock_threshold
    }
}

/// One audited quantity change. Never deleted; cancelling flips the flag and
/// applies the inverse delta to the item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub id: i64,
    pub inventory_id: i64,
    pub quantity_change: Decimal,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub is_cancelled: bool,
    pub created_at: DateTime<Utc>,
}

/// Item form input. A starting quantity > 0 seeds an initial Entrada
/// movement on creation.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct NewItem {
    #[validate(length(min = 1, message = "el nombre es obligatorio"))]
    pub name: String,
    #[serde(rename = "type")]
    pub category: ItemCategory,
    #[validate(custom = "validate_non_negative")]
    pub quantity: Decimal,
    #[validate(custom = "validate_non_negative")]
    pub low_stock_threshold: Decimal,
    #[validate(length(min = 1, message = "la unidad es obligatoria"))]
    pub unit: String,
    pub brand: Brand,
}

/// Full-row edit from the item form. A changed quantity implies a synthetic
/// adjustment movement; negative-correcting edits are allowed.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct ItemPatch {
    #[validate(length(min = 1, message = "el nombre es obligatorio"))]
    pub name: String,
    #[serde(rename = "type")]
    pub category: ItemCategory,
    pub quantity: Decimal,
    #[validate(custom = "validate_non_negative")]
    pub low_stock_threshold: Decimal,
    #[validate(length(min = 1, message = "la unidad es obligatoria"))]
    pub unit: String,
    pub brand: Brand,
}

/// Stock-movement form input; `quantity` is a magnitude, the type carries
/// the direction.
#[derive(Debug, Clone, Validate)]
pub struct NewMovement {
    pub inventory_id: i64,
    pub movement_type: MovementType,
    #[validate(custom = "validate_positive")]
    pub quantity: Decimal,
    pub reason: Option<String>,
}

/// Insert payload for `inventory_movements`; id and timestamp are
/// store-assigned.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct MovementRecord {
    pub inventory_id: i64,
    pub quantity_change: Decimal,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub reason: Option<String>,
    pub is_cancelled: bool,
}

impl MovementRecord {
    pub(crate) fn for_delta(inventory_id: i64, delta: Decimal, reason: Option<String>) -> Self {
        Self {
            inventory_id,
            quantity_change: delta,
            movement_type: MovementType::for_delta(delta),
            reason,
            is_cancelled: false,
        }
    }
}

/// Result of an item create/update. `audit_gap` is set when the row write
/// succeeded but the synthetic movement could not be logged: stock
/// correctness is prioritized over audit completeness, and the caller must
/// warn the operator that the history is incomplete.
#[derive(Debug, Clone)]
pub struct SavedItem {
    pub item: InventoryItem,
    pub audit_gap: Option<String>,
}
