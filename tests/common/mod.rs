//! Shared fixtures: services wired over the in-memory store.
#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;

use fabrica_core::models::{Brand, InventoryItem, ItemCategory, NewItem, NewRecipeLine, Product};
use fabrica_core::services::AppServices;
use fabrica_core::store::memory::MemoryStore;

pub struct TestApp {
    pub services: AppServices,
    pub store: MemoryStore,
}

pub fn test_app() -> TestApp {
    let store = MemoryStore::new();
    let services = AppServices::new(Arc::new(store.clone()), None);
    TestApp { services, store }
}

pub fn new_item(
    name: &str,
    category: ItemCategory,
    quantity: Decimal,
    threshold: Decimal,
    unit: &str,
) -> NewItem {
    NewItem {
        name: name.to_string(),
        category,
        quantity,
        low_stock_threshold: threshold,
        unit: unit.to_string(),
        brand: Brand::Generica,
    }
}

pub async fn seed_item(
    app: &TestApp,
    name: &str,
    category: ItemCategory,
    quantity: Decimal,
    unit: &str,
) -> InventoryItem {
    app.services
        .inventory
        .create_item(new_item(name, category, quantity, Decimal::ZERO, unit))
        .await
        .expect("seed item")
        .item
}

pub async fn seed_worker(app: &TestApp, name: &str) -> i64 {
    let row = app
        .store
        .seed("workers", json!({ "name": name, "shift": "Mañana" }))
        .await;
    row["id"].as_i64().expect("worker id")
}

/// Creates a product for a finished good plus its recipe lines
/// (material id, per-unit quantity).
pub async fn seed_product_with_recipe(
    app: &TestApp,
    finished_inventory_id: i64,
    lines: &[(i64, Decimal)],
) -> Product {
    let product = app
        .services
        .recipes
        .create_product(finished_inventory_id)
        .await
        .expect("seed product");
    for (material_id, per_unit) in lines {
        app.services
            .recipes
            .add_recipe_line(NewRecipeLine {
                product_id: product.id,
                raw_material_inventory_id: *material_id,
                quantity_required: *per_unit,
            })
            .await
            .expect("seed recipe line");
    }
    product
}

pub async fn quantity_of(app: &TestApp, inventory_id: i64) -> Decimal {
    app.services
        .inventory
        .current_quantity(inventory_id)
        .await
        .expect("current quantity")
}
