//! Products and their bills of materials.
//!
//! A product is a finished-good inventory item promoted to "fabricable" by
//! giving it a recipe. Resolution returns the one-level material list; an
//! empty list means "no recipe" and is not an error — callers decide whether
//! that blocks them (order creation) or not (ad-hoc production).

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};
use validator::Validate;

use crate::errors::ServiceError;
use crate::models::{InventoryItem, ItemCategory, NewRecipeLine, Product, RecipeLine};
use crate::store::{self, tables, Filter, Order, RowStore, SelectQuery};

#[derive(Clone)]
pub struct RecipeService {
    store: Arc<dyn RowStore>,
}

impl RecipeService {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }

    pub async fn get_product(&self, product_id: i64) -> Result<Product, ServiceError> {
        store::find_by_id(self.store.as_ref(), tables::PRODUCTS, product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {}", product_id)))
    }

    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<Product>, ServiceError> {
        Ok(store::select_as(
            self.store.as_ref(),
            tables::PRODUCTS,
            SelectQuery::default().order_by(Order::asc("name")),
        )
        .await?)
    }

    /// Looks a product up by the finished-good item it produces. `None` is a
    /// normal answer (the item has no recipe attached), distinct from a
    /// missing product id.
    pub async fn find_by_finished_inventory(
        &self,
        inventory_id: i64,
    ) -> Result<Option<Product>, ServiceError> {
        Ok(store::select_one(
            self.store.as_ref(),
            tables::PRODUCTS,
            Filter::new().eq("finished_product_inventory_id", inventory_id),
        )
        .await?)
    }

    /// Promotes a finished-good inventory item to a product. One product per
    /// item; the product takes the item's name.
    #[instrument(skip(self))]
    pub async fn create_product(&self, inventory_id: i64) -> Result<Product, ServiceError> {
        let item: InventoryItem =
            store::find_by_id(self.store.as_ref(), tables::INVENTORY, inventory_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("inventory item {}", inventory_id))
                })?;
        if item.category != ItemCategory::FinishedGood {
            return Err(ServiceError::InvalidOperation(format!(
                "'{}' is not a finished good",
                item.name
            )));
        }
        if self.find_by_finished_inventory(inventory_id).await?.is_some() {
            return Err(ServiceError::InvalidOperation(format!(
                "'{}' already has a product",
                item.name
            )));
        }

        let product: Product = store::insert_as(
            self.store.as_ref(),
            tables::PRODUCTS,
            &json!({
                "name": item.name,
                "finished_product_inventory_id": inventory_id,
            }),
        )
        .await?;
        info!("Product created: id={}, name={}", product.id, product.name);
        Ok(product)
    }

    /// Deletes a product and its recipe lines. Orders and logs that
    /// reference it keep their rows.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, product_id: i64) -> Result<(), ServiceError> {
        self.store
            .delete(
                tables::PRODUCT_RECIPES,
                Filter::new().eq("product_id", product_id),
            )
            .await?;
        let affected = self
            .store
            .delete(tables::PRODUCTS, Filter::by_id(product_id))
            .await?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!("product {}", product_id)));
        }
        info!("Product deleted: id={}", product_id);
        Ok(())
    }

    /// Adds one bill-of-materials line. The material must exist and be a raw
    /// material; per-unit quantity must be positive.
    #[instrument(skip(self, input), fields(product_id = input.product_id))]
    pub async fn add_recipe_line(&self, input: NewRecipeLine) -> Result<RecipeLine, ServiceError> {
        input.validate()?;
        self.get_product(input.product_id).await?;
        let material: InventoryItem = store::find_by_id(
            self.store.as_ref(),
            tables::INVENTORY,
            input.raw_material_inventory_id,
        )
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "inventory item {}",
                input.raw_material_inventory_id
            ))
        })?;
        if material.category != ItemCategory::RawMaterial {
            return Err(ServiceError::InvalidOperation(format!(
                "'{}' is not a raw material",
                material.name
            )));
        }

        let line: RecipeLine = store::insert_as(
            self.store.as_ref(),
            tables::PRODUCT_RECIPES,
            &json!({
                "product_id": input.product_id,
                "raw_material_inventory_id": input.raw_material_inventory_id,
                "quantity_required": input.quantity_required.to_string(),
            }),
        )
        .await?;
        info!(
            "Recipe line added: product={}, material={}, per_unit={}",
            line.product_id, line.raw_material_inventory_id, line.quantity_required
        );
        Ok(line)
    }

    #[instrument(skip(self))]
    pub async fn remove_recipe_line(&self, line_id: i64) -> Result<(), ServiceError> {
        let affected = self
            .store
            .delete(tables::PRODUCT_RECIPES, Filter::by_id(line_id))
            .await?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!("recipe line {}", line_id)));
        }
        Ok(())
    }

    /// Resolves the one-level bill of materials. An empty vec means the
    /// product has no recipe; a missing product is `NotFound`.
    #[instrument(skip(self))]
    pub async fn resolve(&self, product_id: i64) -> Result<Vec<RecipeLine>, ServiceError> {
        self.get_product(product_id).await?;
        Ok(store::select_as(
            self.store.as_ref(),
            tables::PRODUCT_RECIPES,
            SelectQuery::filtered(Filter::new().eq("product_id", product_id)),
        )
        .await?)
    }
}
