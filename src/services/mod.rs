//! Service layer: every UI surface calls these instead of re-deriving
//! quantity arithmetic ad hoc.

pub mod inventory;
pub mod production;
pub mod recipes;
pub mod reports;
pub mod sellers;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::store::RowStore;

pub use inventory::{InventoryService, ItemListQuery, StockPolicy};
pub use production::{FeasibilityReport, ProductionRecord, ProductionService};
pub use recipes::RecipeService;
pub use reports::ReportsService;
pub use sellers::SellerService;

/// The wired service set sharing one store handle and event channel.
#[derive(Clone)]
pub struct AppServices {
    pub inventory: Arc<InventoryService>,
    pub recipes: Arc<RecipeService>,
    pub production: Arc<ProductionService>,
    pub sellers: Arc<SellerService>,
    pub reports: Arc<ReportsService>,
}

impl AppServices {
    pub fn new(store: Arc<dyn RowStore>, events: Option<EventSender>) -> Self {
        let inventory = Arc::new(InventoryService::new(Arc::clone(&store), events.clone()));
        let recipes = Arc::new(RecipeService::new(Arc::clone(&store)));
        let production = Arc::new(ProductionService::new(
            Arc::clone(&store),
            Arc::clone(&inventory),
            Arc::clone(&recipes),
            events.clone(),
        ));
        let sellers = Arc::new(SellerService::new(
            Arc::clone(&store),
            Arc::clone(&inventory),
            events,
        ));
        let reports = Arc::new(ReportsService::new(store, Arc::clone(&inventory)));
        Self {
            inventory,
            recipes,
            production,
            sellers,
            reports,
        }
    }

    /// Like [`AppServices::new`] but honoring the configured retry and page
    /// limits.
    pub fn from_config(
        store: Arc<dyn RowStore>,
        events: Option<EventSender>,
        config: &AppConfig,
    ) -> Self {
        let inventory = Arc::new(
            InventoryService::new(Arc::clone(&store), events.clone()).with_limits(
                config.store.cas_retries,
                config.store.movement_page_limit,
            ),
        );
        let recipes = Arc::new(RecipeService::new(Arc::clone(&store)));
        let production = Arc::new(ProductionService::new(
            Arc::clone(&store),
            Arc::clone(&inventory),
            Arc::clone(&recipes),
            events.clone(),
        ));
        let sellers = Arc::new(SellerService::new(
            Arc::clone(&store),
            Arc::clone(&inventory),
            events,
        ));
        let reports = Arc::new(ReportsService::new(store, Arc::clone(&inventory)));
        Self {
            inventory,
            recipes,
            production,
            sellers,
            reports,
        }
    }
}
