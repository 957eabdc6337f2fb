//! Seller truck sub-ledger: conservation across Carga/Venta/Devolución and
//! the transfer compensation paths.

mod common;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::{quantity_of, seed_item, test_app, TestApp};
use fabrica_core::errors::ServiceError;
use fabrica_core::models::{ItemCategory, SellerMovementType, TruckOperation};
use fabrica_core::store::memory::StoreOp;
use fabrica_core::store::tables;

fn op(seller_id: i64, inventory_id: i64, quantity: Decimal) -> TruckOperation {
    TruckOperation {
        seller_id,
        inventory_id,
        quantity,
        notes: None,
    }
}

async fn truck_quantity(app: &TestApp, seller_id: i64, inventory_id: i64) -> Decimal {
    app.services
        .sellers
        .truck_stock(seller_id)
        .await
        .unwrap()
        .iter()
        .find(|row| row.inventory_id == inventory_id)
        .map(|row| row.quantity)
        .unwrap_or(Decimal::ZERO)
}

#[tokio::test]
async fn carga_venta_devolucion_conserve_and_deplete_correctly() {
    let app = test_app();
    let item = seed_item(&app, "Escoba A", ItemCategory::FinishedGood, dec!(100), "unidades").await;
    let seller = app.services.sellers.create_seller("Pedro").await.unwrap();

    // Carga moves 12 central -> truck; the total is conserved.
    app.services
        .sellers
        .load_truck(op(seller.id, item.id, dec!(12)))
        .await
        .unwrap();
    assert_eq!(quantity_of(&app, item.id).await, dec!(88));
    assert_eq!(truck_quantity(&app, seller.id, item.id).await, dec!(12));

    // Venta takes 5 out of the system from the truck only.
    app.services
        .sellers
        .record_sale(op(seller.id, item.id, dec!(5)))
        .await
        .unwrap();
    assert_eq!(quantity_of(&app, item.id).await, dec!(88));
    assert_eq!(truck_quantity(&app, seller.id, item.id).await, dec!(7));

    // Devolución moves 3 truck -> central; the total is conserved again.
    app.services
        .sellers
        .return_to_central(op(seller.id, item.id, dec!(3)))
        .await
        .unwrap();
    assert_eq!(quantity_of(&app, item.id).await, dec!(91));
    assert_eq!(truck_quantity(&app, seller.id, item.id).await, dec!(4));

    // Central ledger audited both transfer legs.
    let movements = app.services.inventory.recent_movements(None).await.unwrap();
    assert!(movements
        .iter()
        .any(|m| m.quantity_change == dec!(-12)
            && m.reason.as_deref() == Some("Carga a Vendedor: Pedro")));
    assert!(movements
        .iter()
        .any(|m| m.quantity_change == dec!(3)
            && m.reason.as_deref() == Some("Devolución de Vendedor: Pedro")));

    // And the seller history has one row per operation.
    let seller_movements = app
        .services
        .sellers
        .recent_movements(seller.id, None)
        .await
        .unwrap();
    let types: Vec<SellerMovementType> =
        seller_movements.iter().map(|m| m.movement_type).collect();
    assert_eq!(seller_movements.len(), 3);
    assert!(types.contains(&SellerMovementType::Carga));
    assert!(types.contains(&SellerMovementType::Venta));
    assert!(types.contains(&SellerMovementType::Devolucion));
}

#[tokio::test]
async fn carga_beyond_central_stock_is_rejected() {
    let app = test_app();
    let item = seed_item(&app, "Cepillo", ItemCategory::FinishedGood, dec!(5), "unidades").await;
    let seller = app.services.sellers.create_seller("Lucía").await.unwrap();

    let err = app
        .services
        .sellers
        .load_truck(op(seller.id, item.id, dec!(12)))
        .await
        .unwrap_err();

    assert_matches!(
        err,
        ServiceError::InsufficientStock { requested, available, .. }
            if requested == dec!(12) && available == dec!(5)
    );
    assert_eq!(quantity_of(&app, item.id).await, dec!(5));
    assert!(app.store.dump(tables::SELLER_INVENTORY).await.is_empty());
}

#[tokio::test]
async fn venta_beyond_truck_stock_is_rejected() {
    let app = test_app();
    let item = seed_item(&app, "Mopa", ItemCategory::FinishedGood, dec!(50), "docenas").await;
    let seller = app.services.sellers.create_seller("Pedro").await.unwrap();
    app.services
        .sellers
        .load_truck(op(seller.id, item.id, dec!(5)))
        .await
        .unwrap();

    let err = app
        .services
        .sellers
        .record_sale(op(seller.id, item.id, dec!(8)))
        .await
        .unwrap_err();

    assert_matches!(
        err,
        ServiceError::InsufficientStock { requested, available, .. }
            if requested == dec!(8) && available == dec!(5)
    );
    assert_eq!(truck_quantity(&app, seller.id, item.id).await, dec!(5));
}

#[tokio::test]
async fn sale_with_no_truck_row_is_rejected() {
    let app = test_app();
    let item = seed_item(&app, "Escobillón", ItemCategory::FinishedGood, dec!(50), "unidades").await;
    let seller = app.services.sellers.create_seller("Raúl").await.unwrap();

    let err = app
        .services
        .sellers
        .record_sale(op(seller.id, item.id, dec!(1)))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientStock { available, .. } if available == Decimal::ZERO
    );
}

#[tokio::test]
async fn failed_truck_credit_recredits_the_central_ledger() {
    let app = test_app();
    let item = seed_item(&app, "Escoba A", ItemCategory::FinishedGood, dec!(100), "unidades").await;
    let seller = app.services.sellers.create_seller("Pedro").await.unwrap();

    app.store
        .fail_once(tables::SELLER_INVENTORY, StoreOp::Insert)
        .await;
    let err = app
        .services
        .sellers
        .load_truck(op(seller.id, item.id, dec!(12)))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::Store(_));
    assert_eq!(quantity_of(&app, item.id).await, dec!(100));
    assert!(app.store.dump(tables::SELLER_INVENTORY).await.is_empty());
    // The compensation is itself audited: debit then re-credit.
    let movements = app.services.inventory.recent_movements(None).await.unwrap();
    assert!(movements.iter().any(|m| m.quantity_change == dec!(-12)));
    assert!(movements
        .iter()
        .any(|m| m.quantity_change == dec!(12)
            && m.reason.as_deref() == Some("Reversión de carga fallida: Pedro")));
}

#[tokio::test]
async fn failed_central_credit_on_return_restores_the_truck() {
    let app = test_app();
    let item = seed_item(&app, "Escoba A", ItemCategory::FinishedGood, dec!(100), "unidades").await;
    let seller = app.services.sellers.create_seller("Pedro").await.unwrap();
    app.services
        .sellers
        .load_truck(op(seller.id, item.id, dec!(10)))
        .await
        .unwrap();

    app.store.fail_once(tables::INVENTORY, StoreOp::Update).await;
    let err = app
        .services
        .sellers
        .return_to_central(op(seller.id, item.id, dec!(4)))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::Store(_));
    assert_eq!(quantity_of(&app, item.id).await, dec!(90));
    assert_eq!(truck_quantity(&app, seller.id, item.id).await, dec!(10));
}

#[tokio::test]
async fn movement_log_failure_is_an_audit_gap_not_a_rollback() {
    let app = test_app();
    let item = seed_item(&app, "Escoba A", ItemCategory::FinishedGood, dec!(100), "unidades").await;
    let seller = app.services.sellers.create_seller("Pedro").await.unwrap();

    app.store
        .fail_once(tables::SELLER_MOVEMENTS, StoreOp::Insert)
        .await;
    let transfer = app
        .services
        .sellers
        .load_truck(op(seller.id, item.id, dec!(12)))
        .await
        .unwrap();

    assert!(transfer.movement.is_none());
    assert!(transfer.audit_gap.is_some());
    assert_eq!(quantity_of(&app, item.id).await, dec!(88));
    assert_eq!(truck_quantity(&app, seller.id, item.id).await, dec!(12));
}

#[tokio::test]
async fn deleting_a_seller_removes_stock_and_history() {
    let app = test_app();
    let item = seed_item(&app, "Escoba A", ItemCategory::FinishedGood, dec!(100), "unidades").await;
    let seller = app.services.sellers.create_seller("Pedro").await.unwrap();
    app.services
        .sellers
        .load_truck(op(seller.id, item.id, dec!(12)))
        .await
        .unwrap();

    app.services.sellers.delete_seller(seller.id).await.unwrap();

    assert!(app.store.dump(tables::SELLER_INVENTORY).await.is_empty());
    assert!(app.store.dump(tables::SELLER_MOVEMENTS).await.is_empty());
    assert_matches!(
        app.services.sellers.get_seller(seller.id).await.unwrap_err(),
        ServiceError::NotFound(_)
    );
    // The central ledger still remembers the load.
    assert_eq!(quantity_of(&app, item.id).await, dec!(88));
}

#[tokio::test]
async fn repeated_loads_accumulate_on_the_same_truck_row() {
    let app = test_app();
    let item = seed_item(&app, "Escoba A", ItemCategory::FinishedGood, dec!(100), "unidades").await;
    let seller = app.services.sellers.create_seller("Pedro").await.unwrap();

    app.services
        .sellers
        .load_truck(op(seller.id, item.id, dec!(4)))
        .await
        .unwrap();
    app.services
        .sellers
        .load_truck(op(seller.id, item.id, dec!(6)))
        .await
        .unwrap();

    let stock = app.services.sellers.truck_stock(seller.id).await.unwrap();
    assert_eq!(stock.len(), 1);
    assert_eq!(stock[0].quantity, dec!(10));
    assert_eq!(quantity_of(&app, item.id).await, dec!(90));
}
