//! Consumption engine, feasibility checking, production log and order
//! lifecycle.

mod common;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use rstest::rstest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::{quantity_of, seed_item, seed_product_with_recipe, seed_worker, test_app, TestApp};
use fabrica_core::errors::ServiceError;
use fabrica_core::models::{ItemCategory, NewOrder, NewProductionLog, OrderStatus};
use fabrica_core::store::tables;

fn log_input(worker_id: i64, inventory_id: i64, quantity: Decimal) -> NewProductionLog {
    NewProductionLog {
        worker_id,
        inventory_id,
        quantity,
        production_date: NaiveDate::from_ymd_opt(2024, 5, 17).unwrap(),
        production_order_id: None,
    }
}

/// Escoba A: 0.5 Cerdas and 1 Mango per unit.
async fn escoba_fixture(app: &TestApp, cerdas_stock: Decimal, mango_stock: Decimal) -> (i64, i64, i64, i64) {
    let cerdas = seed_item(app, "Cerdas", ItemCategory::RawMaterial, cerdas_stock, "kg").await;
    let mango = seed_item(app, "Mango", ItemCategory::RawMaterial, mango_stock, "unidades").await;
    let escoba = seed_item(app, "Escoba A", ItemCategory::FinishedGood, dec!(0), "unidades").await;
    let product = seed_product_with_recipe(
        app,
        escoba.id,
        &[(cerdas.id, dec!(0.5)), (mango.id, dec!(1))],
    )
    .await;
    (product.id, escoba.id, cerdas.id, mango.id)
}

#[tokio::test]
async fn logging_production_consumes_the_recipe_and_deleting_reverses_it() {
    let app = test_app();
    let (_, escoba, cerdas, mango) = escoba_fixture(&app, dec!(400), dec!(100)).await;
    let worker = seed_worker(&app, "Ana García").await;

    let record = app
        .services
        .production
        .log_production(log_input(worker, escoba, dec!(20)))
        .await
        .unwrap();
    assert_eq!(record.impact.finished_delta, dec!(20));
    assert_eq!(record.impact.consumed.len(), 2);
    assert_eq!(quantity_of(&app, escoba).await, dec!(20));
    assert_eq!(quantity_of(&app, cerdas).await, dec!(390));
    assert_eq!(quantity_of(&app, mango).await, dec!(80));

    // Three ledger movements: the credit plus both consumptions.
    let movements = app.services.inventory.recent_movements(None).await.unwrap();
    assert_eq!(
        movements
            .iter()
            .filter(|m| m.reason.as_deref() == Some("Producción registrada"))
            .count(),
        1
    );
    assert_eq!(
        movements
            .iter()
            .filter(|m| m.reason.as_deref() == Some("Consumo producción"))
            .count(),
        2
    );

    app.services
        .production
        .delete_log(record.entry.id)
        .await
        .unwrap();
    assert_eq!(quantity_of(&app, escoba).await, dec!(0));
    assert_eq!(quantity_of(&app, cerdas).await, dec!(400));
    assert_eq!(quantity_of(&app, mango).await, dec!(100));
    assert!(app.store.dump(tables::PRODUCTION_LOG).await.is_empty());
}

#[tokio::test]
async fn feasibility_flags_only_the_short_material() {
    let app = test_app();
    let (product, _, cerdas, mango) = escoba_fixture(&app, dec!(400), dec!(2000)).await;

    let report = app
        .services
        .production
        .check_feasibility(product, dec!(1000))
        .await
        .unwrap();

    assert!(report.has_recipe);
    assert!(!report.feasible);
    let cerdas_line = report
        .per_material
        .iter()
        .find(|m| m.inventory_id == cerdas)
        .unwrap();
    assert_eq!(cerdas_line.required, dec!(500));
    assert_eq!(cerdas_line.available, dec!(400));
    assert!(!cerdas_line.sufficient);
    let mango_line = report
        .per_material
        .iter()
        .find(|m| m.inventory_id == mango)
        .unwrap();
    assert!(mango_line.sufficient);
}

#[rstest]
#[case(dec!(500), true)]
#[case(dec!(499.99), false)]
#[tokio::test]
async fn feasibility_boundary_at_exact_requirement(
    #[case] available: Decimal,
    #[case] expected: bool,
) {
    let app = test_app();
    let (product, _, cerdas, _) = escoba_fixture(&app, available, dec!(2000)).await;

    let report = app
        .services
        .production
        .check_feasibility(product, dec!(1000))
        .await
        .unwrap();
    let cerdas_line = report
        .per_material
        .iter()
        .find(|m| m.inventory_id == cerdas)
        .unwrap();
    assert_eq!(cerdas_line.sufficient, expected);
    assert_eq!(report.feasible, expected);
}

#[tokio::test]
async fn unreciped_product_is_not_orderable_regardless_of_quantity() {
    let app = test_app();
    let escoba = seed_item(&app, "Escoba B", ItemCategory::FinishedGood, dec!(0), "unidades").await;
    let product = seed_product_with_recipe(&app, escoba.id, &[]).await;

    let report = app
        .services
        .production
        .check_feasibility(product.id, dec!(1))
        .await
        .unwrap();
    assert!(!report.has_recipe);
    assert!(!report.feasible);

    let err = app
        .services
        .production
        .create_order(NewOrder {
            product_id: product.id,
            quantity_to_produce: dec!(1),
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Infeasible(report) if !report.has_recipe);
}

#[tokio::test]
async fn feasibility_for_missing_product_is_not_found() {
    let app = test_app();
    let err = app
        .services
        .production
        .check_feasibility(999, dec!(1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn ad_hoc_production_without_product_touches_only_the_finished_good() {
    let app = test_app();
    let escoba = seed_item(&app, "Escoba C", ItemCategory::FinishedGood, dec!(5), "unidades").await;
    let worker = seed_worker(&app, "Luis Fernández").await;

    let record = app
        .services
        .production
        .log_production(log_input(worker, escoba.id, dec!(10)))
        .await
        .unwrap();

    assert!(record.impact.consumed.is_empty());
    assert_eq!(quantity_of(&app, escoba.id).await, dec!(15));
}

#[tokio::test]
async fn order_advances_to_in_process_and_completes_when_covered() {
    let app = test_app();
    let (product, escoba, _, _) = escoba_fixture(&app, dec!(400), dec!(2000)).await;
    let worker = seed_worker(&app, "Carlos Martínez").await;

    let order = app
        .services
        .production
        .create_order(NewOrder {
            product_id: product,
            quantity_to_produce: dec!(50),
        })
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Pendiente);
    assert!(order.completed_at.is_none());

    let mut input = log_input(worker, escoba, dec!(20));
    input.production_order_id = Some(order.id);
    let record = app.services.production.log_production(input).await.unwrap();
    assert_eq!(record.order_status, Some(OrderStatus::EnProceso));

    let mut input = log_input(worker, escoba, dec!(30));
    input.production_order_id = Some(order.id);
    let record = app.services.production.log_production(input).await.unwrap();
    assert_eq!(record.order_status, Some(OrderStatus::Completado));

    let refreshed = app.services.production.get_order(order.id).await.unwrap();
    assert_eq!(refreshed.status, OrderStatus::Completado);
    assert!(refreshed.completed_at.is_some());
}

#[tokio::test]
async fn log_against_an_unrelated_order_is_refused() {
    let app = test_app();
    let (product, _, _, _) = escoba_fixture(&app, dec!(400), dec!(2000)).await;
    let other = seed_item(&app, "Cepillo X", ItemCategory::FinishedGood, dec!(0), "unidades").await;
    let worker = seed_worker(&app, "Sofía Rodríguez").await;

    let order = app
        .services
        .production
        .create_order(NewOrder {
            product_id: product,
            quantity_to_produce: dec!(10),
        })
        .await
        .unwrap();

    let mut input = log_input(worker, other.id, dec!(5));
    input.production_order_id = Some(order.id);
    let err = app.services.production.log_production(input).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
    // Nothing was logged or consumed.
    assert!(app.store.dump(tables::PRODUCTION_LOG).await.is_empty());
    assert_eq!(quantity_of(&app, other.id).await, dec!(0));
}

#[tokio::test]
async fn infeasible_order_reports_the_shortage() {
    let app = test_app();
    let (product, _, _, _) = escoba_fixture(&app, dec!(400), dec!(2000)).await;

    let err = app
        .services
        .production
        .create_order(NewOrder {
            product_id: product,
            quantity_to_produce: dec!(1000),
        })
        .await
        .unwrap_err();

    let report = match err {
        ServiceError::Infeasible(report) => report,
        other => panic!("expected Infeasible, got {:?}", other),
    };
    assert!(report.per_material.iter().any(|m| !m.sufficient));
    assert!(report.to_string().contains("Cerdas"));
    assert!(app.store.dump(tables::PRODUCTION_ORDERS).await.is_empty());
}

#[tokio::test]
async fn missing_worker_blocks_the_log_before_any_write() {
    let app = test_app();
    let escoba = seed_item(&app, "Escoba D", ItemCategory::FinishedGood, dec!(0), "unidades").await;

    let err = app
        .services
        .production
        .log_production(log_input(42, escoba.id, dec!(10)))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
    assert!(app.store.dump(tables::PRODUCTION_LOG).await.is_empty());
    assert_eq!(quantity_of(&app, escoba.id).await, dec!(0));
}

#[tokio::test]
async fn partial_consumption_failure_names_the_missing_material() {
    let app = test_app();
    let (_, escoba, cerdas, mango) = escoba_fixture(&app, dec!(400), dec!(100)).await;
    let worker = seed_worker(&app, "Javier Pérez").await;

    // A material deleted behind the recipe's back: its debit must fail while
    // the rest of the event lands, and the report must account for both.
    app.services.inventory.delete_item(mango).await.unwrap();

    let err = app
        .services
        .production
        .log_production(log_input(worker, escoba, dec!(20)))
        .await
        .unwrap_err();

    let discrepancy = match err {
        ServiceError::PartialConsistency(d) => d,
        other => panic!("expected PartialConsistency, got {:?}", other),
    };
    assert!(discrepancy
        .applied
        .iter()
        .any(|c| c.table == tables::PRODUCTION_LOG));
    assert!(discrepancy
        .applied
        .iter()
        .any(|c| c.table == tables::INVENTORY && c.row_id == escoba && c.delta == dec!(20)));
    assert!(discrepancy
        .failed
        .iter()
        .any(|f| f.row_id == mango && f.delta == dec!(-20)));
    // The partial state is real: finished good and cerdas moved.
    assert_eq!(quantity_of(&app, escoba).await, dec!(20));
    assert_eq!(quantity_of(&app, cerdas).await, dec!(390));
}

#[tokio::test]
async fn failed_reversal_keeps_the_log_row() {
    let app = test_app();
    let (_, escoba, cerdas, mango) = escoba_fixture(&app, dec!(400), dec!(100)).await;
    let worker = seed_worker(&app, "María López").await;

    let record = app
        .services
        .production
        .log_production(log_input(worker, escoba, dec!(20)))
        .await
        .unwrap();

    // Break one material before deletion: the reversal partially fails and
    // the log row must survive as the reconciliation trace.
    app.services.inventory.delete_item(mango).await.unwrap();
    let err = app
        .services
        .production
        .delete_log(record.entry.id)
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::PartialConsistency(_));
    assert_eq!(app.store.dump(tables::PRODUCTION_LOG).await.len(), 1);
    // The finished good debit and the cerdas credit did land.
    assert_eq!(quantity_of(&app, escoba).await, dec!(0));
    assert_eq!(quantity_of(&app, cerdas).await, dec!(400));
}

#[tokio::test]
async fn recent_logs_group_newest_production_date_first() {
    let app = test_app();
    let escoba = seed_item(&app, "Escoba E", ItemCategory::FinishedGood, dec!(0), "unidades").await;
    let worker = seed_worker(&app, "Ana García").await;

    for (day, qty) in [(10, dec!(5)), (12, dec!(7)), (11, dec!(3))] {
        let mut input = log_input(worker, escoba.id, qty);
        input.production_date = NaiveDate::from_ymd_opt(2024, 5, day).unwrap();
        app.services.production.log_production(input).await.unwrap();
    }

    let logs = app.services.production.recent_logs(None).await.unwrap();
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0].production_date, NaiveDate::from_ymd_opt(2024, 5, 12).unwrap());
    assert_eq!(logs[2].production_date, NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
}
