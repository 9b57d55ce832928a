mod common;

use assert_matches::assert_matches;
use careflow_api::{
    auth::Principal,
    errors::ServiceError,
    services::stock_ledger::StockLedger,
};
use common::{TestApp, Ward};
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn decrement_never_drives_stock_negative() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let supplier = Principal::supplier(Uuid::new_v4());
    let gauze = app
        .seed_catalog_item(&supplier, "Gauze", dec!(2.50), 100, false)
        .await;
    let stock = app.seed_stock(ward.organization_id, gauze.id, 10).await;

    let db = app.state.db.as_ref();
    let updated = StockLedger::adjust(db, stock.id, -4, None).await.unwrap();
    assert_eq!(updated.quantity_in_stock, 6);

    let err = StockLedger::adjust(db, stock.id, -7, None).await.unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientStock { ref item, requested: 7, available: 6 } if item == "Gauze"
    );
    assert_eq!(app.stock_level(stock.id).await, 6);
}

#[tokio::test]
async fn increment_of_unknown_row_is_not_found() {
    let app = TestApp::new().await;
    let err = StockLedger::adjust(app.state.db.as_ref(), Uuid::new_v4(), 5, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn get_or_create_returns_the_same_row() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let supplier = Principal::supplier(Uuid::new_v4());
    let mask = app
        .seed_catalog_item(&supplier, "Mask", dec!(1.00), 50, false)
        .await;

    let db = app.state.db.as_ref();
    let first = StockLedger::get_or_create(db, mask.id, ward.organization_id, None)
        .await
        .unwrap();
    let second = StockLedger::get_or_create(db, mask.id, ward.organization_id, None)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.quantity_in_stock, 0);
}

#[tokio::test]
async fn lock_for_organization_hides_foreign_rows() {
    let app = TestApp::new().await;
    let ours = Ward::new();
    let theirs = Ward::new();
    let supplier = Principal::supplier(Uuid::new_v4());
    let item = app
        .seed_catalog_item(&supplier, "Syringe", dec!(0.50), 500, false)
        .await;
    let foreign = app.seed_stock(theirs.organization_id, item.id, 20).await;

    let err = StockLedger::lock_for_organization(
        app.state.db.as_ref(),
        &[foreign.id],
        ours.organization_id,
    )
    .await
    .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(msg) if msg.contains(&foreign.id.to_string()));
}

#[tokio::test]
async fn catalog_decrement_is_conditional() {
    let app = TestApp::new().await;
    let supplier = Principal::supplier(Uuid::new_v4());
    let item = app
        .seed_catalog_item(&supplier, "Catheter", dec!(12.00), 3, false)
        .await;

    let db = app.state.db.as_ref();
    StockLedger::decrement_catalog(db, item.id, 2, None)
        .await
        .unwrap();
    assert_eq!(app.catalog_quantity(item.id).await, 1);

    let err = StockLedger::decrement_catalog(db, item.id, 2, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { requested: 2, available: 1, .. });
    assert_eq!(app.catalog_quantity(item.id).await, 1);
}

#[tokio::test]
async fn organization_stock_lists_only_own_rows_by_name() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let other = Ward::new();
    let supplier = Principal::supplier(Uuid::new_v4());
    let tape = app
        .seed_catalog_item(&supplier, "Tape", dec!(1.25), 40, false)
        .await;
    let bandage = app
        .seed_catalog_item(&supplier, "Bandage", dec!(0.75), 40, false)
        .await;
    app.seed_stock(ward.organization_id, tape.id, 4).await;
    app.seed_stock(ward.organization_id, bandage.id, 9).await;
    app.seed_stock(other.organization_id, tape.id, 1).await;

    let lines = app
        .state
        .services
        .stock_ledger
        .list_for_organization(&ward.nurse)
        .await
        .unwrap();

    let names: Vec<_> = lines.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["Bandage", "Tape"]);
    assert_eq!(lines[0].quantity_in_stock, 9);
    assert_eq!(lines[1].quantity_in_stock, 4);
}
