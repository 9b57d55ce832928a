mod common;

use assert_matches::assert_matches;
use careflow_api::{
    auth::Principal,
    errors::ServiceError,
    services::cart::AddToCartInput,
};
use common::{TestApp, Ward};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

fn add(catalog_item_id: Uuid, quantity: i32) -> AddToCartInput {
    AddToCartInput {
        catalog_item_id,
        quantity,
    }
}

#[tokio::test]
async fn first_access_creates_an_empty_cart() {
    let app = TestApp::new().await;
    let ward = Ward::new();

    let cart = app.state.services.cart.get_cart(&ward.manager).await.unwrap();
    assert_eq!(cart.cart.inventory_manager_id, ward.manager.user_id);
    assert_eq!(cart.cart.total_products, 0);
    assert_eq!(cart.cart.total_price, Decimal::ZERO);
    assert!(cart.items.is_empty());

    let again = app.state.services.cart.get_cart(&ward.manager).await.unwrap();
    assert_eq!(again.cart.id, cart.cart.id);
}

#[tokio::test]
async fn adding_items_recomputes_aggregates() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let supplier = Principal::supplier(Uuid::new_v4());
    let gown = app
        .seed_catalog_item(&supplier, "Gown", dec!(10.00), 50, false)
        .await;
    let visor = app
        .seed_catalog_item(&supplier, "Visor", dec!(20.00), 50, true)
        .await;
    let cart = &app.state.services.cart;

    cart.add_item(&ward.manager, add(gown.id, 3)).await.unwrap();
    let detail = cart.add_item(&ward.manager, add(visor.id, 2)).await.unwrap();
    assert_eq!(detail.cart.total_products, 2);
    assert_eq!(detail.cart.total_price, dec!(70));

    let detail = cart.add_item(&ward.manager, add(gown.id, 1)).await.unwrap();
    assert_eq!(detail.items.len(), 2);
    assert_eq!(detail.cart.total_products, 2);
    assert_eq!(detail.cart.total_price, dec!(80));
    let gown_line = detail
        .items
        .iter()
        .find(|i| i.catalog_item_id == gown.id)
        .unwrap();
    assert_eq!(gown_line.quantity, 4);
    assert_eq!(gown_line.supplier_id, supplier.user_id);
}

#[tokio::test]
async fn adding_beyond_supplier_quantity_changes_nothing() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let supplier = Principal::supplier(Uuid::new_v4());
    let pump = app
        .seed_catalog_item(&supplier, "Infusion Pump", dec!(250.00), 4, true)
        .await;
    let cart = &app.state.services.cart;

    let err = cart.add_item(&ward.manager, add(pump.id, 5)).await.unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientStock { requested: 5, available: 4, .. }
    );
    assert!(cart.get_cart(&ward.manager).await.unwrap().items.is_empty());

    cart.add_item(&ward.manager, add(pump.id, 3)).await.unwrap();
    let err = cart.add_item(&ward.manager, add(pump.id, 2)).await.unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { requested: 5, .. });

    let detail = cart.get_cart(&ward.manager).await.unwrap();
    assert_eq!(detail.items[0].quantity, 3);
    assert_eq!(detail.cart.total_price, dec!(750));
}

#[tokio::test]
async fn accumulating_past_the_integer_range_is_invalid() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let supplier = Principal::supplier(Uuid::new_v4());
    let swabs = app
        .seed_catalog_item(&supplier, "Swabs", dec!(0.01), i32::MAX, false)
        .await;
    let cart = &app.state.services.cart;

    cart.add_item(&ward.manager, add(swabs.id, i32::MAX)).await.unwrap();
    let err = cart.add_item(&ward.manager, add(swabs.id, 1)).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let detail = cart.get_cart(&ward.manager).await.unwrap();
    assert_eq!(detail.items[0].quantity, i32::MAX);
}

#[tokio::test]
async fn updating_and_removing_lines() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let supplier = Principal::supplier(Uuid::new_v4());
    let tubing = app
        .seed_catalog_item(&supplier, "Tubing", dec!(1.50), 100, false)
        .await;
    let cart = &app.state.services.cart;

    let detail = cart.add_item(&ward.manager, add(tubing.id, 2)).await.unwrap();
    let line_id = detail.items[0].id;

    let detail = cart.update_item(&ward.manager, line_id, 10).await.unwrap();
    assert_eq!(detail.items[0].quantity, 10);
    assert_eq!(detail.items[0].total_price, dec!(15));
    assert_eq!(detail.cart.total_price, dec!(15));

    let err = cart.update_item(&ward.manager, line_id, 101).await.unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { .. });

    let err = cart.update_item(&ward.manager, line_id, 0).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let detail = cart.remove_item(&ward.manager, line_id).await.unwrap();
    assert!(detail.items.is_empty());
    assert_eq!(detail.cart.total_products, 0);
    assert_eq!(detail.cart.total_price, Decimal::ZERO);
}

#[tokio::test]
async fn carts_are_private_to_their_manager() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let colleague = Principal::inventory_manager(Uuid::new_v4(), ward.organization_id);
    let supplier = Principal::supplier(Uuid::new_v4());
    let item = app
        .seed_catalog_item(&supplier, "Splint", dec!(6.00), 10, false)
        .await;
    let cart = &app.state.services.cart;

    let detail = cart.add_item(&ward.manager, add(item.id, 1)).await.unwrap();
    let err = cart
        .remove_item(&colleague, detail.items[0].id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn unknown_catalog_items_are_not_found() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let err = app
        .state
        .services
        .cart
        .add_item(&ward.manager, add(Uuid::new_v4(), 1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
