mod common;

use assert_matches::assert_matches;
use careflow_api::{auth::Principal, errors::ServiceError, services::cart::AddToCartInput};
use common::{TestApp, Ward};
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn carted_items_cannot_be_deleted() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let supplier = Principal::supplier(Uuid::new_v4());
    let gown = app
        .seed_catalog_item(&supplier, "Gown", dec!(10.00), 30, false)
        .await;
    let cart = &app.state.services.cart;
    let catalog = &app.state.services.catalog;

    let detail = cart
        .add_item(
            &ward.manager,
            AddToCartInput {
                catalog_item_id: gown.id,
                quantity: 3,
            },
        )
        .await
        .unwrap();
    let line_id = detail.items[0].id;

    let err = catalog.delete_item(gown.id, &supplier).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(msg) if msg.contains("cart"));

    let detail = cart.get_cart(&ward.manager).await.unwrap();
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.cart.total_products, 1);
    assert_eq!(detail.cart.total_price, dec!(30));

    cart.remove_item(&ward.manager, line_id).await.unwrap();
    catalog.delete_item(gown.id, &supplier).await.unwrap();
    assert_matches!(
        catalog.get_item(gown.id).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn stocked_items_cannot_be_deleted() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let supplier = Principal::supplier(Uuid::new_v4());
    let mask = app
        .seed_catalog_item(&supplier, "Mask", dec!(1.50), 100, false)
        .await;
    app.seed_stock(ward.organization_id, mask.id, 5).await;

    let err = app
        .state
        .services
        .catalog
        .delete_item(mask.id, &supplier)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn only_the_owning_supplier_deletes() {
    let app = TestApp::new().await;
    let supplier = Principal::supplier(Uuid::new_v4());
    let rival = Principal::supplier(Uuid::new_v4());
    let visor = app
        .seed_catalog_item(&supplier, "Visor", dec!(20.00), 10, true)
        .await;

    let err = app
        .state
        .services
        .catalog
        .delete_item(visor.id, &rival)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
}
