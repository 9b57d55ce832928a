mod common;

use assert_matches::assert_matches;
use careflow_api::{
    auth::Principal,
    entities::supply_request::RequestStatus,
    errors::ServiceError,
    services::requests::{CreateRequestInput, LineItemEdit, RequestAction, RequestLineInput},
};
use common::{TestApp, Ward};
use rust_decimal_macros::dec;
use uuid::Uuid;

struct Stocked {
    gloves: Uuid,
    saline: Uuid,
}

async fn stock_ward(app: &TestApp, ward: &Ward) -> Stocked {
    let supplier = Principal::supplier(Uuid::new_v4());
    let gloves = app
        .seed_catalog_item(&supplier, "Gloves", dec!(0.25), 1000, false)
        .await;
    let saline = app
        .seed_catalog_item(&supplier, "Saline", dec!(4.00), 1000, false)
        .await;
    Stocked {
        gloves: app.seed_stock(ward.organization_id, gloves.id, 10).await.id,
        saline: app.seed_stock(ward.organization_id, saline.id, 5).await.id,
    }
}

fn request(is_emergency: bool, lines: &[(Uuid, i32)]) -> CreateRequestInput {
    CreateRequestInput {
        is_emergency,
        items: lines
            .iter()
            .map(|(id, qty)| RequestLineInput {
                org_inventory_id: *id,
                quantity_requested: *qty,
            })
            .collect(),
    }
}

#[tokio::test]
async fn emergency_request_is_approved_and_consumes_stock_at_creation() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let stock = stock_ward(&app, &ward).await;

    let detail = app
        .state
        .services
        .requests
        .create(&ward.nurse, request(true, &[(stock.gloves, 4), (stock.saline, 2)]))
        .await
        .unwrap();

    assert_eq!(detail.request.status, RequestStatus::Approved);
    assert_eq!(detail.request.approved_by, Some(ward.nurse.user_id));
    assert!(detail.request.approved_at.is_some());
    assert_eq!(detail.request.total_items, 2);
    assert_eq!(app.stock_level(stock.gloves).await, 6);
    assert_eq!(app.stock_level(stock.saline).await, 3);
}

#[tokio::test]
async fn approving_a_pending_request_consumes_stock_once() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let stock = stock_ward(&app, &ward).await;
    let requests = &app.state.services.requests;

    let detail = requests
        .create(&ward.nurse, request(false, &[(stock.gloves, 3)]))
        .await
        .unwrap();
    assert_eq!(detail.request.status, RequestStatus::Pending);
    assert_eq!(app.stock_level(stock.gloves).await, 10);

    let approved = requests
        .act(detail.request.id, RequestAction::Approve, &ward.manager)
        .await
        .unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);
    assert_eq!(approved.approved_by, Some(ward.manager.user_id));
    assert_eq!(app.stock_level(stock.gloves).await, 7);

    let err = requests
        .act(detail.request.id, RequestAction::Reject, &ward.manager)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyProcessed(id) if id == detail.request.id);
    assert_eq!(app.stock_level(stock.gloves).await, 7);
}

#[tokio::test]
async fn rejection_leaves_stock_untouched() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let stock = stock_ward(&app, &ward).await;
    let requests = &app.state.services.requests;

    let detail = requests
        .create(&ward.nurse, request(false, &[(stock.saline, 5)]))
        .await
        .unwrap();
    let rejected = requests
        .act(detail.request.id, RequestAction::Reject, &ward.manager)
        .await
        .unwrap();

    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert_eq!(rejected.rejected_by, Some(ward.manager.user_id));
    assert_eq!(app.stock_level(stock.saline).await, 5);
}

#[tokio::test]
async fn short_stock_rejects_creation_without_persisting() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let stock = stock_ward(&app, &ward).await;
    let requests = &app.state.services.requests;

    let err = requests
        .create(&ward.nurse, request(true, &[(stock.gloves, 2), (stock.saline, 6)]))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientStock { requested: 6, available: 5, .. }
    );

    assert!(requests
        .list_for_organization(&ward.nurse)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(app.stock_level(stock.gloves).await, 10);
}

#[tokio::test]
async fn duplicate_lines_are_checked_against_their_sum() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let stock = stock_ward(&app, &ward).await;

    let err = app
        .state
        .services
        .requests
        .create(&ward.nurse, request(false, &[(stock.saline, 3), (stock.saline, 3)]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { requested: 6, .. });
}

#[tokio::test]
async fn approval_fails_atomically_when_stock_ran_out() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let stock = stock_ward(&app, &ward).await;
    let requests = &app.state.services.requests;

    let first = requests
        .create(&ward.nurse, request(false, &[(stock.gloves, 2), (stock.saline, 4)]))
        .await
        .unwrap();
    requests
        .create(&ward.nurse, request(true, &[(stock.saline, 3)]))
        .await
        .unwrap();

    let err = requests
        .act(first.request.id, RequestAction::Approve, &ward.manager)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { .. });

    let reloaded = requests.get(first.request.id, &ward.manager).await.unwrap();
    assert_eq!(reloaded.request.status, RequestStatus::Pending);
    assert_eq!(app.stock_level(stock.gloves).await, 10);
    assert_eq!(app.stock_level(stock.saline).await, 2);
}

#[tokio::test]
async fn requests_of_other_organizations_are_off_limits() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let outsider = Ward::new();
    let stock = stock_ward(&app, &ward).await;
    let requests = &app.state.services.requests;

    let detail = requests
        .create(&ward.nurse, request(false, &[(stock.gloves, 1)]))
        .await
        .unwrap();

    let err = requests
        .act(detail.request.id, RequestAction::Approve, &outsider.manager)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let err = requests
        .get(detail.request.id, &outsider.manager)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let err = requests
        .create(&outsider.nurse, request(false, &[(stock.gloves, 1)]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn editing_line_items_rechecks_stock() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let stock = stock_ward(&app, &ward).await;
    let requests = &app.state.services.requests;

    let detail = requests
        .create(&ward.nurse, request(false, &[(stock.gloves, 1)]))
        .await
        .unwrap();
    let line_id = detail.items[0].id;

    let edited = requests
        .edit_line_items(
            detail.request.id,
            vec![LineItemEdit {
                id: line_id,
                quantity_requested: 8,
            }],
            &ward.nurse,
        )
        .await
        .unwrap();
    assert_eq!(edited.items[0].quantity_requested, 8);

    let err = requests
        .edit_line_items(
            detail.request.id,
            vec![LineItemEdit {
                id: line_id,
                quantity_requested: 11,
            }],
            &ward.nurse,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { requested: 11, available: 10, .. });

    let err = requests
        .edit_line_items(
            detail.request.id,
            vec![LineItemEdit {
                id: Uuid::new_v4(),
                quantity_requested: 1,
            }],
            &ward.nurse,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(msg) if msg.contains("not found in this request"));
}

#[tokio::test]
async fn edits_are_checked_against_sibling_lines_on_the_same_stock() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let stock = stock_ward(&app, &ward).await;
    let requests = &app.state.services.requests;

    let detail = requests
        .create(&ward.nurse, request(false, &[(stock.gloves, 5), (stock.gloves, 5)]))
        .await
        .unwrap();
    let first = detail.items[0].id;

    let err = requests
        .edit_line_items(
            detail.request.id,
            vec![LineItemEdit {
                id: first,
                quantity_requested: 8,
            }],
            &ward.nurse,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { requested: 13, available: 10, .. });

    let reloaded = requests.get(detail.request.id, &ward.nurse).await.unwrap();
    assert!(reloaded.items.iter().all(|i| i.quantity_requested == 5));

    requests
        .edit_line_items(
            detail.request.id,
            vec![LineItemEdit {
                id: first,
                quantity_requested: 4,
            }],
            &ward.nurse,
        )
        .await
        .unwrap();
    let approved = requests
        .act(detail.request.id, RequestAction::Approve, &ward.manager)
        .await
        .unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);
    assert_eq!(app.stock_level(stock.gloves).await, 1);
}

#[tokio::test]
async fn overflowing_line_totals_are_invalid() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let stock = stock_ward(&app, &ward).await;

    let err = app
        .state
        .services
        .requests
        .create(
            &ward.nurse,
            request(false, &[(stock.gloves, i32::MAX), (stock.gloves, 1)]),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
    assert_eq!(app.stock_level(stock.gloves).await, 10);
}

#[tokio::test]
async fn only_pending_requests_can_be_deleted() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let stock = stock_ward(&app, &ward).await;
    let requests = &app.state.services.requests;

    let pending = requests
        .create(&ward.nurse, request(false, &[(stock.gloves, 1)]))
        .await
        .unwrap();
    let emergency = requests
        .create(&ward.nurse, request(true, &[(stock.gloves, 1)]))
        .await
        .unwrap();

    requests.delete(pending.request.id, &ward.nurse).await.unwrap();
    assert_matches!(
        requests.get(pending.request.id, &ward.nurse).await,
        Err(ServiceError::NotFound(_))
    );

    let err = requests
        .delete(emergency.request.id, &ward.nurse)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyProcessed(_));
}

#[tokio::test]
async fn empty_or_non_positive_requests_are_invalid() {
    let app = TestApp::new().await;
    let ward = Ward::new();
    let stock = stock_ward(&app, &ward).await;
    let requests = &app.state.services.requests;

    assert_matches!(
        requests.create(&ward.nurse, request(false, &[])).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        requests
            .create(&ward.nurse, request(false, &[(stock.gloves, 0)]))
            .await,
        Err(ServiceError::ValidationError(_))
    );
}
