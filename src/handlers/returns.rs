use crate::{
    auth::{Principal, Role},
    entities::requested_item,
    handlers::common::success_response,
    services::returns::{RecordReturnInput, ReturnStatus, ReturnableItem},
    ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    response::Json,
};
use uuid::Uuid;

pub async fn list_returnable(
    State(state): State<AppState>,
    principal: Principal,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Vec<ReturnableItem>> {
    principal.require_role(&[Role::InventoryManager, Role::Nurse])?;
    success_response(
        state
            .services
            .returns
            .list_returnable(request_id, &principal)
            .await?,
    )
}

pub async fn record_return(
    State(state): State<AppState>,
    principal: Principal,
    Path(request_id): Path<Uuid>,
    Json(input): Json<RecordReturnInput>,
) -> ApiResult<requested_item::Model> {
    principal.require_role(&[Role::InventoryManager])?;
    success_response(
        state
            .services
            .returns
            .record_return(request_id, input, &principal)
            .await?,
    )
}

pub async fn return_status(
    State(state): State<AppState>,
    principal: Principal,
    Path(request_id): Path<Uuid>,
) -> ApiResult<ReturnStatus> {
    principal.require_role(&[Role::InventoryManager])?;
    success_response(state.services.returns.status(request_id, &principal).await?)
}
