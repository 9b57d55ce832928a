use crate::{
    auth::{Principal, Role},
    entities::supply_request,
    handlers::common::{created_response, deleted_response, success_response, CreatedResult},
    services::requests::{CreateRequestInput, LineItemEdit, RequestAction, SupplyRequestDetail},
    ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

const REQUEST_ROLES: &[Role] = &[Role::InventoryManager, Role::Nurse];

#[derive(Debug, Deserialize)]
pub struct EditRequestBody {
    pub items: Vec<LineItemEdit>,
}

#[derive(Debug, Deserialize)]
pub struct RequestActionBody {
    /// "Approved" or "Rejected"
    pub action: String,
}

pub async fn list_requests(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Vec<supply_request::Model>> {
    principal.require_role(REQUEST_ROLES)?;
    success_response(
        state
            .services
            .requests
            .list_for_organization(&principal)
            .await?,
    )
}

pub async fn create_request(
    State(state): State<AppState>,
    principal: Principal,
    Json(input): Json<CreateRequestInput>,
) -> CreatedResult<SupplyRequestDetail> {
    principal.require_role(&[Role::Nurse])?;
    let detail = state.services.requests.create(&principal, input).await?;
    created_response(detail)
}

pub async fn get_request(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> ApiResult<SupplyRequestDetail> {
    principal.require_role(REQUEST_ROLES)?;
    success_response(state.services.requests.get(id, &principal).await?)
}

pub async fn edit_request(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(body): Json<EditRequestBody>,
) -> ApiResult<SupplyRequestDetail> {
    principal.require_role(REQUEST_ROLES)?;
    success_response(
        state
            .services
            .requests
            .edit_line_items(id, body.items, &principal)
            .await?,
    )
}

pub async fn delete_request(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    principal.require_role(REQUEST_ROLES)?;
    state.services.requests.delete(id, &principal).await?;
    deleted_response("Request deleted successfully")
}

pub async fn act_on_request(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(body): Json<RequestActionBody>,
) -> ApiResult<supply_request::Model> {
    principal.require_role(REQUEST_ROLES)?;
    let action: RequestAction = body.action.parse()?;
    success_response(state.services.requests.act(id, action, &principal).await?)
}
