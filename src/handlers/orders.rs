use crate::{
    auth::{Principal, Role},
    entities::order::{self, OrderStatus},
    errors::ServiceError,
    handlers::common::{created_response, success_response, CreatedResult},
    services::orders::OrderDetail,
    ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusBody {
    /// "Delivered" or "Confirmed"
    pub status: String,
}

/// Orders placed by a manager, or addressed to a supplier
pub async fn list_orders(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Vec<order::Model>> {
    principal.require_role(&[Role::InventoryManager, Role::Supplier])?;
    let orders = match principal.role {
        Role::Supplier => state.services.orders.list_for_supplier(&principal).await?,
        _ => state.services.orders.list_for_manager(&principal).await?,
    };
    success_response(orders)
}

pub async fn create_order(
    State(state): State<AppState>,
    principal: Principal,
) -> CreatedResult<OrderDetail> {
    principal.require_role(&[Role::InventoryManager])?;
    let detail = state.services.orders.create_from_cart(&principal).await?;
    created_response(detail)
}

pub async fn get_order(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderDetail> {
    principal.require_role(&[Role::InventoryManager, Role::Supplier])?;
    success_response(state.services.orders.get(id, &principal).await?)
}

pub async fn update_order_status(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateOrderStatusBody>,
) -> ApiResult<order::Model> {
    principal.require_role(&[Role::InventoryManager, Role::Supplier])?;
    let target = OrderStatus::from_str(body.status.trim()).map_err(|_| {
        ServiceError::InvalidStatus(format!("'{}' is not a valid order status", body.status))
    })?;
    success_response(
        state
            .services
            .orders
            .update_status(id, target, &principal)
            .await?,
    )
}
