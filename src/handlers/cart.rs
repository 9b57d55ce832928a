use crate::{
    auth::{Principal, Role},
    handlers::common::success_response,
    services::cart::{AddToCartInput, CartDetail},
    ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct UpdateCartItemBody {
    pub quantity: i32,
}

pub async fn get_cart(State(state): State<AppState>, principal: Principal) -> ApiResult<CartDetail> {
    principal.require_role(&[Role::InventoryManager])?;
    success_response(state.services.cart.get_cart(&principal).await?)
}

pub async fn add_cart_item(
    State(state): State<AppState>,
    principal: Principal,
    Json(input): Json<AddToCartInput>,
) -> ApiResult<CartDetail> {
    principal.require_role(&[Role::InventoryManager])?;
    success_response(state.services.cart.add_item(&principal, input).await?)
}

pub async fn update_cart_item(
    State(state): State<AppState>,
    principal: Principal,
    Path(item_id): Path<Uuid>,
    Json(body): Json<UpdateCartItemBody>,
) -> ApiResult<CartDetail> {
    principal.require_role(&[Role::InventoryManager])?;
    success_response(
        state
            .services
            .cart
            .update_item(&principal, item_id, body.quantity)
            .await?,
    )
}

pub async fn remove_cart_item(
    State(state): State<AppState>,
    principal: Principal,
    Path(item_id): Path<Uuid>,
) -> ApiResult<CartDetail> {
    principal.require_role(&[Role::InventoryManager])?;
    success_response(state.services.cart.remove_item(&principal, item_id).await?)
}
