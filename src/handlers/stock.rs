use crate::{
    auth::{Principal, Role},
    handlers::common::success_response,
    services::stock_ledger::StockLine,
    ApiResult, AppState,
};
use axum::extract::State;

/// Stock held by the caller's organization
pub async fn list_org_inventory(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Vec<StockLine>> {
    principal.require_role(&[Role::InventoryManager, Role::Nurse])?;
    success_response(
        state
            .services
            .stock_ledger
            .list_for_organization(&principal)
            .await?,
    )
}
