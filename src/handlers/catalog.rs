use crate::{
    auth::{Principal, Role},
    entities::catalog_item,
    errors::ServiceError,
    handlers::common::{created_response, deleted_response, parse_uuid, success_response, CreatedResult},
    services::catalog::{CreateCatalogItemInput, SupplierSummary, UpdateCatalogItemInput},
    ApiResult, AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    /// Supplier whose catalog to list; suppliers default to their own
    pub supplier_id: Option<String>,
}

pub async fn list_catalog(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<Vec<catalog_item::Model>> {
    let supplier_id = match query.supplier_id.as_deref() {
        Some(raw) => parse_uuid(raw, "supplier_id")?,
        None if principal.role == Role::Supplier => principal.user_id,
        None => {
            return Err(ServiceError::ValidationError(
                "supplier_id query parameter is required".to_string(),
            ))
        }
    };
    let items = state.services.catalog.list_for_supplier(supplier_id).await?;
    success_response(items)
}

pub async fn list_suppliers(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Vec<SupplierSummary>> {
    principal.require_role(&[Role::InventoryManager])?;
    success_response(state.services.catalog.list_suppliers().await?)
}

pub async fn get_catalog_item(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<Uuid>,
) -> ApiResult<catalog_item::Model> {
    success_response(state.services.catalog.get_item(id).await?)
}

pub async fn create_catalog_item(
    State(state): State<AppState>,
    principal: Principal,
    Json(input): Json<CreateCatalogItemInput>,
) -> CreatedResult<catalog_item::Model> {
    principal.require_role(&[Role::Supplier])?;
    let item = state.services.catalog.create_item(&principal, input).await?;
    created_response(item)
}

pub async fn update_catalog_item(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateCatalogItemInput>,
) -> ApiResult<catalog_item::Model> {
    principal.require_role(&[Role::Supplier])?;
    success_response(state.services.catalog.update_item(id, input, &principal).await?)
}

pub async fn delete_catalog_item(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    principal.require_role(&[Role::Supplier])?;
    state.services.catalog.delete_item(id, &principal).await?;
    deleted_response("Product deleted successfully")
}
