//! CareFlow API Library
//!
//! Multi-tenant hospital supply backend: organization stock, nurse supply
//! requests, reusable-item returns, procurement carts and supplier orders.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod notifications;
pub mod services;

use axum::{
    response::Json,
    routing::{get, post, put},
    Router,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
}

// Common response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    use handlers::{cart, catalog, health, orders, requests, returns, stock};

    Router::new()
        .route("/health", get(health::health_check))
        // Supplier catalog
        .route(
            "/catalog",
            get(catalog::list_catalog).post(catalog::create_catalog_item),
        )
        .route("/catalog/suppliers", get(catalog::list_suppliers))
        .route(
            "/catalog/:id",
            get(catalog::get_catalog_item)
                .put(catalog::update_catalog_item)
                .delete(catalog::delete_catalog_item),
        )
        // Organization stock
        .route("/org-inventory", get(stock::list_org_inventory))
        // Supply requests and returns
        .route(
            "/requests",
            get(requests::list_requests).post(requests::create_request),
        )
        .route(
            "/requests/:id",
            get(requests::get_request)
                .put(requests::edit_request)
                .delete(requests::delete_request),
        )
        .route("/requests/:id/action", post(requests::act_on_request))
        .route("/requests/:id/returnable", get(returns::list_returnable))
        .route("/requests/:id/returns", post(returns::record_return))
        .route("/requests/:id/return-status", get(returns::return_status))
        // Procurement
        .route("/cart", get(cart::get_cart))
        .route("/cart/items", post(cart::add_cart_item))
        .route(
            "/cart/items/:id",
            put(cart::update_cart_item).delete(cart::remove_cart_item),
        )
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/status", put(orders::update_order_status))
}

#[cfg(test)]
mod response_tests {
    use super::*;

    #[test]
    fn success_response_omits_message() {
        let value = serde_json::to_value(ApiResponse::success(7)).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["data"], 7);
        assert!(value.get("message").is_none());
    }

    #[test]
    fn message_response_has_no_data() {
        let value = serde_json::to_value(ApiResponse::<()>::message("done")).unwrap();
        assert_eq!(value["data"], serde_json::Value::Null);
        assert_eq!(value["message"], "done");
    }
}
