#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use serde_json::Value;
use careflow_api::{
    auth::{Principal, ORGANIZATION_ID_HEADER, USER_ID_HEADER, USER_ROLE_HEADER},
    config::{AppConfig, DatabaseSettings},
    db,
    entities::{catalog_item, org_inventory},
    events::{self, EventSender},
    handlers::AppServices,
    notifications::{self, InMemoryNotifier, NotificationQueue, Notifier, RetryPolicy},
    services::{catalog::CreateCatalogItemInput, stock_ledger::StockLedger},
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Helper harness for spinning up an application state backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub notifier: Arc<InMemoryNotifier>,
    _event_task: tokio::task::JoinHandle<()>,
    _dispatcher_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let mut cfg = AppConfig::default();
        cfg.server.environment = "test".to_string();
        cfg.database = DatabaseSettings::in_memory();

        let pool = db::connect(&cfg.database)
            .await
            .expect("failed to create test database");

        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let notifier = Arc::new(InMemoryNotifier::new());
        let (queue, notification_rx) = NotificationQueue::channel(64);
        let dispatcher_task = tokio::spawn(notifications::run_dispatcher(
            notification_rx,
            notifier.clone() as Arc<dyn Notifier>,
            RetryPolicy::new(3, Duration::from_millis(5)),
        ));

        let services = AppServices::new(db_arc.clone(), event_sender.clone(), queue);

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", careflow_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            notifier,
            _event_task: event_task,
            _dispatcher_task: dispatcher_task,
        }
    }

    /// Send a request against the router, acting as `principal` when given.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        principal: Option<&Principal>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(p) = principal {
            builder = builder
                .header(USER_ID_HEADER, p.user_id.to_string())
                .header(USER_ROLE_HEADER, p.role.as_str());
            if let Some(org) = p.organization_id {
                builder = builder.header(ORGANIZATION_ID_HEADER, org.to_string());
            }
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Publishes a catalog item as `supplier`.
    pub async fn seed_catalog_item(
        &self,
        supplier: &Principal,
        name: &str,
        unit_price: Decimal,
        quantity: i32,
        is_reusable: bool,
    ) -> catalog_item::Model {
        self.state
            .services
            .catalog
            .create_item(
                supplier,
                CreateCatalogItemInput {
                    name: name.to_string(),
                    category: "General".to_string(),
                    unit_price,
                    quantity,
                    is_reusable,
                },
            )
            .await
            .expect("seed catalog item")
    }

    /// Gives `organization_id` `quantity` units of `catalog_item_id`.
    pub async fn seed_stock(
        &self,
        organization_id: Uuid,
        catalog_item_id: Uuid,
        quantity: i32,
    ) -> org_inventory::Model {
        let db = self.state.db.as_ref();
        let row = StockLedger::get_or_create(db, catalog_item_id, organization_id, None)
            .await
            .expect("create stock row");
        StockLedger::adjust(db, row.id, quantity, None)
            .await
            .expect("seed stock quantity")
    }

    pub async fn stock_level(&self, org_inventory_id: Uuid) -> i32 {
        org_inventory::Entity::find_by_id(org_inventory_id)
            .one(self.state.db.as_ref())
            .await
            .expect("query stock")
            .expect("stock row exists")
            .quantity_in_stock
    }

    pub async fn catalog_quantity(&self, catalog_item_id: Uuid) -> i32 {
        catalog_item::Entity::find_by_id(catalog_item_id)
            .one(self.state.db.as_ref())
            .await
            .expect("query catalog")
            .expect("catalog item exists")
            .quantity
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
        self._dispatcher_task.abort();
    }
}

/// Decodes a JSON response body.
pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

/// A fresh organization with one nurse and one inventory manager.
pub struct Ward {
    pub organization_id: Uuid,
    pub nurse: Principal,
    pub manager: Principal,
}

impl Ward {
    pub fn new() -> Self {
        let organization_id = Uuid::new_v4();
        Self {
            organization_id,
            nurse: Principal::nurse(Uuid::new_v4(), organization_id),
            manager: Principal::inventory_manager(Uuid::new_v4(), organization_id),
        }
    }
}
