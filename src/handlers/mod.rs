pub mod cart;
pub mod catalog;
pub mod common;
pub mod health;
pub mod orders;
pub mod requests;
pub mod returns;
pub mod stock;

use crate::events::EventSender;
use crate::notifications::NotificationQueue;
use crate::services::{
    cart::CartService, catalog::CatalogService, orders::OrderPipelineService,
    requests::SupplyRequestService, returns::ReturnTrackerService, stock_ledger::StockLedger,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub stock_ledger: Arc<StockLedger>,
    pub requests: Arc<SupplyRequestService>,
    pub returns: Arc<ReturnTrackerService>,
    pub cart: Arc<CartService>,
    pub orders: Arc<OrderPipelineService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        notifications: NotificationQueue,
    ) -> Self {
        Self {
            catalog: Arc::new(CatalogService::new(db_pool.clone())),
            stock_ledger: Arc::new(StockLedger::new(db_pool.clone())),
            requests: Arc::new(SupplyRequestService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            returns: Arc::new(ReturnTrackerService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            cart: Arc::new(CartService::new(db_pool.clone(), event_sender.clone())),
            orders: Arc::new(OrderPipelineService::new(
                db_pool,
                event_sender,
                notifications,
            )),
        }
    }
}
