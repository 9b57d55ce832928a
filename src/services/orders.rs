use crate::{
    auth::{Principal, Role},
    entities::{
        cart,
        cart_item::{self, Entity as CartItem},
        catalog_item::{self, Entity as CatalogItem},
        order::{self, Entity as Order, OrderStatus},
        order_item::{self, Entity as OrderItem},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{Notification, NotificationQueue},
    services::{cart::lock_or_create_cart, stock_ledger::StockLedger},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Order aggregates: summed line totals and number of lines.
pub fn order_totals(items: &[order_item::Model]) -> (Decimal, i32) {
    (
        items.iter().map(|i| i.total_price).sum(),
        items.len() as i32,
    )
}

/// Checks a requested status change against the order state and the actor.
///
/// Only `Delivered` (by the order's supplier, from `Pending`) and `Confirmed`
/// (by the order's inventory manager, from `Delivered`) are accepted.
pub fn validate_transition(
    order: &order::Model,
    target: OrderStatus,
    actor: &Principal,
) -> Result<(), ServiceError> {
    match target {
        OrderStatus::Delivered => {
            if actor.role != Role::Supplier || actor.user_id != order.supplier_id {
                return Err(ServiceError::Forbidden(
                    "Only the order's supplier can mark it delivered".to_string(),
                ));
            }
            if order.status != OrderStatus::Pending {
                return Err(ServiceError::InvalidTransition(format!(
                    "Only pending orders can be marked delivered; order {} is {}",
                    order.id, order.status
                )));
            }
            Ok(())
        }
        OrderStatus::Confirmed => {
            if actor.role != Role::InventoryManager
                || actor.user_id != order.inventory_manager_id
            {
                return Err(ServiceError::Forbidden(
                    "Only the assigned inventory manager can confirm this order".to_string(),
                ));
            }
            if order.status != OrderStatus::Delivered {
                return Err(ServiceError::InvalidTransition(format!(
                    "Only delivered orders can be confirmed; order {} is {}",
                    order.id, order.status
                )));
            }
            Ok(())
        }
        other => Err(ServiceError::InvalidStatus(format!(
            "Invalid status update: {}",
            other
        ))),
    }
}

/// Converts carts into supplier orders and drives them through
/// `Pending -> Delivered -> Confirmed`.
#[derive(Clone)]
pub struct OrderPipelineService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    notifications: NotificationQueue,
}

impl OrderPipelineService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        notifications: NotificationQueue,
    ) -> Self {
        Self {
            db,
            event_sender,
            notifications,
        }
    }

    /// Places an order for everything in the manager's cart.
    ///
    /// The supplier is taken from the earliest cart line. Unit prices are
    /// snapshotted from the catalog, and the cart is emptied in the same
    /// transaction.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn create_from_cart(&self, actor: &Principal) -> Result<OrderDetail, ServiceError> {
        let actor = actor.clone();
        let actor_id = actor.user_id;

        let (detail, cart_id) = self
            .db
            .transaction::<_, (OrderDetail, Uuid), ServiceError>(move |txn| {
                Box::pin(async move {
                    let cart = lock_or_create_cart(txn, &actor).await?;
                    let lines = CartItem::find()
                        .filter(cart_item::Column::CartId.eq(cart.id))
                        .order_by_asc(cart_item::Column::CreatedAt)
                        .all(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    let supplier_id = match lines.first() {
                        Some(first) => first.supplier_id,
                        None => return Err(ServiceError::EmptyCart),
                    };
                    if lines.iter().any(|l| l.supplier_id != supplier_id) {
                        warn!(
                            cart_id = %cart.id,
                            %supplier_id,
                            "cart mixes suppliers; ordering everything from the first line's supplier"
                        );
                    }

                    let catalog: HashMap<Uuid, catalog_item::Model> = CatalogItem::find()
                        .filter(
                            catalog_item::Column::Id
                                .is_in(lines.iter().map(|l| l.catalog_item_id).collect::<Vec<_>>()),
                        )
                        .all(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .into_iter()
                        .map(|i| (i.id, i))
                        .collect();

                    let now = Utc::now();
                    let order_id = Uuid::new_v4();
                    let mut items = Vec::with_capacity(lines.len());
                    for line in &lines {
                        let unit_price = catalog
                            .get(&line.catalog_item_id)
                            .map(|i| i.unit_price)
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "Catalog item {} not found",
                                    line.catalog_item_id
                                ))
                            })?;
                        items.push(order_item::Model {
                            id: Uuid::new_v4(),
                            order_id,
                            catalog_item_id: line.catalog_item_id,
                            quantity: line.quantity,
                            unit_price,
                            total_price: unit_price * Decimal::from(line.quantity),
                            created_at: now,
                            updated_at: now,
                            created_by: Some(actor_id),
                            updated_by: Some(actor_id),
                        });
                    }
                    let (total_price, total_products) = order_totals(&items);

                    let order = order::ActiveModel {
                        id: Set(order_id),
                        supplier_id: Set(supplier_id),
                        inventory_manager_id: Set(actor_id),
                        organization_id: Set(cart.organization_id),
                        total_price: Set(total_price),
                        total_products: Set(total_products),
                        status: Set(OrderStatus::Pending),
                        delivered_by: Set(None),
                        delivered_at: Set(None),
                        confirmed_by: Set(None),
                        confirmed_at: Set(None),
                        created_at: Set(now),
                        updated_at: Set(now),
                        created_by: Set(Some(actor_id)),
                        updated_by: Set(Some(actor_id)),
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                    OrderItem::insert_many(items.iter().map(|i| order_item::ActiveModel {
                        id: Set(i.id),
                        order_id: Set(i.order_id),
                        catalog_item_id: Set(i.catalog_item_id),
                        quantity: Set(i.quantity),
                        unit_price: Set(i.unit_price),
                        total_price: Set(i.total_price),
                        created_at: Set(i.created_at),
                        updated_at: Set(i.updated_at),
                        created_by: Set(i.created_by),
                        updated_by: Set(i.updated_by),
                    }))
                    .exec_without_returning(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                    let cart_id = cart.id;
                    clear_cart(txn, cart, actor_id).await?;

                    Ok((OrderDetail { order, items }, cart_id))
                })
            })
            .await?;

        self.event_sender
            .send_or_log(Event::OrderCreated(detail.order.id))
            .await;
        self.event_sender.send_or_log(Event::CartUpdated(cart_id)).await;

        info!(
            order_id = %detail.order.id,
            supplier_id = %detail.order.supplier_id,
            total_price = %detail.order.total_price,
            "order created from cart"
        );
        Ok(detail)
    }

    /// Advances an order to `Delivered` or `Confirmed`.
    ///
    /// Confirmation moves every ordered quantity from the supplier catalog
    /// into the organization's stock inside the transaction. The matching
    /// notification is queued only after commit.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        actor: &Principal,
    ) -> Result<order::Model, ServiceError> {
        if !matches!(target, OrderStatus::Delivered | OrderStatus::Confirmed) {
            return Err(ServiceError::InvalidStatus(format!(
                "Invalid status update: {}",
                target
            )));
        }
        let actor = actor.clone();
        let actor_id = actor.user_id;

        let updated = self
            .db
            .transaction::<_, order::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let order = Order::find_by_id(order_id)
                        .lock_exclusive()
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| order_not_found(order_id))?;

                    validate_transition(&order, target, &actor)?;

                    let organization_id = order.organization_id;
                    let now = Utc::now();
                    let mut active: order::ActiveModel = order.into();
                    active.status = Set(target);
                    active.updated_at = Set(now);
                    active.updated_by = Set(Some(actor_id));
                    if target == OrderStatus::Delivered {
                        active.delivered_by = Set(Some(actor_id));
                        active.delivered_at = Set(Some(now));
                    } else {
                        active.confirmed_by = Set(Some(actor_id));
                        active.confirmed_at = Set(Some(now));
                    }
                    let updated = active.update(txn).await.map_err(ServiceError::db_error)?;

                    if target == OrderStatus::Confirmed {
                        receive_into_stock(txn, order_id, organization_id, actor_id).await?;
                    }

                    Ok(updated)
                })
            })
            .await
            .map_err(|e| {
                let e = ServiceError::from(e);
                error!(%order_id, %target, error = %e, "order status update failed");
                e
            })?;

        let (event, notification) = match target {
            OrderStatus::Delivered => (
                Event::OrderDelivered {
                    order_id,
                    delivered_by: actor_id,
                },
                Notification::order_delivered(&updated),
            ),
            _ => (
                Event::OrderConfirmed {
                    order_id,
                    confirmed_by: actor_id,
                },
                Notification::order_confirmed(&updated),
            ),
        };
        self.notifications.enqueue(notification).await;
        self.event_sender.send_or_log(event).await;

        info!(%order_id, status = %updated.status, "order status updated");
        Ok(updated)
    }

    /// Fetches an order visible to the principal: its supplier, or staff of
    /// the ordering organization.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn get(&self, order_id: Uuid, actor: &Principal) -> Result<OrderDetail, ServiceError> {
        let db = self.db.as_ref();
        let order = Order::find_by_id(order_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .filter(|o| {
                o.supplier_id == actor.user_id
                    || (actor.role != Role::Supplier
                        && actor.can_access_organization(o.organization_id))
            })
            .ok_or_else(|| order_not_found(order_id))?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(OrderDetail { order, items })
    }

    /// Orders placed by the acting inventory manager, newest first.
    pub async fn list_for_manager(&self, actor: &Principal) -> Result<Vec<order::Model>, ServiceError> {
        Order::find()
            .filter(order::Column::InventoryManagerId.eq(actor.user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Orders addressed to the acting supplier, newest first.
    pub async fn list_for_supplier(&self, actor: &Principal) -> Result<Vec<order::Model>, ServiceError> {
        Order::find()
            .filter(order::Column::SupplierId.eq(actor.user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }
}

fn order_not_found(order_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("Order {} not found", order_id))
}

/// Moves each ordered quantity from the supplier catalog into organization stock.
async fn receive_into_stock<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    organization_id: Uuid,
    actor_id: Uuid,
) -> Result<(), ServiceError> {
    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::CatalogItemId)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    for item in items {
        StockLedger::decrement_catalog(conn, item.catalog_item_id, item.quantity, Some(actor_id))
            .await?;
        let stock =
            StockLedger::get_or_create(conn, item.catalog_item_id, organization_id, Some(actor_id))
                .await?;
        StockLedger::adjust(conn, stock.id, item.quantity, Some(actor_id)).await?;
    }
    Ok(())
}

/// Deletes every cart line and zeroes the aggregates.
async fn clear_cart<C: ConnectionTrait>(
    conn: &C,
    cart: cart::Model,
    actor_id: Uuid,
) -> Result<(), ServiceError> {
    CartItem::delete_many()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let mut cart: cart::ActiveModel = cart.into();
    cart.total_products = Set(0);
    cart.total_price = Set(Decimal::ZERO);
    cart.updated_at = Set(Utc::now());
    cart.updated_by = Set(Some(actor_id));
    cart.update(conn).await.map_err(ServiceError::db_error)?;
    Ok(())
}
