use crate::{
    auth::Principal,
    entities::{
        cart::{self, Entity as Cart},
        cart_item::{self, Entity as CartItem},
        catalog_item::{self, Entity as CatalogItem},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, sync::Arc};
use tracing::{info, instrument};
use uuid::Uuid;

/// Input for adding a catalog item to the manager's cart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddToCartInput {
    pub catalog_item_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartDetail {
    #[serde(flatten)]
    pub cart: cart::Model,
    pub items: Vec<cart_item::Model>,
}

/// Cart aggregates: distinct catalog items and summed line totals.
pub fn cart_totals(items: &[cart_item::Model]) -> (i32, Decimal) {
    let total_products = items
        .iter()
        .map(|i| i.catalog_item_id)
        .collect::<HashSet<_>>()
        .len() as i32;
    let total_price = items.iter().map(|i| i.total_price).sum();
    (total_products, total_price)
}

/// Service for managing an inventory manager's procurement cart.
///
/// Every item mutation recomputes the cart aggregates in the same transaction.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    /// Creates a new `CartService` instance.
    ///
    /// # Arguments
    ///
    /// * `db` - Database connection pool
    /// * `event_sender` - Event sender for publishing cart events
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Returns the manager's cart, creating an empty one on first use.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn get_cart(&self, actor: &Principal) -> Result<CartDetail, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = lock_or_create_cart(&txn, actor).await?;
        let detail = load_detail(&txn, cart).await?;
        txn.commit().await?;
        Ok(detail)
    }

    /// Adds a catalog item to the cart or increases the quantity if it is
    /// already there.
    ///
    /// # Arguments
    ///
    /// * `actor` - The inventory manager owning the cart
    /// * `input` - Catalog item and quantity to add
    ///
    /// # Returns
    ///
    /// * `Ok(CartDetail)` - Cart with recalculated totals
    /// * `Err(ServiceError::NotFound)` - Unknown catalog item
    /// * `Err(ServiceError::InsufficientStock)` - The cart would hold more than
    ///   the supplier has available
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn add_item(
        &self,
        actor: &Principal,
        input: AddToCartInput,
    ) -> Result<CartDetail, ServiceError> {
        ensure_positive(input.quantity)?;

        let txn = self.db.begin().await?;
        let cart = lock_or_create_cart(&txn, actor).await?;

        let item = CatalogItem::find_by_id(input.catalog_item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Catalog item {} not found",
                    input.catalog_item_id
                ))
            })?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::CatalogItemId.eq(input.catalog_item_id))
            .one(&txn)
            .await?;

        let quantity = existing
            .as_ref()
            .map(|e| e.quantity)
            .unwrap_or(0)
            .checked_add(input.quantity)
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "Cart quantity for {} is too large",
                    item.name
                ))
            })?;
        ensure_available(&item, quantity)?;

        let now = Utc::now();
        let total_price = item.unit_price * Decimal::from(quantity);
        match existing {
            Some(line) => {
                let mut line: cart_item::ActiveModel = line.into();
                line.quantity = Set(quantity);
                line.total_price = Set(total_price);
                line.updated_at = Set(now);
                line.updated_by = Set(Some(actor.user_id));
                line.update(&txn).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    catalog_item_id: Set(item.id),
                    supplier_id: Set(item.supplier_id),
                    quantity: Set(quantity),
                    total_price: Set(total_price),
                    created_at: Set(now),
                    updated_at: Set(now),
                    created_by: Set(Some(actor.user_id)),
                    updated_by: Set(Some(actor.user_id)),
                }
                .insert(&txn)
                .await?;
            }
        }

        let cart = recalculate_cart_totals(&txn, cart, actor.user_id).await?;
        let detail = load_detail(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartUpdated(detail.cart.id))
            .await;

        info!(
            "Added item to cart {}: catalog item {} x{}",
            detail.cart.id, input.catalog_item_id, input.quantity
        );
        Ok(detail)
    }

    /// Sets the quantity of a cart line, re-checking supplier availability.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn update_item(
        &self,
        actor: &Principal,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartDetail, ServiceError> {
        ensure_positive(quantity)?;

        let txn = self.db.begin().await?;
        let cart = lock_or_create_cart(&txn, actor).await?;
        let line = find_line(&txn, cart.id, item_id).await?;

        let item = CatalogItem::find_by_id(line.catalog_item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Catalog item {} not found", line.catalog_item_id))
            })?;
        ensure_available(&item, quantity)?;

        let mut line: cart_item::ActiveModel = line.into();
        line.quantity = Set(quantity);
        line.total_price = Set(item.unit_price * Decimal::from(quantity));
        line.updated_at = Set(Utc::now());
        line.updated_by = Set(Some(actor.user_id));
        line.update(&txn).await?;

        let cart = recalculate_cart_totals(&txn, cart, actor.user_id).await?;
        let detail = load_detail(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartUpdated(detail.cart.id))
            .await;
        Ok(detail)
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn remove_item(
        &self,
        actor: &Principal,
        item_id: Uuid,
    ) -> Result<CartDetail, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = lock_or_create_cart(&txn, actor).await?;
        let line = find_line(&txn, cart.id, item_id).await?;

        CartItem::delete_by_id(line.id).exec(&txn).await?;

        let cart = recalculate_cart_totals(&txn, cart, actor.user_id).await?;
        let detail = load_detail(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartUpdated(detail.cart.id))
            .await;
        info!("Removed item {} from cart {}", item_id, detail.cart.id);
        Ok(detail)
    }
}

fn ensure_positive(quantity: i32) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "quantity must be positive, got {}",
            quantity
        )));
    }
    Ok(())
}

fn ensure_available(item: &catalog_item::Model, quantity: i32) -> Result<(), ServiceError> {
    if quantity > item.quantity {
        return Err(ServiceError::insufficient_stock(
            item.name.clone(),
            quantity,
            item.quantity,
        ));
    }
    Ok(())
}

/// Locks the principal's cart row, creating it on first use.
pub(crate) async fn lock_or_create_cart<C: ConnectionTrait>(
    conn: &C,
    actor: &Principal,
) -> Result<cart::Model, ServiceError> {
    let organization_id = actor.organization()?;
    let now = Utc::now();

    let cart = cart::ActiveModel {
        id: Set(Uuid::new_v4()),
        inventory_manager_id: Set(actor.user_id),
        organization_id: Set(organization_id),
        total_products: Set(0),
        total_price: Set(Decimal::ZERO),
        created_at: Set(now),
        updated_at: Set(now),
        created_by: Set(Some(actor.user_id)),
        updated_by: Set(Some(actor.user_id)),
    };
    Cart::insert(cart)
        .on_conflict(
            OnConflict::column(cart::Column::InventoryManagerId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    Cart::find()
        .filter(cart::Column::InventoryManagerId.eq(actor.user_id))
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::InternalError(format!("cart for {} vanished after upsert", actor.user_id))
        })
}

async fn find_line<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
    item_id: Uuid,
) -> Result<cart_item::Model, ServiceError> {
    CartItem::find_by_id(item_id)
        .filter(cart_item::Column::CartId.eq(cart_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))
}

/// Recomputes and persists the cart aggregates from its live items.
pub(crate) async fn recalculate_cart_totals<C: ConnectionTrait>(
    conn: &C,
    cart: cart::Model,
    actor_id: Uuid,
) -> Result<cart::Model, ServiceError> {
    let items = CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .all(conn)
        .await?;
    let (total_products, total_price) = cart_totals(&items);

    let mut cart: cart::ActiveModel = cart.into();
    cart.total_products = Set(total_products);
    cart.total_price = Set(total_price);
    cart.updated_at = Set(Utc::now());
    cart.updated_by = Set(Some(actor_id));
    Ok(cart.update(conn).await?)
}

async fn load_detail<C: ConnectionTrait>(
    conn: &C,
    cart: cart::Model,
) -> Result<CartDetail, ServiceError> {
    let items = CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .order_by_asc(cart_item::Column::CreatedAt)
        .all(conn)
        .await?;
    Ok(CartDetail { cart, items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn line(catalog_item_id: Uuid, total_price: Decimal) -> cart_item::Model {
        let now = Utc::now();
        cart_item::Model {
            id: Uuid::new_v4(),
            cart_id: Uuid::nil(),
            catalog_item_id,
            supplier_id: Uuid::nil(),
            quantity: 1,
            total_price,
            created_at: now,
            updated_at: now,
            created_by: None,
            updated_by: None,
        }
    }

    #[test]
    fn totals_of_empty_cart_are_zero() {
        assert_eq!(cart_totals(&[]), (0, Decimal::ZERO));
    }

    #[test]
    fn totals_sum_prices_and_count_distinct_items() {
        let gauze = Uuid::new_v4();
        let items = vec![line(gauze, dec!(30)), line(Uuid::new_v4(), dec!(40))];
        assert_eq!(cart_totals(&items), (2, dec!(70)));
    }

    proptest! {
        #[test]
        fn total_price_is_sum_of_line_totals(cents in proptest::collection::vec(0i64..1_000_000, 0..20)) {
            let items: Vec<_> = cents
                .iter()
                .map(|c| line(Uuid::new_v4(), Decimal::new(*c, 2)))
                .collect();
            let expected: Decimal = cents.iter().map(|c| Decimal::new(*c, 2)).sum();

            let (products, price) = cart_totals(&items);
            prop_assert_eq!(products as usize, items.len());
            prop_assert_eq!(price, expected);
        }
    }
}
