use crate::{
    auth::Principal,
    entities::{
        catalog_item::{self, Entity as CatalogItem},
        org_inventory::{self, Entity as OrgInventory},
    },
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveValue::Set,
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, instrument};
use uuid::Uuid;

/// An organization stock row joined with its catalog details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    pub id: Uuid,
    pub catalog_item_id: Uuid,
    pub name: String,
    pub category: String,
    pub is_reusable: bool,
    pub quantity_in_stock: i32,
}

/// A locked stock row together with the catalog item it stocks.
#[derive(Debug, Clone)]
pub struct LockedStock {
    pub stock: org_inventory::Model,
    pub item: catalog_item::Model,
}

/// Owns every write to `org_inventory.quantity_in_stock` and to the supplier
/// catalog quantity.
///
/// The mutating functions take a connection rather than `&self` so they run
/// inside the caller's transaction; the stock change commits or rolls back
/// together with the state transition that triggered it.
#[derive(Clone)]
pub struct StockLedger {
    db: Arc<DatabaseConnection>,
}

impl StockLedger {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Applies `delta` to an organization stock row.
    ///
    /// Decrements are a single conditional `UPDATE ... WHERE quantity_in_stock >= n`
    /// so the row can never go negative, even between concurrent writers.
    /// Increments never fail for an existing row.
    #[instrument(skip(conn))]
    pub async fn adjust<C: ConnectionTrait>(
        conn: &C,
        org_inventory_id: Uuid,
        delta: i32,
        actor: Option<Uuid>,
    ) -> Result<org_inventory::Model, ServiceError> {
        if delta != 0 {
            let amount = delta.abs();
            let column = Expr::col(org_inventory::Column::QuantityInStock);
            let mut update = OrgInventory::update_many()
                .col_expr(
                    org_inventory::Column::QuantityInStock,
                    if delta < 0 {
                        column.sub(amount)
                    } else {
                        column.add(amount)
                    },
                )
                .col_expr(org_inventory::Column::UpdatedAt, Expr::value(Utc::now()))
                .col_expr(org_inventory::Column::UpdatedBy, Expr::value(actor))
                .filter(org_inventory::Column::Id.eq(org_inventory_id));
            if delta < 0 {
                update = update.filter(org_inventory::Column::QuantityInStock.gte(amount));
            }

            let result = update.exec(conn).await.map_err(ServiceError::db_error)?;
            if result.rows_affected == 0 {
                let locked = Self::lock_one(conn, org_inventory_id).await?;
                return Err(ServiceError::insufficient_stock(
                    locked.item.name,
                    amount,
                    locked.stock.quantity_in_stock,
                ));
            }

            metrics::counter!(
                "careflow_stock_adjustments_total",
                1,
                "direction" => if delta < 0 { "decrement" } else { "increment" }
            );
        }

        let updated = OrgInventory::find_by_id(org_inventory_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| not_found(org_inventory_id))?;

        debug!(
            %org_inventory_id,
            delta,
            quantity_in_stock = updated.quantity_in_stock,
            "stock adjusted"
        );
        Ok(updated)
    }

    /// Returns the stock row for `(catalog_item_id, organization_id)`, creating
    /// it with zero stock the first time an organization receives the item.
    #[instrument(skip(conn))]
    pub async fn get_or_create<C: ConnectionTrait>(
        conn: &C,
        catalog_item_id: Uuid,
        organization_id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<org_inventory::Model, ServiceError> {
        let now = Utc::now();
        let row = org_inventory::ActiveModel {
            id: Set(Uuid::new_v4()),
            catalog_item_id: Set(catalog_item_id),
            organization_id: Set(organization_id),
            quantity_in_stock: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            created_by: Set(actor),
            updated_by: Set(actor),
        };

        OrgInventory::insert(row)
            .on_conflict(
                OnConflict::columns([
                    org_inventory::Column::CatalogItemId,
                    org_inventory::Column::OrganizationId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await
            .map_err(ServiceError::db_error)?;

        OrgInventory::find()
            .filter(org_inventory::Column::CatalogItemId.eq(catalog_item_id))
            .filter(org_inventory::Column::OrganizationId.eq(organization_id))
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "stock row for catalog item {} vanished after upsert",
                    catalog_item_id
                ))
            })
    }

    /// Draws `quantity` from a supplier's catalog stock.
    #[instrument(skip(conn))]
    pub async fn decrement_catalog<C: ConnectionTrait>(
        conn: &C,
        catalog_item_id: Uuid,
        quantity: i32,
        actor: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let result = CatalogItem::update_many()
            .col_expr(
                catalog_item::Column::Quantity,
                Expr::col(catalog_item::Column::Quantity).sub(quantity),
            )
            .col_expr(catalog_item::Column::UpdatedAt, Expr::value(Utc::now()))
            .col_expr(catalog_item::Column::UpdatedBy, Expr::value(actor))
            .filter(catalog_item::Column::Id.eq(catalog_item_id))
            .filter(catalog_item::Column::Quantity.gte(quantity))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            let item = CatalogItem::find_by_id(catalog_item_id)
                .one(conn)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Catalog item {} not found", catalog_item_id))
                })?;
            return Err(ServiceError::insufficient_stock(
                item.name,
                quantity,
                item.quantity,
            ));
        }

        metrics::counter!("careflow_catalog_drawdowns_total", 1);
        Ok(())
    }

    /// Locks the given stock rows of one organization (`SELECT ... FOR UPDATE`)
    /// and pairs each with its catalog item. Rows outside the organization are
    /// reported as not found.
    pub async fn lock_for_organization<C: ConnectionTrait>(
        conn: &C,
        org_inventory_ids: &[Uuid],
        organization_id: Uuid,
    ) -> Result<HashMap<Uuid, LockedStock>, ServiceError> {
        let stock = OrgInventory::find()
            .filter(org_inventory::Column::Id.is_in(org_inventory_ids.to_vec()))
            .filter(org_inventory::Column::OrganizationId.eq(organization_id))
            .lock_exclusive()
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        let item_ids: Vec<Uuid> = stock.iter().map(|s| s.catalog_item_id).collect();
        let mut items: HashMap<Uuid, catalog_item::Model> = CatalogItem::find()
            .filter(catalog_item::Column::Id.is_in(item_ids))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        let mut locked = HashMap::with_capacity(stock.len());
        for row in stock {
            let item = items.remove(&row.catalog_item_id).ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "catalog item {} missing for stock row {}",
                    row.catalog_item_id, row.id
                ))
            })?;
            locked.insert(row.id, LockedStock { stock: row, item });
        }

        if let Some(missing) = org_inventory_ids.iter().find(|id| !locked.contains_key(*id)) {
            return Err(not_found(*missing));
        }
        Ok(locked)
    }

    async fn lock_one<C: ConnectionTrait>(
        conn: &C,
        org_inventory_id: Uuid,
    ) -> Result<LockedStock, ServiceError> {
        let stock = OrgInventory::find_by_id(org_inventory_id)
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| not_found(org_inventory_id))?;
        let item = CatalogItem::find_by_id(stock.catalog_item_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Catalog item {} not found",
                    stock.catalog_item_id
                ))
            })?;
        Ok(LockedStock { stock, item })
    }

    /// Stock held by the principal's organization, ordered by item name.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn list_for_organization(
        &self,
        actor: &Principal,
    ) -> Result<Vec<StockLine>, ServiceError> {
        let organization_id = actor.organization()?;

        let rows = OrgInventory::find()
            .filter(org_inventory::Column::OrganizationId.eq(organization_id))
            .find_also_related(CatalogItem)
            .order_by_asc(catalog_item::Column::Name)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        Ok(rows
            .into_iter()
            .filter_map(|(stock, item)| {
                item.map(|item| StockLine {
                    id: stock.id,
                    catalog_item_id: item.id,
                    name: item.name,
                    category: item.category,
                    is_reusable: item.is_reusable,
                    quantity_in_stock: stock.quantity_in_stock,
                })
            })
            .collect())
    }
}

fn not_found(org_inventory_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("Inventory item {} not found", org_inventory_id))
}
