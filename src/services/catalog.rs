use crate::{
    auth::{Principal, Role},
    entities::{
        cart_item::{self, Entity as CartItem},
        catalog_item::{self, Entity as CatalogItem},
        order_item::{self, Entity as OrderItem},
        org_inventory::{self, Entity as OrgInventory},
    },
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCatalogItemInput {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    pub unit_price: Decimal,
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: i32,
    #[serde(default)]
    pub is_reusable: bool,
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateCatalogItemInput {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    pub unit_price: Option<Decimal>,
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: Option<i32>,
    pub is_reusable: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierSummary {
    pub supplier_id: Uuid,
    pub item_count: i64,
}

fn ensure_price(price: Decimal) -> Result<(), ServiceError> {
    if price.is_sign_negative() {
        return Err(ServiceError::ValidationError(format!(
            "unit_price cannot be negative, got {}",
            price
        )));
    }
    Ok(())
}

/// Supplier-published catalog. Only the owning supplier may change an item.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, actor, input), fields(user_id = %actor.user_id))]
    pub async fn create_item(
        &self,
        actor: &Principal,
        input: CreateCatalogItemInput,
    ) -> Result<catalog_item::Model, ServiceError> {
        if actor.role != Role::Supplier {
            return Err(ServiceError::Forbidden(
                "Only suppliers can publish catalog items".to_string(),
            ));
        }
        input.validate()?;
        ensure_price(input.unit_price)?;

        let now = Utc::now();
        let item = catalog_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            supplier_id: Set(actor.user_id),
            name: Set(input.name),
            category: Set(input.category),
            unit_price: Set(input.unit_price),
            quantity: Set(input.quantity),
            is_reusable: Set(input.is_reusable),
            created_at: Set(now),
            updated_at: Set(now),
            created_by: Set(Some(actor.user_id)),
            updated_by: Set(Some(actor.user_id)),
        }
        .insert(self.db.as_ref())
        .await?;

        info!(catalog_item_id = %item.id, name = %item.name, "catalog item published");
        Ok(item)
    }

    #[instrument(skip(self, actor, input), fields(user_id = %actor.user_id))]
    pub async fn update_item(
        &self,
        item_id: Uuid,
        input: UpdateCatalogItemInput,
        actor: &Principal,
    ) -> Result<catalog_item::Model, ServiceError> {
        input.validate()?;
        if let Some(price) = input.unit_price {
            ensure_price(price)?;
        }
        let item = self.owned_item(item_id, actor).await?;

        let mut active: catalog_item::ActiveModel = item.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(category) = input.category {
            active.category = Set(category);
        }
        if let Some(unit_price) = input.unit_price {
            active.unit_price = Set(unit_price);
        }
        if let Some(quantity) = input.quantity {
            active.quantity = Set(quantity);
        }
        if let Some(is_reusable) = input.is_reusable {
            active.is_reusable = Set(is_reusable);
        }
        active.updated_at = Set(Utc::now());
        active.updated_by = Set(Some(actor.user_id));

        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Deletes an item that no organization stocks, no order references and
    /// no cart holds.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn delete_item(&self, item_id: Uuid, actor: &Principal) -> Result<(), ServiceError> {
        let item = self.owned_item(item_id, actor).await?;
        let db = self.db.as_ref();

        let in_carts = CartItem::find()
            .filter(cart_item::Column::CatalogItemId.eq(item.id))
            .count(db)
            .await?;
        if in_carts > 0 {
            return Err(ServiceError::ValidationError(format!(
                "Catalog item {} is in {} cart(s) and cannot be deleted",
                item.id, in_carts
            )));
        }

        let stocked = OrgInventory::find()
            .filter(org_inventory::Column::CatalogItemId.eq(item.id))
            .count(db)
            .await?;
        let ordered = OrderItem::find()
            .filter(order_item::Column::CatalogItemId.eq(item.id))
            .count(db)
            .await?;
        if stocked > 0 || ordered > 0 {
            return Err(ServiceError::ValidationError(format!(
                "Catalog item {} is stocked or ordered and cannot be deleted",
                item.id
            )));
        }

        CatalogItem::delete_by_id(item.id).exec(db).await?;
        info!(catalog_item_id = %item.id, "catalog item deleted");
        Ok(())
    }

    pub async fn get_item(&self, item_id: Uuid) -> Result<catalog_item::Model, ServiceError> {
        CatalogItem::find_by_id(item_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Catalog item {} not found", item_id)))
    }

    pub async fn list_for_supplier(
        &self,
        supplier_id: Uuid,
    ) -> Result<Vec<catalog_item::Model>, ServiceError> {
        Ok(CatalogItem::find()
            .filter(catalog_item::Column::SupplierId.eq(supplier_id))
            .order_by_asc(catalog_item::Column::Name)
            .all(self.db.as_ref())
            .await?)
    }

    /// Suppliers with at least one published item.
    pub async fn list_suppliers(&self) -> Result<Vec<SupplierSummary>, ServiceError> {
        let rows: Vec<(Uuid, i64)> = CatalogItem::find()
            .select_only()
            .column(catalog_item::Column::SupplierId)
            .column_as(catalog_item::Column::Id.count(), "item_count")
            .group_by(catalog_item::Column::SupplierId)
            .order_by_asc(catalog_item::Column::SupplierId)
            .into_tuple()
            .all(self.db.as_ref())
            .await?;

        Ok(rows
            .into_iter()
            .map(|(supplier_id, item_count)| SupplierSummary {
                supplier_id,
                item_count,
            })
            .collect())
    }

    async fn owned_item(
        &self,
        item_id: Uuid,
        actor: &Principal,
    ) -> Result<catalog_item::Model, ServiceError> {
        let item = self.get_item(item_id).await?;
        if item.supplier_id != actor.user_id {
            return Err(ServiceError::Forbidden(
                "You are not allowed to modify this product".to_string(),
            ));
        }
        Ok(item)
    }
}
