use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A line item of a supply request.
///
/// `is_returned` holds exactly when `quantity_returned == quantity_requested`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "requested_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub request_id: Uuid,
    pub org_inventory_id: Uuid,
    pub quantity_requested: i32,
    pub quantity_returned: i32,
    pub is_returned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub created_by: Option<Uuid>,
    #[sea_orm(nullable)]
    pub updated_by: Option<Uuid>,
}

impl Model {
    pub fn pending_return(&self) -> i32 {
        self.quantity_requested - self.quantity_returned
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::supply_request::Entity",
        from = "Column::RequestId",
        to = "super::supply_request::Column::Id",
        on_delete = "Cascade"
    )]
    SupplyRequest,
    #[sea_orm(
        belongs_to = "super::org_inventory::Entity",
        from = "Column::OrgInventoryId",
        to = "super::org_inventory::Column::Id"
    )]
    OrgInventory,
}

impl Related<super::supply_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SupplyRequest.def()
    }
}

impl Related<super::org_inventory::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrgInventory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
