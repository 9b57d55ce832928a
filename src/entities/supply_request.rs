use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A nurse's request for supplies from organization stock.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "supply_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub nurse_id: Uuid,
    pub organization_id: Uuid,
    pub is_emergency: bool,
    /// Distinct count of org inventory rows referenced by the line items
    pub total_items: i32,
    pub status: RequestStatus,
    #[sea_orm(nullable)]
    pub approved_by: Option<Uuid>,
    #[sea_orm(nullable)]
    pub approved_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub rejected_by: Option<Uuid>,
    #[sea_orm(nullable)]
    pub rejected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub created_by: Option<Uuid>,
    #[sea_orm(nullable)]
    pub updated_by: Option<Uuid>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::requested_item::Entity")]
    RequestedItems,
}

impl Related<super::requested_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RequestedItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum RequestStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}
