use crate::{
    auth::Principal,
    entities::{
        catalog_item::{self, Entity as CatalogItem},
        org_inventory::{self, Entity as OrgInventory},
        requested_item::{self, Entity as RequestedItem},
        supply_request::{self, Entity as SupplyRequest, RequestStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock_ledger::StockLedger,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tracing::{info, instrument};
use uuid::Uuid;

/// A reusable line item still out on the floor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnableItem {
    pub id: Uuid,
    pub org_inventory_id: Uuid,
    pub item_name: String,
    pub quantity_requested: i32,
    pub quantity_returned: i32,
    pub pending: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordReturnInput {
    pub org_inventory_id: Uuid,
    pub quantity_returned: i32,
}

/// Aggregate return progress over the reusable lines of a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnStatus {
    pub total_requested: i32,
    pub total_returned: i32,
    pub total_pending: i32,
}

impl ReturnStatus {
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a requested_item::Model>) -> Self {
        let (total_requested, total_returned) = items
            .into_iter()
            .fold((0, 0), |(req, ret), item| {
                (req + item.quantity_requested, ret + item.quantity_returned)
            });
        Self {
            total_requested,
            total_returned,
            total_pending: total_requested - total_returned,
        }
    }
}

/// Tracks partial returns of reusable items against approved requests.
#[derive(Clone)]
pub struct ReturnTrackerService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ReturnTrackerService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn list_returnable(
        &self,
        request_id: Uuid,
        actor: &Principal,
    ) -> Result<Vec<ReturnableItem>, ServiceError> {
        let db = self.db.as_ref();
        self.visible_request(request_id, actor).await?;

        let lines = reusable_lines(db, request_id).await?;
        Ok(lines
            .into_iter()
            .filter(|(item, _)| !item.is_returned)
            .map(|(item, name)| ReturnableItem {
                id: item.id,
                org_inventory_id: item.org_inventory_id,
                item_name: name,
                quantity_requested: item.quantity_requested,
                quantity_returned: item.quantity_returned,
                pending: item.pending_return(),
            })
            .collect())
    }

    /// Records `quantity_returned` units coming back for one line.
    ///
    /// Stock is credited only when the line becomes fully returned, and then
    /// by the whole `quantity_requested`.
    #[instrument(skip(self, actor, input), fields(user_id = %actor.user_id, org_inventory_id = %input.org_inventory_id, quantity = input.quantity_returned))]
    pub async fn record_return(
        &self,
        request_id: Uuid,
        input: RecordReturnInput,
        actor: &Principal,
    ) -> Result<requested_item::Model, ServiceError> {
        if input.quantity_returned <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "quantity_returned must be positive, got {}",
                input.quantity_returned
            )));
        }
        let actor = actor.clone();
        let actor_id = actor.user_id;

        let (updated, became_returned) = self
            .db
            .transaction::<_, (requested_item::Model, bool), ServiceError>(move |txn| {
                Box::pin(async move {
                    let request = SupplyRequest::find_by_id(request_id)
                        .lock_exclusive()
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Request {} not found", request_id))
                        })?;
                    if !actor.can_access_organization(request.organization_id) {
                        return Err(ServiceError::Forbidden(format!(
                            "Request {} belongs to another organization",
                            request_id
                        )));
                    }
                    if request.status != RequestStatus::Approved {
                        return Err(ServiceError::InvalidTransition(format!(
                            "Returns can only be recorded against approved requests; request {} is {:?}",
                            request_id, request.status
                        )));
                    }

                    let item = find_reusable_line(txn, request_id, input.org_inventory_id).await?;

                    let pending = item.pending_return();
                    if input.quantity_returned > pending {
                        return Err(ServiceError::ExceedsPending { pending });
                    }

                    let quantity_requested = item.quantity_requested;
                    let quantity_returned = item.quantity_returned + input.quantity_returned;
                    let is_returned = quantity_returned == quantity_requested;
                    let became_returned = is_returned && !item.is_returned;

                    let mut active: requested_item::ActiveModel = item.into();
                    active.quantity_returned = Set(quantity_returned);
                    active.is_returned = Set(is_returned);
                    active.updated_at = Set(Utc::now());
                    active.updated_by = Set(Some(actor_id));
                    let updated = active.update(txn).await.map_err(ServiceError::db_error)?;

                    if became_returned {
                        StockLedger::adjust(
                            txn,
                            updated.org_inventory_id,
                            quantity_requested,
                            Some(actor_id),
                        )
                        .await?;
                    }

                    Ok((updated, became_returned))
                })
            })
            .await?;

        self.event_sender
            .send_or_log(Event::ItemReturned {
                request_id,
                requested_item_id: updated.id,
                quantity: input.quantity_returned,
                fully_returned: became_returned,
            })
            .await;

        info!(
            requested_item_id = %updated.id,
            quantity_returned = updated.quantity_returned,
            is_returned = updated.is_returned,
            "return recorded"
        );
        Ok(updated)
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn status(
        &self,
        request_id: Uuid,
        actor: &Principal,
    ) -> Result<ReturnStatus, ServiceError> {
        self.visible_request(request_id, actor).await?;
        let lines = reusable_lines(self.db.as_ref(), request_id).await?;
        Ok(ReturnStatus::from_items(lines.iter().map(|(item, _)| item)))
    }

    async fn visible_request(
        &self,
        request_id: Uuid,
        actor: &Principal,
    ) -> Result<supply_request::Model, ServiceError> {
        SupplyRequest::find_by_id(request_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .filter(|r| actor.can_access_organization(r.organization_id))
            .ok_or_else(|| ServiceError::NotFound(format!("Request {} not found", request_id)))
    }
}

/// Lines of a request whose catalog item is reusable, with the item name.
async fn reusable_lines<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
) -> Result<Vec<(requested_item::Model, String)>, ServiceError> {
    let items = RequestedItem::find()
        .filter(requested_item::Column::RequestId.eq(request_id))
        .order_by_asc(requested_item::Column::CreatedAt)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let stock_ids: Vec<Uuid> = items.iter().map(|i| i.org_inventory_id).collect();
    let reusable: HashMap<Uuid, String> = OrgInventory::find()
        .filter(org_inventory::Column::Id.is_in(stock_ids))
        .find_also_related(CatalogItem)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?
        .into_iter()
        .filter_map(|(stock, item)| item.filter(|i| i.is_reusable).map(|i| (stock.id, i.name)))
        .collect();

    Ok(items
        .into_iter()
        .filter_map(|item| {
            reusable
                .get(&item.org_inventory_id)
                .cloned()
                .map(|name| (item, name))
        })
        .collect())
}

/// Locks the request's line for `org_inventory_id`, provided its item is reusable.
async fn find_reusable_line<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
    org_inventory_id: Uuid,
) -> Result<requested_item::Model, ServiceError> {
    let not_found = || {
        ServiceError::NotFound(format!(
            "Item {} not found in request {}, or not reusable",
            org_inventory_id, request_id
        ))
    };

    let is_reusable = OrgInventory::find_by_id(org_inventory_id)
        .inner_join(CatalogItem)
        .filter(catalog_item::Column::IsReusable.eq(true))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .is_some();
    if !is_reusable {
        return Err(not_found());
    }

    let mut lines = RequestedItem::find()
        .filter(requested_item::Column::RequestId.eq(request_id))
        .filter(requested_item::Column::OrgInventoryId.eq(org_inventory_id))
        .order_by_asc(requested_item::Column::CreatedAt)
        .lock_exclusive()
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    // Prefer a line that still has units out
    match lines.iter().position(|l| !l.is_returned) {
        Some(idx) => Ok(lines.swap_remove(idx)),
        None => lines.into_iter().next().ok_or_else(not_found),
    }
}
