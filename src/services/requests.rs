use crate::{
    auth::Principal,
    entities::{
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
use std::{
    collections::{BTreeMap, HashSet},
    str::FromStr,
    sync::Arc,
};
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Decision an approver takes on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestAction {
    Approve,
    Reject,
}

impl FromStr for RequestAction {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" => Ok(RequestAction::Approve),
            "reject" | "rejected" => Ok(RequestAction::Reject),
            _ => Err(ServiceError::InvalidAction(format!(
                "'{}' is not a valid action, expected Approved or Rejected",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLineInput {
    pub org_inventory_id: Uuid,
    pub quantity_requested: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateRequestInput {
    #[serde(default)]
    pub is_emergency: bool,
    #[validate(length(min = 1, message = "A request needs at least one item"))]
    pub items: Vec<RequestLineInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemEdit {
    pub id: Uuid,
    pub quantity_requested: i32,
}

/// A request together with its line items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplyRequestDetail {
    #[serde(flatten)]
    pub request: supply_request::Model,
    pub items: Vec<requested_item::Model>,
}

/// Service governing the supply request lifecycle: `Pending -> Approved | Rejected`.
#[derive(Clone)]
pub struct SupplyRequestService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl SupplyRequestService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a request for the acting nurse.
    ///
    /// Every line is checked against the organization's current stock.
    /// Emergency requests are approved on the spot, attributed to the
    /// creator, and consume stock in the same transaction.
    #[instrument(skip(self, actor, input), fields(user_id = %actor.user_id, is_emergency = input.is_emergency))]
    pub async fn create(
        &self,
        actor: &Principal,
        input: CreateRequestInput,
    ) -> Result<SupplyRequestDetail, ServiceError> {
        input.validate()?;
        for line in &input.items {
            ensure_positive(line.quantity_requested)?;
        }
        let organization_id = actor.organization()?;
        let actor_id = actor.user_id;

        let detail = self
            .db
            .transaction::<_, SupplyRequestDetail, ServiceError>(move |txn| {
                Box::pin(async move {
                    let requested = sum_by_stock_row(
                        input
                            .items
                            .iter()
                            .map(|line| (line.org_inventory_id, line.quantity_requested)),
                    )?;
                    ensure_stock_covers(txn, &requested, organization_id).await?;

                    let now = Utc::now();
                    let request_id = Uuid::new_v4();
                    let is_emergency = input.is_emergency;
                    let request = supply_request::ActiveModel {
                        id: Set(request_id),
                        nurse_id: Set(actor_id),
                        organization_id: Set(organization_id),
                        is_emergency: Set(is_emergency),
                        total_items: Set(0),
                        status: Set(if is_emergency {
                            RequestStatus::Approved
                        } else {
                            RequestStatus::Pending
                        }),
                        approved_by: Set(is_emergency.then_some(actor_id)),
                        approved_at: Set(is_emergency.then_some(now)),
                        rejected_by: Set(None),
                        rejected_at: Set(None),
                        created_at: Set(now),
                        updated_at: Set(now),
                        created_by: Set(Some(actor_id)),
                        updated_by: Set(Some(actor_id)),
                    };
                    request.insert(txn).await.map_err(ServiceError::db_error)?;

                    for line in &input.items {
                        requested_item::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            request_id: Set(request_id),
                            org_inventory_id: Set(line.org_inventory_id),
                            quantity_requested: Set(line.quantity_requested),
                            quantity_returned: Set(0),
                            is_returned: Set(false),
                            created_at: Set(now),
                            updated_at: Set(now),
                            created_by: Set(Some(actor_id)),
                            updated_by: Set(Some(actor_id)),
                        }
                        .insert(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    }

                    recalculate_total_items(txn, request_id).await?;

                    if is_emergency {
                        consume_stock(txn, request_id, actor_id).await?;
                    }

                    load_detail(txn, request_id).await
                })
            })
            .await?;

        self.event_sender
            .send_or_log(Event::RequestCreated {
                request_id: detail.request.id,
                organization_id,
                is_emergency: detail.request.is_emergency,
            })
            .await;
        if detail.request.is_emergency {
            self.event_sender
                .send_or_log(Event::RequestApproved {
                    request_id: detail.request.id,
                    approved_by: actor_id,
                })
                .await;
        }

        info!(request_id = %detail.request.id, status = ?detail.request.status, "supply request created");
        Ok(detail)
    }

    /// Approves or rejects a pending request. Approval consumes stock for every
    /// line; if any line is short the whole approval rolls back.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn act(
        &self,
        request_id: Uuid,
        action: RequestAction,
        actor: &Principal,
    ) -> Result<supply_request::Model, ServiceError> {
        let actor = actor.clone();
        let actor_id = actor.user_id;

        let updated = self
            .db
            .transaction::<_, supply_request::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let request = lock_pending(txn, request_id, &actor).await?;

                    let now = Utc::now();
                    let mut active: supply_request::ActiveModel = request.into();
                    match action {
                        RequestAction::Approve => {
                            active.status = Set(RequestStatus::Approved);
                            active.approved_by = Set(Some(actor_id));
                            active.approved_at = Set(Some(now));
                        }
                        RequestAction::Reject => {
                            active.status = Set(RequestStatus::Rejected);
                            active.rejected_by = Set(Some(actor_id));
                            active.rejected_at = Set(Some(now));
                        }
                    }
                    active.updated_at = Set(now);
                    active.updated_by = Set(Some(actor_id));
                    let updated = active.update(txn).await.map_err(ServiceError::db_error)?;

                    if action == RequestAction::Approve {
                        consume_stock(txn, request_id, actor_id).await?;
                    }

                    Ok(updated)
                })
            })
            .await
            .map_err(|e| {
                let e = ServiceError::from(e);
                error!(%request_id, ?action, error = %e, "request action failed");
                e
            })?;

        let event = match action {
            RequestAction::Approve => Event::RequestApproved {
                request_id,
                approved_by: actor_id,
            },
            RequestAction::Reject => Event::RequestRejected {
                request_id,
                rejected_by: actor_id,
            },
        };
        self.event_sender.send_or_log(event).await;

        info!(%request_id, status = ?updated.status, "supply request processed");
        Ok(updated)
    }

    /// Changes requested quantities while the request is still pending.
    #[instrument(skip(self, actor, edits), fields(user_id = %actor.user_id, edits = edits.len()))]
    pub async fn edit_line_items(
        &self,
        request_id: Uuid,
        edits: Vec<LineItemEdit>,
        actor: &Principal,
    ) -> Result<SupplyRequestDetail, ServiceError> {
        for edit in &edits {
            ensure_positive(edit.quantity_requested)?;
        }
        let actor = actor.clone();
        let actor_id = actor.user_id;

        self.db
            .transaction::<_, SupplyRequestDetail, ServiceError>(move |txn| {
                Box::pin(async move {
                    let request = lock_pending(txn, request_id, &actor).await?;

                    let items = RequestedItem::find()
                        .filter(requested_item::Column::RequestId.eq(request_id))
                        .all(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    let mut touched = Vec::with_capacity(edits.len());
                    for edit in &edits {
                        let item = items.iter().find(|i| i.id == edit.id).ok_or_else(|| {
                            ServiceError::NotFound(format!(
                                "Item with id {} not found in this request",
                                edit.id
                            ))
                        })?;
                        touched.push((item.clone(), edit.quantity_requested));
                    }

                    // Untouched lines on the same stock row count toward its total.
                    let requested = sum_by_stock_row(items.iter().map(|item| {
                        let quantity = touched
                            .iter()
                            .rev()
                            .find(|(t, _)| t.id == item.id)
                            .map_or(item.quantity_requested, |(_, q)| *q);
                        (item.org_inventory_id, quantity)
                    }))?;
                    ensure_stock_covers(txn, &requested, request.organization_id).await?;

                    let now = Utc::now();
                    for (item, quantity) in touched {
                        let mut active: requested_item::ActiveModel = item.into();
                        active.quantity_requested = Set(quantity);
                        active.updated_at = Set(now);
                        active.updated_by = Set(Some(actor_id));
                        active.update(txn).await.map_err(ServiceError::db_error)?;
                    }

                    let mut active: supply_request::ActiveModel = request.into();
                    active.updated_at = Set(now);
                    active.updated_by = Set(Some(actor_id));
                    active.update(txn).await.map_err(ServiceError::db_error)?;

                    recalculate_total_items(txn, request_id).await?;
                    load_detail(txn, request_id).await
                })
            })
            .await
            .map_err(ServiceError::from)
    }

    /// Deletes a pending request and its line items.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn delete(&self, request_id: Uuid, actor: &Principal) -> Result<(), ServiceError> {
        let actor = actor.clone();

        self.db
            .transaction::<_, (), ServiceError>(move |txn| {
                Box::pin(async move {
                    lock_pending(txn, request_id, &actor).await?;

                    RequestedItem::delete_many()
                        .filter(requested_item::Column::RequestId.eq(request_id))
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    SupplyRequest::delete_by_id(request_id)
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    Ok(())
                })
            })
            .await?;

        self.event_sender
            .send_or_log(Event::RequestDeleted(request_id))
            .await;
        info!(%request_id, "supply request deleted");
        Ok(())
    }

    /// Fetches a request visible to the principal.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn get(
        &self,
        request_id: Uuid,
        actor: &Principal,
    ) -> Result<SupplyRequestDetail, ServiceError> {
        let detail = load_detail(self.db.as_ref(), request_id).await?;
        if !actor.can_access_organization(detail.request.organization_id) {
            return Err(request_not_found(request_id));
        }
        Ok(detail)
    }

    /// Requests of the principal's organization, newest first.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn list_for_organization(
        &self,
        actor: &Principal,
    ) -> Result<Vec<supply_request::Model>, ServiceError> {
        let organization_id = actor.organization()?;
        SupplyRequest::find()
            .filter(supply_request::Column::OrganizationId.eq(organization_id))
            .order_by_desc(supply_request::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }
}

fn ensure_positive(quantity: i32) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "quantity_requested must be positive, got {}",
            quantity
        )));
    }
    Ok(())
}

/// Totals requested quantities per stock row.
fn sum_by_stock_row(
    lines: impl IntoIterator<Item = (Uuid, i32)>,
) -> Result<BTreeMap<Uuid, i32>, ServiceError> {
    let mut totals: BTreeMap<Uuid, i32> = BTreeMap::new();
    for (org_inventory_id, quantity) in lines {
        let total = totals.entry(org_inventory_id).or_default();
        *total = total.checked_add(quantity).ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Requested quantity for stock row {} is too large",
                org_inventory_id
            ))
        })?;
    }
    Ok(totals)
}

/// Locks the rows in `requested` and checks each holds at least the summed quantity.
async fn ensure_stock_covers<C: ConnectionTrait>(
    conn: &C,
    requested: &BTreeMap<Uuid, i32>,
    organization_id: Uuid,
) -> Result<(), ServiceError> {
    let ids: Vec<Uuid> = requested.keys().copied().collect();
    let locked = StockLedger::lock_for_organization(conn, &ids, organization_id).await?;
    for (id, quantity) in requested {
        if let Some(entry) = locked.get(id) {
            if entry.stock.quantity_in_stock < *quantity {
                return Err(ServiceError::insufficient_stock(
                    entry.item.name.clone(),
                    *quantity,
                    entry.stock.quantity_in_stock,
                ));
            }
        }
    }
    Ok(())
}

fn request_not_found(request_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("Request {} not found", request_id))
}

/// Locks a request row and checks it may still be changed by `actor`.
async fn lock_pending<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
    actor: &Principal,
) -> Result<supply_request::Model, ServiceError> {
    let request = SupplyRequest::find_by_id(request_id)
        .lock_exclusive()
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| request_not_found(request_id))?;

    if !actor.can_access_organization(request.organization_id) {
        return Err(ServiceError::Forbidden(format!(
            "Request {} belongs to another organization",
            request_id
        )));
    }
    if request.status != RequestStatus::Pending {
        return Err(ServiceError::AlreadyProcessed(request_id));
    }
    Ok(request)
}

/// Decrements organization stock for every line of an approved request.
async fn consume_stock<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
    actor_id: Uuid,
) -> Result<(), ServiceError> {
    let items = RequestedItem::find()
        .filter(requested_item::Column::RequestId.eq(request_id))
        .order_by_asc(requested_item::Column::OrgInventoryId)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    for item in items {
        StockLedger::adjust(
            conn,
            item.org_inventory_id,
            -item.quantity_requested,
            Some(actor_id),
        )
        .await?;
    }
    Ok(())
}

/// `total_items` is the number of distinct stock rows referenced by the lines.
pub(crate) fn distinct_inventory_count(items: &[requested_item::Model]) -> i32 {
    items
        .iter()
        .map(|i| i.org_inventory_id)
        .collect::<HashSet<_>>()
        .len() as i32
}

async fn recalculate_total_items<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
) -> Result<i32, ServiceError> {
    let items = RequestedItem::find()
        .filter(requested_item::Column::RequestId.eq(request_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;
    let total_items = distinct_inventory_count(&items);

    SupplyRequest::update_many()
        .col_expr(
            supply_request::Column::TotalItems,
            sea_orm::sea_query::Expr::value(total_items),
        )
        .filter(supply_request::Column::Id.eq(request_id))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(total_items)
}

async fn load_detail<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
) -> Result<SupplyRequestDetail, ServiceError> {
    let request = SupplyRequest::find_by_id(request_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| request_not_found(request_id))?;
    let items = RequestedItem::find()
        .filter(requested_item::Column::RequestId.eq(request_id))
        .order_by_asc(requested_item::Column::CreatedAt)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(SupplyRequestDetail { request, items })
}
