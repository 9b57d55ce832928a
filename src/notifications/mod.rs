use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use thiserror::Error;
use tokio::{
    sync::{mpsc, Notify},
    task::JoinHandle,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::entities::order;

/// Which message a notification renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationTemplate {
    /// Sent to the supplier once the inventory manager confirms receipt
    OrderConfirmed,
    /// Sent to the inventory manager once the supplier marks the order delivered
    OrderDelivered,
}

/// Values substituted into a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContext {
    pub order_id: Uuid,
    pub total_products: i32,
    pub total_price: Decimal,
}

/// Represents a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: Uuid,
    pub template: NotificationTemplate,
    pub context: NotificationContext,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(recipient: Uuid, template: NotificationTemplate, context: NotificationContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient,
            template,
            context,
            created_at: Utc::now(),
        }
    }

    pub fn order_confirmed(order: &order::Model) -> Self {
        Self::new(
            order.supplier_id,
            NotificationTemplate::OrderConfirmed,
            NotificationContext::from(order),
        )
    }

    pub fn order_delivered(order: &order::Model) -> Self {
        Self::new(
            order.inventory_manager_id,
            NotificationTemplate::OrderDelivered,
            NotificationContext::from(order),
        )
    }

    /// Renders `(subject, body)`.
    pub fn render(&self) -> (String, String) {
        let ctx = &self.context;
        match self.template {
            NotificationTemplate::OrderConfirmed => (
                format!("Order {} confirmed", ctx.order_id),
                format!(
                    "Your order {} ({} products, total {}) has been received and confirmed by the inventory manager.",
                    ctx.order_id, ctx.total_products, ctx.total_price
                ),
            ),
            NotificationTemplate::OrderDelivered => (
                format!("Order {} delivered, awaiting confirmation", ctx.order_id),
                format!(
                    "The supplier marked order {} ({} products, total {}) as delivered. Please confirm receipt.",
                    ctx.order_id, ctx.total_products, ctx.total_price
                ),
            ),
        }
    }
}

impl From<&order::Model> for NotificationContext {
    fn from(order: &order::Model) -> Self {
        Self {
            order_id: order.id,
            total_products: order.total_products,
            total_price: order.total_price,
        }
    }
}

/// Notification delivery errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotificationError {
    /// Worth retrying (timeouts, unavailable relay)
    #[error("Transient notification failure: {0}")]
    Transient(String),
    #[error("Permanent notification failure: {0}")]
    Permanent(String),
}

/// Outbound delivery channel (mail relay, push gateway, ...)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
        }
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Final result of delivering one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32, error: NotificationError },
}

/// Producer side of the post-commit notification queue.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    sender: mpsc::Sender<Notification>,
}

impl NotificationQueue {
    pub fn new(sender: mpsc::Sender<Notification>) -> Self {
        Self { sender }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Enqueues a notification. Must only be called once the triggering
    /// transaction has committed; a closed queue is logged, not propagated.
    pub async fn enqueue(&self, notification: Notification) {
        let id = notification.id;
        if let Err(e) = self.sender.send(notification).await {
            error!(notification_id = %id, error = %e, "notification queue closed, dropping notification");
            metrics::counter!("careflow_notifications_dropped_total", 1);
        }
    }
}

/// Delivers one notification, retrying transient failures with exponential backoff.
#[instrument(skip(notifier, notification), fields(notification_id = %notification.id, template = ?notification.template))]
pub async fn deliver_with_retry(
    notifier: &dyn Notifier,
    notification: &Notification,
    policy: RetryPolicy,
) -> DeliveryOutcome {
    let mut attempt: u32 = 0;
    loop {
        match notifier.notify(notification).await {
            Ok(()) => {
                return DeliveryOutcome::Delivered {
                    attempts: attempt + 1,
                }
            }
            Err(NotificationError::Transient(reason)) if attempt < policy.max_retries => {
                let delay = policy.backoff(attempt);
                warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    %reason,
                    "notification delivery failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                return DeliveryOutcome::Failed {
                    attempts: attempt + 1,
                    error,
                }
            }
        }
    }
}

/// Worker loop draining the notification queue until every producer is gone.
pub async fn run_dispatcher(
    mut rx: mpsc::Receiver<Notification>,
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
) {
    info!("Starting notification dispatcher");

    while let Some(notification) = rx.recv().await {
        match deliver_with_retry(notifier.as_ref(), &notification, policy).await {
            DeliveryOutcome::Delivered { attempts } => {
                metrics::counter!("careflow_notifications_delivered_total", 1);
                info!(
                    notification_id = %notification.id,
                    recipient = %notification.recipient,
                    attempts,
                    "notification delivered"
                );
            }
            DeliveryOutcome::Failed { attempts, error } => {
                metrics::counter!("careflow_notifications_failed_total", 1);
                error!(
                    notification_id = %notification.id,
                    recipient = %notification.recipient,
                    attempts,
                    error = %error,
                    "notification delivery abandoned"
                );
            }
        }
    }

    info!("Notification queue closed, stopping dispatcher");
}

/// Default notifier: writes the rendered message to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        let (subject, body) = notification.render();
        info!(recipient = %notification.recipient, %subject, %body, "notification sent");
        Ok(())
    }
}

/// Records deliveries in memory. Failures can be scripted ahead of time and
/// are consumed one per attempt before any delivery succeeds.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    delivered: Mutex<Vec<Notification>>,
    scripted_failures: Mutex<VecDeque<NotificationError>>,
    attempts: AtomicUsize,
    changed: Notify,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, errors: impl IntoIterator<Item = NotificationError>) {
        if let Ok(mut script) = self.scripted_failures.lock() {
            script.extend(errors);
        }
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` notifications were delivered.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let changed = self.changed.notified();
            if self.delivered().len() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, changed).await.is_err() {
                return self.delivered().len() >= count;
            }
        }
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let scripted = self
            .scripted_failures
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front());
        if let Some(err) = scripted {
            return Err(err);
        }

        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(notification.clone());
        }
        self.changed.notify_waiters();
        Ok(())
    }
}

/// Waits up to `timeout` for the dispatcher to deliver its backlog once every
/// queue handle has been dropped. Returns `false` if notifications were left behind.
pub async fn drain_dispatcher(dispatcher: JoinHandle<()>, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, dispatcher).await {
        Ok(Ok(())) => {
            info!("notification queue drained");
            true
        }
        Ok(Err(e)) => {
            error!(error = %e, "notification dispatcher task failed");
            false
        }
        Err(_) => {
            warn!(?timeout, "notification queue not drained before shutdown");
            false
        }
    }
}
