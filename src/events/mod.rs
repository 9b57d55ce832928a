use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "dropping domain event");
        }
    }
}

/// Committed domain transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    RequestCreated {
        request_id: Uuid,
        organization_id: Uuid,
        is_emergency: bool,
    },
    RequestApproved {
        request_id: Uuid,
        approved_by: Uuid,
    },
    RequestRejected {
        request_id: Uuid,
        rejected_by: Uuid,
    },
    RequestDeleted(Uuid),
    ItemReturned {
        request_id: Uuid,
        requested_item_id: Uuid,
        quantity: i32,
        fully_returned: bool,
    },
    CartUpdated(Uuid),
    OrderCreated(Uuid),
    OrderDelivered {
        order_id: Uuid,
        delivered_by: Uuid,
    },
    OrderConfirmed {
        order_id: Uuid,
        confirmed_by: Uuid,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::RequestCreated { .. } => "request_created",
            Event::RequestApproved { .. } => "request_approved",
            Event::RequestRejected { .. } => "request_rejected",
            Event::RequestDeleted(_) => "request_deleted",
            Event::ItemReturned { .. } => "item_returned",
            Event::CartUpdated(_) => "cart_updated",
            Event::OrderCreated(_) => "order_created",
            Event::OrderDelivered { .. } => "order_delivered",
            Event::OrderConfirmed { .. } => "order_confirmed",
        }
    }
}

/// Drains the event channel, recording each committed transition.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        metrics::counter!("careflow_events_total", 1, "event" => event.name());
        info!(event = event.name(), payload = ?event, "domain event");
    }

    info!("Event channel closed, stopping event processing loop");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_tolerates_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        sender.send_or_log(Event::CartUpdated(Uuid::new_v4())).await;
        assert!(sender.send(Event::OrderCreated(Uuid::new_v4())).await.is_err());
    }

    #[tokio::test]
    async fn process_events_stops_when_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        sender.send_or_log(Event::RequestDeleted(Uuid::new_v4())).await;
        drop(sender);
        process_events(rx).await;
    }
}
