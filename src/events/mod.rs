//! Post-commit domain events.
//!
//! The orchestrators emit events only after their transaction has committed;
//! the processing loop fans them out to the notifier and realtime publisher.
//! Every failure on this path is logged and swallowed; nothing here can
//! reach back into the critical booking path.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::services::notifications::Notifier;
use crate::services::realtime::{RealtimePublisher, SeatUpdate};

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
}

/// A notification target: an authenticated user or a guest email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Recipient {
    User(Uuid),
    Guest(String),
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        recipient: Recipient,
        payment_url: String,
    },
    PaymentConfirmed {
        order_id: Uuid,
        order_number: String,
        recipient: Recipient,
    },
    TicketsRefunded {
        order_id: Uuid,
        order_number: String,
        recipient: Recipient,
        ticket_ids: Vec<Uuid>,
        refund_amount: rust_decimal::Decimal,
    },
    TicketsVoided {
        order_id: Uuid,
        order_number: String,
        recipient: Recipient,
        ticket_ids: Vec<Uuid>,
    },
    TripCancelled {
        trip_id: Uuid,
        affected_orders: usize,
    },
    SeatsUpdated {
        trip_id: Uuid,
        seats: Vec<SeatUpdate>,
    },
}

/// Processes incoming events, fanning out to the notifier and the realtime
/// publisher. Best-effort: failures are logged, never retried, never raised.
pub async fn process_events(
    mut rx: mpsc::Receiver<Event>,
    notifier: Arc<dyn Notifier>,
    publisher: Arc<dyn RealtimePublisher>,
) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderCreated {
                order_id,
                order_number,
                recipient,
                payment_url,
            } => {
                let content = format!(
                    "Your booking {} is reserved. Complete payment at {}",
                    order_number, payment_url
                );
                if let Err(e) = notifier
                    .notify(
                        &recipient,
                        "Booking received",
                        &content,
                        serde_json::json!({ "order_id": order_id }),
                    )
                    .await
                {
                    warn!(order_id = %order_id, error = %e, "Failed to send booking notification");
                }
            }
            Event::PaymentConfirmed {
                order_id,
                order_number,
                recipient,
            } => {
                let content = format!("Payment received, booking {} is confirmed", order_number);
                if let Err(e) = notifier
                    .notify(
                        &recipient,
                        "Payment confirmed",
                        &content,
                        serde_json::json!({ "order_id": order_id }),
                    )
                    .await
                {
                    warn!(order_id = %order_id, error = %e, "Failed to send payment notification");
                }
                if let Err(e) = publisher.publish_order_event(order_id, "payment_confirmed").await {
                    warn!(order_id = %order_id, error = %e, "Failed to publish order event");
                }
            }
            Event::TicketsRefunded {
                order_id,
                order_number,
                recipient,
                ticket_ids,
                refund_amount,
            } => {
                let content = format!(
                    "{} ticket(s) on booking {} were refunded ({})",
                    ticket_ids.len(),
                    order_number,
                    refund_amount
                );
                if let Err(e) = notifier
                    .notify(
                        &recipient,
                        "Refund processed",
                        &content,
                        serde_json::json!({ "order_id": order_id, "ticket_ids": ticket_ids }),
                    )
                    .await
                {
                    warn!(order_id = %order_id, error = %e, "Failed to send refund notification");
                }
                if let Err(e) = publisher.publish_order_event(order_id, "tickets_refunded").await {
                    warn!(order_id = %order_id, error = %e, "Failed to publish order event");
                }
            }
            Event::TicketsVoided {
                order_id,
                order_number,
                recipient,
                ticket_ids,
            } => {
                let content = format!(
                    "{} ticket(s) on booking {} were cancelled",
                    ticket_ids.len(),
                    order_number
                );
                if let Err(e) = notifier
                    .notify(
                        &recipient,
                        "Booking cancelled",
                        &content,
                        serde_json::json!({ "order_id": order_id, "ticket_ids": ticket_ids }),
                    )
                    .await
                {
                    warn!(order_id = %order_id, error = %e, "Failed to send cancellation notification");
                }
            }
            Event::TripCancelled {
                trip_id,
                affected_orders,
            } => {
                info!(trip_id = %trip_id, affected_orders, "Trip cancelled");
                if let Err(e) = publisher.publish_order_event(trip_id, "trip_cancelled").await {
                    warn!(trip_id = %trip_id, error = %e, "Failed to publish trip cancellation");
                }
            }
            Event::SeatsUpdated { trip_id, seats } => {
                if let Err(e) = publisher.publish_seat_update(trip_id, &seats).await {
                    warn!(trip_id = %trip_id, error = %e, "Failed to publish seat update");
                }
            }
        }
    }

    info!("Event processing loop stopped");
}
