//! Refund and cancellation orchestration, the inverse of booking.
//!
//! A ticket is refunded only from Booked (money moves back through the
//! gateway) and voided only from Pending (no money involved). Gateway refund
//! calls run inside the transaction so the bookkeeping that depends on them
//! can never commit without them.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use prometheus::IntCounter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::order::{self, Entity as OrderEntity, OrderStatus};
use crate::entities::payment::PaymentStatus;
use crate::entities::seat::{self, Entity as SeatEntity};
use crate::entities::ticket::{self, Entity as TicketEntity, TicketStatus};
use crate::entities::trip::{self, Entity as TripEntity, TripStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender, Recipient};
use crate::services::payments::{self, PaymentGateway};
use crate::services::{coupons, seats};

lazy_static! {
    static ref TICKET_REFUNDS: IntCounter = IntCounter::new(
        "ticket_refunds_total",
        "Total number of tickets refunded"
    )
    .expect("metric can be created");
    static ref TICKET_VOIDS: IntCounter = IntCounter::new(
        "ticket_voids_total",
        "Total number of tickets voided without payment"
    )
    .expect("metric can be created");
}

fn recipient_for(order: &order::Model) -> Recipient {
    match order.user_id {
        Some(user_id) => Recipient::User(user_id),
        None => Recipient::Guest(order.guest_email.clone().unwrap_or_default()),
    }
}

/// Recomputes an order's status from its tickets and reverses the coupon
/// usage when the order dissolves. Shared by the refund path, the void path
/// and the trip-cancellation cascade.
pub(crate) async fn recompute_order_status(
    txn: &DatabaseTransaction,
    order: order::Model,
    now: DateTime<Utc>,
) -> Result<order::Model, ServiceError> {
    let tickets = TicketEntity::find()
        .filter(ticket::Column::OrderId.eq(order.id))
        .all(txn)
        .await
        .map_err(ServiceError::db_error)?;

    let all_terminal = tickets.iter().all(|t| t.status.is_terminal());
    let any_refunded = tickets.iter().any(|t| t.status == TicketStatus::Refunded);

    let new_status = if all_terminal {
        if any_refunded {
            OrderStatus::Refunded
        } else {
            OrderStatus::Cancelled
        }
    } else if any_refunded {
        OrderStatus::PartiallyRefunded
    } else {
        order.status.clone()
    };

    let dissolved = all_terminal && new_status != order.status;
    if new_status == order.status {
        return Ok(order);
    }

    let order_id = order.id;
    let mut active: order::ActiveModel = order.into();
    active.status = Set(new_status.clone());
    active.updated_at = Set(Some(now));
    let order = active.update(txn).await.map_err(ServiceError::db_error)?;

    // A dissolved order gives its coupon use back; a partial refund does not.
    if dissolved {
        coupons::reverse_for_order(txn, order_id).await?;
    }

    Ok(order)
}

/// Rejects the operation if any of the seats' trips has already run.
async fn reject_completed_trips(
    txn: &DatabaseTransaction,
    seat_ids: &[Uuid],
) -> Result<(), ServiceError> {
    let seat_rows = SeatEntity::find()
        .filter(seat::Column::Id.is_in(seat_ids.to_vec()))
        .all(txn)
        .await
        .map_err(ServiceError::db_error)?;

    let trip_ids: BTreeSet<Uuid> = seat_rows.iter().map(|s| s.trip_id).collect();
    let trips = TripEntity::find()
        .filter(trip::Column::Id.is_in(trip_ids.into_iter().collect::<Vec<_>>()))
        .all(txn)
        .await
        .map_err(ServiceError::db_error)?;

    for t in trips {
        if t.status == TripStatus::Completed {
            return Err(ServiceError::InvalidState(format!(
                "Trip {} is already completed; its tickets can no longer be cancelled",
                t.id
            )));
        }
    }
    Ok(())
}

/// Service coordinating refunds and voids.
#[derive(Clone)]
pub struct RefundService {
    db_pool: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Option<Arc<EventSender>>,
}

impl RefundService {
    pub fn new(
        db_pool: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            gateway,
            event_sender,
        }
    }

    /// Refunds a set of Booked tickets on one order: gateway refund, tickets
    /// -> Refunded, seats -> Available, order status recomputed, all in
    /// one transaction.
    #[instrument(skip(self), fields(order_id = %order_id, tickets = ticket_ids.len()))]
    pub async fn refund_tickets(
        &self,
        order_id: Uuid,
        ticket_ids: &[Uuid],
        reason: &str,
    ) -> Result<order::Model, ServiceError> {
        if ticket_ids.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one ticket is required".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = OrderEntity::find_by_id(order_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let all_tickets = TicketEntity::find()
            .filter(ticket::Column::OrderId.eq(order_id))
            .order_by_asc(ticket::Column::Id)
            .lock_exclusive()
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let mut requested_ids: Vec<Uuid> = ticket_ids.to_vec();
        requested_ids.sort();
        requested_ids.dedup();

        let mut targets = Vec::with_capacity(requested_ids.len());
        for requested in &requested_ids {
            let t = all_tickets
                .iter()
                .find(|t| t.id == *requested)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Ticket {} is not part of order {}",
                        requested, order_id
                    ))
                })?;
            if t.status != TicketStatus::Booked {
                return Err(ServiceError::InvalidState(format!(
                    "Ticket {} is not booked and cannot be refunded",
                    t.id
                )));
            }
            targets.push(t.clone());
        }

        let seat_ids: Vec<Uuid> = targets.iter().map(|t| t.seat_id).collect();
        reject_completed_trips(&txn, &seat_ids).await?;

        let refund_amount: Decimal = targets.iter().map(|t| t.final_price).sum();

        let payment = payments::find_latest_for_order_locked(&txn, order_id).await?;
        if refund_amount > Decimal::ZERO {
            if let Some(p) = payment.as_ref().filter(|p| p.status == PaymentStatus::Completed) {
                let transaction_ref = p.transaction_ref.as_deref().ok_or_else(|| {
                    ServiceError::InvalidState(format!(
                        "Payment for order {} has no gateway reference",
                        order_id
                    ))
                })?;
                // A gateway failure here aborts the whole operation.
                self.gateway
                    .refund(transaction_ref, refund_amount, reason)
                    .await?;
            }
        }

        for t in &targets {
            let mut active: ticket::ActiveModel = t.clone().into();
            active.status = Set(TicketStatus::Refunded);
            active.updated_at = Set(Some(now));
            active.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        let released = seats::release(&txn, &seat_ids).await?;

        let order = recompute_order_status(&txn, order, now).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit refund transaction");
            ServiceError::DatabaseError(e)
        })?;

        TICKET_REFUNDS.inc_by(targets.len() as u64);
        info!(
            order_id = %order_id,
            refunded = targets.len(),
            amount = %refund_amount,
            status = ?order.status,
            "Tickets refunded"
        );

        self.emit_refunded(&order, &targets, refund_amount, &released)
            .await;

        Ok(order)
    }

    /// Cancels tickets: a thin policy router. Paid orders take the refund
    /// path; unpaid orders get a void with no gateway involvement.
    #[instrument(skip(self), fields(order_id = %order_id, tickets = ticket_ids.len()))]
    pub async fn cancel_tickets(
        &self,
        order_id: Uuid,
        ticket_ids: &[Uuid],
    ) -> Result<order::Model, ServiceError> {
        if ticket_ids.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one ticket is required".to_string(),
            ));
        }

        let db = &*self.db_pool;

        let paid = payments::find_latest_for_order(db, order_id)
            .await?
            .map(|p| p.status == PaymentStatus::Completed)
            .unwrap_or(false);

        if paid {
            return self.refund_tickets(order_id, ticket_ids, "cancellation").await;
        }

        self.void_tickets(order_id, ticket_ids).await
    }

    /// Voids Pending tickets on a never-paid order inside its own
    /// transaction: tickets → Cancelled, seats → Available, no gateway call.
    async fn void_tickets(
        &self,
        order_id: Uuid,
        ticket_ids: &[Uuid],
    ) -> Result<order::Model, ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = OrderEntity::find_by_id(order_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let all_tickets = TicketEntity::find()
            .filter(ticket::Column::OrderId.eq(order_id))
            .order_by_asc(ticket::Column::Id)
            .lock_exclusive()
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let mut requested_ids: Vec<Uuid> = ticket_ids.to_vec();
        requested_ids.sort();
        requested_ids.dedup();

        let mut targets = Vec::with_capacity(requested_ids.len());
        for requested in &requested_ids {
            let t = all_tickets
                .iter()
                .find(|t| t.id == *requested)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Ticket {} is not part of order {}",
                        requested, order_id
                    ))
                })?;
            if t.status != TicketStatus::Pending {
                return Err(ServiceError::InvalidState(format!(
                    "Ticket {} is not pending and cannot be voided",
                    t.id
                )));
            }
            targets.push(t.clone());
        }

        let seat_ids: Vec<Uuid> = targets.iter().map(|t| t.seat_id).collect();
        reject_completed_trips(&txn, &seat_ids).await?;

        for t in &targets {
            let mut active: ticket::ActiveModel = t.clone().into();
            active.status = Set(TicketStatus::Cancelled);
            active.updated_at = Set(Some(now));
            active.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        let released = seats::release(&txn, &seat_ids).await?;

        let order = recompute_order_status(&txn, order, now).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit void transaction");
            ServiceError::DatabaseError(e)
        })?;

        TICKET_VOIDS.inc_by(targets.len() as u64);
        info!(
            order_id = %order_id,
            voided = targets.len(),
            status = ?order.status,
            "Tickets voided"
        );

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::TicketsVoided {
                    order_id,
                    order_number: order.order_number.clone(),
                    recipient: recipient_for(&order),
                    ticket_ids: targets.iter().map(|t| t.id).collect(),
                })
                .await
            {
                warn!(order_id = %order_id, error = %e, "Failed to send void event");
            }
            if let Some(trip_id) = released.first().map(|s| s.trip_id) {
                if let Err(e) = sender
                    .send(Event::SeatsUpdated {
                        trip_id,
                        seats: seats::to_updates(&released),
                    })
                    .await
                {
                    warn!(trip_id = %trip_id, error = %e, "Failed to send seat update event");
                }
            }
        }

        Ok(order)
    }

    async fn emit_refunded(
        &self,
        order: &order::Model,
        targets: &[ticket::Model],
        refund_amount: Decimal,
        released: &[seat::Model],
    ) {
        let Some(sender) = &self.event_sender else {
            return;
        };

        if let Err(e) = sender
            .send(Event::TicketsRefunded {
                order_id: order.id,
                order_number: order.order_number.clone(),
                recipient: recipient_for(order),
                ticket_ids: targets.iter().map(|t| t.id).collect(),
                refund_amount,
            })
            .await
        {
            warn!(order_id = %order.id, error = %e, "Failed to send refund event");
        }

        if let Some(trip_id) = released.first().map(|s| s.trip_id) {
            if let Err(e) = sender
                .send(Event::SeatsUpdated {
                    trip_id,
                    seats: seats::to_updates(released),
                })
                .await
            {
                warn!(trip_id = %trip_id, error = %e, "Failed to send seat update event");
            }
        }
    }
}
