//! Trip lifecycle: creation with bulk seat generation, completion, and the
//! cancellation cascade.
//!
//! Cancelling a trip unwinds every order touching it (refunds for paid
//! Booked tickets, voids for Pending ones) in a single transaction.
//! All-or-nothing at the trip level: one failed refund aborts the whole
//! cascade, so a cancelled trip can never leave some orders refunded and
//! others not.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::order::{self, Entity as OrderEntity};
use crate::entities::payment::PaymentStatus;
use crate::entities::route::Entity as RouteEntity;
use crate::entities::seat::{self, Entity as SeatEntity};
use crate::entities::ticket::{self, Entity as TicketEntity, TicketStatus};
use crate::entities::trip::{self, Entity as TripEntity, TripStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender, Recipient};
use crate::services::payments::{self, PaymentGateway};
use crate::services::refunds::recompute_order_status;
use crate::services::seats::{self, SeatLayout};

/// Request to schedule a trip. The trip price is fixed here as the route
/// base price plus the vehicle-type price.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTripRequest {
    pub route_id: Uuid,
    #[validate(length(min = 1, message = "Vehicle name is required"))]
    pub vehicle_name: String,
    pub vehicle_price: Decimal,
    pub departure_at: DateTime<Utc>,
    pub arrival_at: Option<DateTime<Utc>>,
    pub layout: SeatLayout,
}

/// Per-order outcome of a cascade, kept for post-commit notification.
struct CascadeOutcome {
    order: order::Model,
    refunded: Vec<Uuid>,
    voided: Vec<Uuid>,
    refund_amount: Decimal,
}

fn recipient_for(order: &order::Model) -> Recipient {
    match order.user_id {
        Some(user_id) => Recipient::User(user_id),
        None => Recipient::Guest(order.guest_email.clone().unwrap_or_default()),
    }
}

/// Service owning trip state transitions.
#[derive(Clone)]
pub struct TripService {
    db_pool: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Option<Arc<EventSender>>,
}

impl TripService {
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

    /// Creates a trip and its seats from a layout template, in one
    /// transaction.
    #[instrument(skip(self, request), fields(route_id = %request.route_id))]
    pub async fn create_trip(
        &self,
        request: CreateTripRequest,
    ) -> Result<trip::Model, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let now = Utc::now();
        if request.departure_at <= now {
            return Err(ServiceError::ValidationError(
                "Departure must be in the future".to_string(),
            ));
        }
        if request.layout.seat_count() == 0 {
            return Err(ServiceError::ValidationError(
                "Seat layout produces no seats".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let route = RouteEntity::find_by_id(request.route_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Route {} not found", request.route_id))
            })?;

        let trip_id = Uuid::new_v4();
        let model = trip::ActiveModel {
            id: Set(trip_id),
            route_id: Set(route.id),
            vehicle_name: Set(request.vehicle_name.clone()),
            price: Set(route.base_price + request.vehicle_price),
            departure_at: Set(request.departure_at),
            arrival_at: Set(request.arrival_at),
            status: Set(TripStatus::Scheduled),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };
        let trip = model.insert(&txn).await.map_err(|e| {
            error!(error = %e, trip_id = %trip_id, "Failed to insert trip");
            ServiceError::db_error(e)
        })?;

        let seat_count = seats::create_for_trip(&txn, trip_id, &request.layout).await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(trip_id = %trip_id, seats = seat_count, price = %trip.price, "Trip created");
        Ok(trip)
    }

    /// Marks a trip as completed after it has run. Tickets on a completed
    /// trip can no longer be cancelled or refunded.
    #[instrument(skip(self), fields(trip_id = %trip_id))]
    pub async fn complete_trip(&self, trip_id: Uuid) -> Result<trip::Model, ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let trip = TripEntity::find_by_id(trip_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Trip {} not found", trip_id)))?;

        if trip.status.is_terminal() {
            return Err(ServiceError::InvalidState(format!(
                "Trip {} is already {}",
                trip_id, trip.status
            )));
        }

        let mut active: trip::ActiveModel = trip.into();
        active.status = Set(TripStatus::Completed);
        active.updated_at = Set(Some(now));
        let trip = active.update(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(trip_id = %trip_id, "Trip completed");
        Ok(trip)
    }

    /// Cancels a trip and cascades refund/void over every order touching it.
    #[instrument(skip(self), fields(trip_id = %trip_id))]
    pub async fn cancel_trip(&self, trip_id: Uuid) -> Result<trip::Model, ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let trip = TripEntity::find_by_id(trip_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Trip {} not found", trip_id)))?;

        if trip.status.is_terminal() {
            return Err(ServiceError::InvalidState(format!(
                "Trip {} is already {}",
                trip_id, trip.status
            )));
        }

        let mut active: trip::ActiveModel = trip.into();
        active.status = Set(TripStatus::Cancelled);
        active.updated_at = Set(Some(now));
        let trip = active.update(&txn).await.map_err(ServiceError::db_error)?;

        let outcomes = self.cascade(&txn, trip_id, now).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, trip_id = %trip_id, "Failed to commit trip cancellation");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            trip_id = %trip_id,
            affected_orders = outcomes.len(),
            "Trip cancelled, cascade applied"
        );

        self.emit_cascade(&trip, &outcomes).await;

        Ok(trip)
    }

    /// Applies refund/void to every order with live tickets on the trip.
    /// Runs inside the cancellation transaction.
    async fn cascade(
        &self,
        txn: &DatabaseTransaction,
        trip_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<CascadeOutcome>, ServiceError> {
        let trip_seats = SeatEntity::find()
            .filter(seat::Column::TripId.eq(trip_id))
            .order_by_asc(seat::Column::Id)
            .lock_exclusive()
            .all(txn)
            .await
            .map_err(ServiceError::db_error)?;
        let seat_ids: Vec<Uuid> = trip_seats.iter().map(|s| s.id).collect();

        if seat_ids.is_empty() {
            return Ok(Vec::new());
        }

        let tickets = TicketEntity::find()
            .filter(ticket::Column::SeatId.is_in(seat_ids))
            .order_by_asc(ticket::Column::Id)
            .lock_exclusive()
            .all(txn)
            .await
            .map_err(ServiceError::db_error)?;

        // Group live tickets by order; terminal tickets are left untouched.
        let mut by_order: BTreeMap<Uuid, Vec<ticket::Model>> = BTreeMap::new();
        for t in tickets {
            if !t.status.is_terminal() {
                by_order.entry(t.order_id).or_default().push(t);
            }
        }

        let mut outcomes = Vec::with_capacity(by_order.len());

        for (order_id, group) in by_order {
            let order = OrderEntity::find_by_id(order_id)
                .lock_exclusive()
                .one(txn)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Order {} not found", order_id))
                })?;

            let payment = payments::find_latest_for_order_locked(txn, order_id).await?;
            let completed_payment = payment
                .as_ref()
                .filter(|p| p.status == PaymentStatus::Completed);
            let paid = completed_payment.is_some();

            let booked: Vec<&ticket::Model> = group
                .iter()
                .filter(|t| t.status == TicketStatus::Booked)
                .collect();

            let mut refund_amount = Decimal::ZERO;
            let mut refunded = Vec::new();
            let mut voided = Vec::new();

            if let Some(p) = completed_payment {
                if !booked.is_empty() {
                    refund_amount = booked.iter().map(|t| t.final_price).sum();
                    let transaction_ref = p.transaction_ref.as_deref().ok_or_else(|| {
                        ServiceError::InvalidState(format!(
                            "Payment for order {} has no gateway reference",
                            order_id
                        ))
                    })?;

                    // One failed refund aborts the entire cascade.
                    self.gateway
                        .refund(transaction_ref, refund_amount, "trip cancelled")
                        .await?;
                }
            }

            let mut released_seat_ids = Vec::with_capacity(group.len());
            for t in &group {
                let target_status = if paid && t.status == TicketStatus::Booked {
                    refunded.push(t.id);
                    TicketStatus::Refunded
                } else {
                    voided.push(t.id);
                    TicketStatus::Cancelled
                };

                let mut active: ticket::ActiveModel = t.clone().into();
                active.status = Set(target_status);
                active.updated_at = Set(Some(now));
                active.update(txn).await.map_err(ServiceError::db_error)?;

                released_seat_ids.push(t.seat_id);
            }

            seats::release(txn, &released_seat_ids).await?;

            let order = recompute_order_status(txn, order, now).await?;

            outcomes.push(CascadeOutcome {
                order,
                refunded,
                voided,
                refund_amount,
            });
        }

        Ok(outcomes)
    }

    async fn emit_cascade(&self, trip: &trip::Model, outcomes: &[CascadeOutcome]) {
        let Some(sender) = &self.event_sender else {
            return;
        };

        if let Err(e) = sender
            .send(Event::TripCancelled {
                trip_id: trip.id,
                affected_orders: outcomes.len(),
            })
            .await
        {
            warn!(trip_id = %trip.id, error = %e, "Failed to send trip cancelled event");
        }

        let sends = outcomes.iter().map(|outcome| {
            let event = if !outcome.refunded.is_empty() {
                Event::TicketsRefunded {
                    order_id: outcome.order.id,
                    order_number: outcome.order.order_number.clone(),
                    recipient: recipient_for(&outcome.order),
                    ticket_ids: outcome.refunded.clone(),
                    refund_amount: outcome.refund_amount,
                }
            } else {
                Event::TicketsVoided {
                    order_id: outcome.order.id,
                    order_number: outcome.order.order_number.clone(),
                    recipient: recipient_for(&outcome.order),
                    ticket_ids: outcome.voided.clone(),
                }
            };
            async move {
                if let Err(e) = sender.send(event).await {
                    warn!("Failed to send cascade event: {}", e);
                }
            }
        });
        join_all(sends).await;
    }
}
