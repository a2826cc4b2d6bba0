//! Booking orchestration: the atomic create-order path and the payment
//! confirmation that books reserved seats.
//!
//! Everything from seat validation to payment initiation happens inside one
//! transaction. A failure at any step, including a gateway rejection, rolls
//! back the whole scope: no partial seat reservation, no orphaned tickets, no
//! coupon counter drift. Notifications and realtime fan-out run post-commit
//! only.

use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::IntCounter;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::order::{self, Entity as OrderEntity, OrderStatus};
use crate::entities::payment;
use crate::entities::ticket::{self, Entity as TicketEntity, TicketStatus};
use crate::entities::trip::{Entity as TripEntity, TripStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender, Recipient};
use crate::services::payments::{self, InitiatePaymentRequest, PaymentGateway};
use crate::services::{coupons, seats};

lazy_static! {
    static ref ORDER_CREATIONS: IntCounter =
        IntCounter::new("order_creations_total", "Total number of orders created")
            .expect("metric can be created");
    static ref ORDER_CREATION_FAILURES: IntCounter = IntCounter::new(
        "order_creation_failures_total",
        "Total number of failed order creations"
    )
    .expect("metric can be created");
    static ref PAYMENT_CONFIRMATIONS: IntCounter = IntCounter::new(
        "payment_confirmations_total",
        "Total number of confirmed payments"
    )
    .expect("metric can be created");
}

/// Request to create one order over a set of seats on one trip.
///
/// The purchaser is either an authenticated user (`user_id`) or a guest with
/// at least an email address.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub trip_id: Uuid,
    #[validate(length(min = 1, message = "At least one seat is required"))]
    pub seat_ids: Vec<Uuid>,
    pub user_id: Option<Uuid>,
    pub guest_name: Option<String>,
    #[validate(email(message = "Guest email must be a valid email address"))]
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,
    #[validate(length(min = 1, message = "Payment method is required"))]
    pub payment_method_code: String,
    pub coupon_code: Option<String>,
}

impl CreateOrderRequest {
    fn purchaser_identifier(&self) -> Result<String, ServiceError> {
        if let Some(user_id) = self.user_id {
            return Ok(user_id.to_string());
        }
        self.guest_email.clone().ok_or_else(|| {
            ServiceError::ValidationError(
                "Purchaser must be an authenticated user or a guest with an email".to_string(),
            )
        })
    }
}

/// Result of a successful booking: the order, its tickets, the pending
/// payment record and where to send the purchaser to pay.
#[derive(Debug, Serialize)]
pub struct BookingConfirmation {
    pub order: order::Model,
    pub tickets: Vec<ticket::Model>,
    pub seats: Vec<crate::entities::seat::Model>,
    pub payment: payment::Model,
    pub payment_url: String,
}

/// Generates a human-facing booking reference like `BL-7K2M9QDX`.
fn generate_order_number() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("BL-{}", suffix)
}

fn recipient_for(order: &order::Model) -> Recipient {
    match order.user_id {
        Some(user_id) => Recipient::User(user_id),
        None => Recipient::Guest(order.guest_email.clone().unwrap_or_default()),
    }
}

/// Service coordinating the booking transaction.
#[derive(Clone)]
pub struct BookingService {
    db_pool: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Option<Arc<EventSender>>,
    reservation_ttl: Duration,
    payment_expiry: Duration,
}

impl BookingService {
    pub fn new(
        db_pool: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<Arc<EventSender>>,
        reservation_ttl: Duration,
        payment_expiry: Duration,
    ) -> Self {
        Self {
            db_pool,
            gateway,
            event_sender,
            reservation_ttl,
            payment_expiry,
        }
    }

    /// Creates an order: locks and validates the seats, prices them, applies
    /// an optional coupon, reserves the seats and initiates payment, all in
    /// one transaction.
    #[instrument(skip(self, request), fields(trip_id = %request.trip_id, seats = request.seat_ids.len()))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<BookingConfirmation, ServiceError> {
        request.validate().map_err(|e| {
            ORDER_CREATION_FAILURES.inc();
            ServiceError::ValidationError(e.to_string())
        })?;
        let reserved_by = request.purchaser_identifier().map_err(|e| {
            ORDER_CREATION_FAILURES.inc();
            e
        })?;

        let result = self.create_order_inner(&request, &reserved_by).await;

        match &result {
            Ok(confirmation) => {
                ORDER_CREATIONS.inc();
                info!(
                    order_id = %confirmation.order.id,
                    order_number = %confirmation.order.order_number,
                    total = %confirmation.order.total_final_price,
                    "Order created"
                );
                self.emit_created(confirmation).await;
            }
            Err(e) => {
                ORDER_CREATION_FAILURES.inc();
                warn!(trip_id = %request.trip_id, error = %e, "Order creation failed");
            }
        }

        result
    }

    async fn create_order_inner(
        &self,
        request: &CreateOrderRequest,
        reserved_by: &str,
    ) -> Result<BookingConfirmation, ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start booking transaction");
            ServiceError::DatabaseError(e)
        })?;

        // Expired-trip check under the trip row lock.
        let trip = TripEntity::find_by_id(request.trip_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Trip {} not found", request.trip_id))
            })?;

        if trip.status != TripStatus::Scheduled || trip.departure_at <= now {
            return Err(ServiceError::Expired(format!(
                "Trip {} is no longer open for booking",
                trip.id
            )));
        }

        let locked_seats = seats::validate_and_lock_seats(&txn, trip.id, &request.seat_ids).await?;

        // Trip price is authoritative for booking; segment quoting is a
        // read-side concern.
        let seat_price = trip.price;
        let total_base_price: Decimal = seat_price * Decimal::from(locked_seats.len() as u64);

        let order_id = Uuid::new_v4();
        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(generate_order_number()),
            user_id: Set(request.user_id),
            guest_name: Set(request.guest_name.clone()),
            guest_email: Set(request.guest_email.clone()),
            guest_phone: Set(request.guest_phone.clone()),
            total_base_price: Set(total_base_price),
            total_discount: Set(Decimal::ZERO),
            total_final_price: Set(total_base_price),
            status: Set(OrderStatus::Pending),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };
        let mut order = order_model.insert(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to insert order");
            ServiceError::db_error(e)
        })?;

        // Coupon redemption mutates the counter inside this same scope so a
        // rollback also unwinds the usage.
        let total_discount = match &request.coupon_code {
            Some(code) => {
                let evaluation = coupons::redeem(
                    &txn,
                    code,
                    total_base_price,
                    request.user_id,
                    order_id,
                    now,
                )
                .await?;
                evaluation.discount
            }
            None => Decimal::ZERO,
        };

        let total_final_price = (total_base_price - total_discount).max(Decimal::ZERO);
        if total_discount > Decimal::ZERO {
            let mut active: order::ActiveModel = order.into();
            active.total_discount = Set(total_discount);
            active.total_final_price = Set(total_final_price);
            order = active.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        let mut tickets = Vec::with_capacity(locked_seats.len());
        for seat in &locked_seats {
            let ticket_model = ticket::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                seat_id: Set(seat.id),
                base_price: Set(seat_price),
                // Discount is tracked at order level, not per ticket.
                final_price: Set(seat_price),
                status: Set(TicketStatus::Pending),
                created_at: Set(now),
                updated_at: Set(Some(now)),
            };
            tickets.push(
                ticket_model
                    .insert(&txn)
                    .await
                    .map_err(ServiceError::db_error)?,
            );
        }

        let reserved_until = now + chrono::Duration::from_std(self.reservation_ttl)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        let reserved_seats =
            seats::reserve(&txn, locked_seats, reserved_by, reserved_until).await?;

        // Gateway initiation runs inside the scope: if the gateway rejects,
        // the reservation above never becomes visible.
        let initiation = self
            .gateway
            .initiate(InitiatePaymentRequest {
                order_id,
                method_code: request.payment_method_code.clone(),
                amount: total_final_price,
                metadata: serde_json::json!({
                    "order_number": order.order_number,
                    "trip_id": trip.id,
                }),
            })
            .await?;

        let payment_expires = now + chrono::Duration::from_std(self.payment_expiry)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        let payment_record = payments::create_pending(
            &txn,
            order_id,
            total_final_price,
            &request.payment_method_code,
            &initiation,
            payment_expires,
        )
        .await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit booking transaction");
            ServiceError::DatabaseError(e)
        })?;

        Ok(BookingConfirmation {
            payment_url: initiation.payment_url,
            order,
            tickets,
            seats: reserved_seats,
            payment: payment_record,
        })
    }

    /// Confirms a completed payment: payment → Completed, tickets → Booked,
    /// seats → Booked, order → Completed, all in one transaction.
    ///
    /// Driven by the gateway's completion callback; the API layer verifies
    /// the webhook signature before calling in.
    #[instrument(skip(self, raw_gateway_payload), fields(order_id = %order_id))]
    pub async fn confirm_payment(
        &self,
        order_id: Uuid,
        transaction_ref: &str,
        raw_gateway_payload: Option<&str>,
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

        let payment = payments::find_latest_for_order_locked(&txn, order_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("No payment found for order {}", order_id))
            })?;

        if !payment.status.is_confirmable() {
            return Err(ServiceError::InvalidState(format!(
                "Payment for order {} cannot be confirmed from its current state",
                order_id
            )));
        }

        let tickets = TicketEntity::find()
            .filter(ticket::Column::OrderId.eq(order_id))
            .order_by_asc(ticket::Column::Id)
            .lock_exclusive()
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let mut seat_ids = Vec::with_capacity(tickets.len());
        for t in &tickets {
            if t.status != TicketStatus::Pending {
                return Err(ServiceError::InvalidState(format!(
                    "Ticket {} is not pending payment",
                    t.id
                )));
            }
            seat_ids.push(t.seat_id);
        }

        for t in tickets {
            let mut active: ticket::ActiveModel = t.into();
            active.status = Set(TicketStatus::Booked);
            active.updated_at = Set(Some(now));
            active.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        let booked_seats = seats::mark_booked(&txn, &seat_ids).await?;

        let mut active_payment: payment::ActiveModel = payment.into();
        active_payment.status = Set(payment::PaymentStatus::Completed);
        active_payment.transaction_ref = Set(Some(transaction_ref.to_string()));
        active_payment.gateway_response =
            Set(raw_gateway_payload.map(payments::encode_gateway_blob));
        active_payment.updated_at = Set(Some(now));
        active_payment
            .update(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let mut active_order: order::ActiveModel = order.into();
        active_order.status = Set(OrderStatus::Completed);
        active_order.updated_at = Set(Some(now));
        let order = active_order
            .update(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        PAYMENT_CONFIRMATIONS.inc();
        info!(order_id = %order_id, "Payment confirmed, seats booked");

        if let Some(sender) = &self.event_sender {
            let trip_id = booked_seats.first().map(|s| s.trip_id);
            if let Err(e) = sender
                .send(Event::PaymentConfirmed {
                    order_id,
                    order_number: order.order_number.clone(),
                    recipient: recipient_for(&order),
                })
                .await
            {
                warn!(order_id = %order_id, error = %e, "Failed to send payment confirmed event");
            }
            if let Some(trip_id) = trip_id {
                if let Err(e) = sender
                    .send(Event::SeatsUpdated {
                        trip_id,
                        seats: seats::to_updates(&booked_seats),
                    })
                    .await
                {
                    warn!(trip_id = %trip_id, error = %e, "Failed to send seat update event");
                }
            }
        }

        Ok(order)
    }

    async fn emit_created(&self, confirmation: &BookingConfirmation) {
        let Some(sender) = &self.event_sender else {
            return;
        };

        if let Err(e) = sender
            .send(Event::OrderCreated {
                order_id: confirmation.order.id,
                order_number: confirmation.order.order_number.clone(),
                recipient: recipient_for(&confirmation.order),
                payment_url: confirmation.payment_url.clone(),
            })
            .await
        {
            warn!(order_id = %confirmation.order.id, error = %e, "Failed to send order created event");
        }

        if let Some(trip_id) = confirmation.seats.first().map(|s| s.trip_id) {
            if let Err(e) = sender
                .send(Event::SeatsUpdated {
                    trip_id,
                    seats: seats::to_updates(&confirmation.seats),
                })
                .await
            {
                warn!(trip_id = %trip_id, error = %e, "Failed to send seat update event");
            }
        }
    }
}
