//! Tests for the refund/void orchestration: partial and full refunds, coupon
//! reversal, the policy router, and refund atomicity with the gateway.

mod common;

use assert_matches::assert_matches;
use common::TestCore;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use uuid::Uuid;

use busline_api::entities::coupon::{self, CouponType};
use busline_api::entities::coupon_usage;
use busline_api::entities::order::OrderStatus;
use busline_api::entities::seat::SeatStatus;
use busline_api::entities::ticket::TicketStatus;
use busline_api::errors::ServiceError;

/// Books `seat_count` seats as a paid, confirmed order and returns its id.
async fn paid_order(core: &TestCore, trip_id: Uuid, seat_ids: Vec<Uuid>) -> Uuid {
    let confirmation = core
        .booking
        .create_order(core.guest_request(trip_id, seat_ids))
        .await
        .expect("booking");
    core.booking
        .confirm_payment(confirmation.order.id, "txn-paid", None)
        .await
        .expect("confirm");
    confirmation.order.id
}

#[tokio::test]
async fn partial_then_full_refund_walks_the_order_status() {
    let core = TestCore::new().await;
    let route = core.seed_route(dec!(100000), dec!(200), &[]).await;
    let trip = core.seed_trip(route.id, dec!(0), 2).await;
    let seats = core.trip_seats(trip.id).await;

    let order_id = paid_order(&core, trip.id, vec![seats[0].id, seats[1].id]).await;
    let details = core.orders.get_order(order_id).await.unwrap();
    let (first, second) = (details.tickets[0].clone(), details.tickets[1].clone());

    // Refund one of two tickets.
    let order = core
        .refunds
        .refund_tickets(order_id, &[first.id], "passenger request")
        .await
        .expect("partial refund");

    assert_eq!(order.status, OrderStatus::PartiallyRefunded);
    let details = core.orders.get_order(order_id).await.unwrap();
    let refreshed_first = details.tickets.iter().find(|t| t.id == first.id).unwrap();
    assert_eq!(refreshed_first.status, TicketStatus::Refunded);

    let seats_after = core.trip_seats(trip.id).await;
    assert_eq!(
        seats_after
            .iter()
            .find(|s| s.id == first.seat_id)
            .unwrap()
            .status,
        SeatStatus::Available
    );
    assert_eq!(
        seats_after
            .iter()
            .find(|s| s.id == second.seat_id)
            .unwrap()
            .status,
        SeatStatus::Booked
    );

    // Gateway saw exactly the first ticket's fare.
    assert_eq!(core.gateway.refunded_total(), dec!(100000));

    // Refund the remaining ticket: order dissolves.
    let order = core
        .refunds
        .refund_tickets(order_id, &[second.id], "passenger request")
        .await
        .expect("full refund");
    assert_eq!(order.status, OrderStatus::Refunded);

    // Refund conservation: total refunded equals total ticket face value.
    assert_eq!(core.gateway.refunded_total(), dec!(200000));
}

#[tokio::test]
async fn full_refund_reverses_the_coupon_usage() {
    let core = TestCore::new().await;
    let route = core.seed_route(dec!(100000), dec!(200), &[]).await;
    let trip = core.seed_trip(route.id, dec!(0), 2).await;
    let seats = core.trip_seats(trip.id).await;
    let coupon = core
        .seed_coupon("COMEBACK", CouponType::Fixed, dec!(30000), 5)
        .await;

    let mut request = core.guest_request(trip.id, vec![seats[0].id, seats[1].id]);
    request.coupon_code = Some("COMEBACK".to_string());
    let confirmation = core.booking.create_order(request).await.expect("booking");
    core.booking
        .confirm_payment(confirmation.order.id, "txn-coupon", None)
        .await
        .expect("confirm");

    let order_id = confirmation.order.id;
    let ticket_ids: Vec<Uuid> = confirmation.tickets.iter().map(|t| t.id).collect();

    // Partial refund leaves the coupon consumed.
    core.refunds
        .refund_tickets(order_id, &ticket_ids[..1], "request")
        .await
        .expect("partial");
    let coupon_mid = coupon::Entity::find_by_id(coupon.id)
        .one(&*core.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(coupon_mid.current_usage_count, 1);

    // Full refund dissolves the order and gives the use back.
    core.refunds
        .refund_tickets(order_id, &ticket_ids[1..], "request")
        .await
        .expect("full");
    let coupon_after = coupon::Entity::find_by_id(coupon.id)
        .one(&*core.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(coupon_after.current_usage_count, 0);

    let usages = coupon_usage::Entity::find().all(&*core.db).await.unwrap();
    assert!(usages.is_empty());
}

#[tokio::test]
async fn refund_rejects_foreign_and_unbooked_tickets() {
    let core = TestCore::new().await;
    let route = core.seed_route(dec!(100000), dec!(200), &[]).await;
    let trip = core.seed_trip(route.id, dec!(0), 3).await;
    let seats = core.trip_seats(trip.id).await;

    // A pending (unpaid, unconfirmed) order: tickets are not Booked.
    let pending = core
        .booking
        .create_order(core.guest_request(trip.id, vec![seats[0].id]))
        .await
        .expect("pending booking");

    assert_matches!(
        core.refunds
            .refund_tickets(pending.order.id, &[pending.tickets[0].id], "req")
            .await
            .unwrap_err(),
        ServiceError::InvalidState(_)
    );

    // A ticket id from a different order.
    let paid = paid_order(&core, trip.id, vec![seats[1].id]).await;
    assert_matches!(
        core.refunds
            .refund_tickets(paid, &[pending.tickets[0].id], "req")
            .await
            .unwrap_err(),
        ServiceError::NotFound(_)
    );

    // Unknown order.
    assert_matches!(
        core.refunds
            .refund_tickets(Uuid::new_v4(), &[pending.tickets[0].id], "req")
            .await
            .unwrap_err(),
        ServiceError::NotFound(_)
    );
}

#[tokio::test]
async fn terminal_tickets_accept_no_further_transitions() {
    let core = TestCore::new().await;
    let route = core.seed_route(dec!(100000), dec!(200), &[]).await;
    let trip = core.seed_trip(route.id, dec!(0), 1).await;
    let seats = core.trip_seats(trip.id).await;

    let order_id = paid_order(&core, trip.id, vec![seats[0].id]).await;
    let details = core.orders.get_order(order_id).await.unwrap();
    let ticket_id = details.tickets[0].id;

    core.refunds
        .refund_tickets(order_id, &[ticket_id], "request")
        .await
        .expect("refund");

    // Refunding a refunded ticket is rejected.
    assert_matches!(
        core.refunds
            .refund_tickets(order_id, &[ticket_id], "again")
            .await
            .unwrap_err(),
        ServiceError::InvalidState(_)
    );

    // And so is cancelling it (routes to the void path: not Pending).
    assert_matches!(
        core.refunds
            .cancel_tickets(order_id, &[ticket_id])
            .await
            .unwrap_err(),
        ServiceError::InvalidState(_)
    );

    // Exactly one gateway refund happened.
    assert_eq!(core.gateway.refunds.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn cancelling_an_unpaid_order_voids_without_the_gateway() {
    let core = TestCore::new().await;
    let route = core.seed_route(dec!(100000), dec!(200), &[]).await;
    let trip = core.seed_trip(route.id, dec!(0), 2).await;
    let seats = core.trip_seats(trip.id).await;

    let confirmation = core
        .booking
        .create_order(core.guest_request(trip.id, vec![seats[0].id, seats[1].id]))
        .await
        .expect("booking");
    let ticket_ids: Vec<Uuid> = confirmation.tickets.iter().map(|t| t.id).collect();

    let order = core
        .refunds
        .cancel_tickets(confirmation.order.id, &ticket_ids)
        .await
        .expect("void");

    // No money ever moved, so the order is Cancelled, not Refunded.
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert!(core.gateway.refunds.lock().unwrap().is_empty());

    let details = core.orders.get_order(order.id).await.unwrap();
    assert!(details
        .tickets
        .iter()
        .all(|t| t.status == TicketStatus::Cancelled));

    let seats_after = core.trip_seats(trip.id).await;
    assert!(seats_after
        .iter()
        .all(|s| s.status == SeatStatus::Available && s.reserved_by.is_none()));
}

#[tokio::test]
async fn cancelling_a_paid_order_routes_to_refund() {
    let core = TestCore::new().await;
    let route = core.seed_route(dec!(100000), dec!(200), &[]).await;
    let trip = core.seed_trip(route.id, dec!(0), 1).await;
    let seats = core.trip_seats(trip.id).await;

    let order_id = paid_order(&core, trip.id, vec![seats[0].id]).await;
    let details = core.orders.get_order(order_id).await.unwrap();

    let order = core
        .refunds
        .cancel_tickets(order_id, &[details.tickets[0].id])
        .await
        .expect("cancel routes to refund");

    assert_eq!(order.status, OrderStatus::Refunded);
    assert_eq!(core.gateway.refunded_total(), dec!(100000));
}

#[tokio::test]
async fn gateway_refund_failure_aborts_the_whole_operation() {
    let core = TestCore::new().await;
    let route = core.seed_route(dec!(100000), dec!(200), &[]).await;
    let trip = core.seed_trip(route.id, dec!(0), 1).await;
    let seats = core.trip_seats(trip.id).await;

    let order_id = paid_order(&core, trip.id, vec![seats[0].id]).await;
    let details = core.orders.get_order(order_id).await.unwrap();

    core.gateway.fail_next_refund(true);

    assert_matches!(
        core.refunds
            .refund_tickets(order_id, &[details.tickets[0].id], "request")
            .await
            .unwrap_err(),
        ServiceError::Gateway(_)
    );

    // Nothing moved: ticket still Booked, seat still Booked, order Completed.
    let details = core.orders.get_order(order_id).await.unwrap();
    assert_eq!(details.order.status, OrderStatus::Completed);
    assert_eq!(details.tickets[0].status, TicketStatus::Booked);
    let seats_after = core.trip_seats(trip.id).await;
    assert_eq!(seats_after[0].status, SeatStatus::Booked);
}

#[tokio::test]
async fn completed_trips_refuse_cancellation() {
    let core = TestCore::new().await;
    let route = core.seed_route(dec!(100000), dec!(200), &[]).await;
    let trip = core.seed_trip(route.id, dec!(0), 1).await;
    let seats = core.trip_seats(trip.id).await;

    let order_id = paid_order(&core, trip.id, vec![seats[0].id]).await;
    let details = core.orders.get_order(order_id).await.unwrap();

    core.trips.complete_trip(trip.id).await.expect("complete");

    assert_matches!(
        core.refunds
            .refund_tickets(order_id, &[details.tickets[0].id], "too late")
            .await
            .unwrap_err(),
        ServiceError::InvalidState(_)
    );
    assert_matches!(
        core.refunds
            .cancel_tickets(order_id, &[details.tickets[0].id])
            .await
            .unwrap_err(),
        ServiceError::InvalidState(_)
    );
}

#[tokio::test]
async fn order_listing_finds_guest_and_user_orders() {
    let core = TestCore::new().await;
    let route = core.seed_route(dec!(100000), dec!(200), &[]).await;
    let trip = core.seed_trip(route.id, dec!(0), 4).await;
    let seats = core.trip_seats(trip.id).await;
    let user = Uuid::new_v4();

    core.booking
        .create_order(core.guest_request(trip.id, vec![seats[0].id]))
        .await
        .expect("guest booking");
    core.booking
        .create_order(core.user_request(trip.id, vec![seats[1].id], user))
        .await
        .expect("user booking");

    let (guest_orders, guest_total) = core
        .orders
        .list_orders_for_guest("rider@example.com", 1, 20)
        .await
        .unwrap();
    assert_eq!(guest_total, 1);
    assert_eq!(guest_orders[0].guest_email.as_deref(), Some("rider@example.com"));

    let (user_orders, user_total) = core
        .orders
        .list_orders_for_user(user, 1, 20)
        .await
        .unwrap();
    assert_eq!(user_total, 1);
    assert_eq!(user_orders[0].user_id, Some(user));
}
