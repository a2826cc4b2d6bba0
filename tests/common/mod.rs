#![allow(dead_code)]
//! Test harness: an application core backed by a throwaway SQLite database
//! with the real migrations applied, a recording mock payment gateway, and
//! the orchestrator services wired the way the process entry point wires
//! them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use tempfile::TempDir;
use uuid::Uuid;

use busline_api::db::{self, DbConfig, DbPool};
use busline_api::entities::coupon::{self, CouponType};
use busline_api::entities::seat;
use busline_api::entities::route;
use busline_api::entities::route_stop;
use busline_api::errors::ServiceError;
use busline_api::services::booking::{BookingService, CreateOrderRequest};
use busline_api::services::orders::OrderService;
use busline_api::services::payments::{
    InitiatePaymentRequest, PaymentGateway, PaymentInitiation, RefundAck,
};
use busline_api::services::pricing::PricingService;
use busline_api::services::refunds::RefundService;
use busline_api::services::seats::{FloorLayout, SeatLayout};
use busline_api::services::trips::{CreateTripRequest, TripService};

/// A recorded refund instruction: (transaction_ref, amount, reason).
pub type RecordedRefund = (String, Decimal, String);

/// In-memory gateway double that records every call and can be told to fail.
pub struct MockPaymentGateway {
    pub initiations: Mutex<Vec<InitiatePaymentRequest>>,
    pub refunds: Mutex<Vec<RecordedRefund>>,
    fail_initiate: AtomicBool,
    fail_refund: AtomicBool,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self {
            initiations: Mutex::new(Vec::new()),
            refunds: Mutex::new(Vec::new()),
            fail_initiate: AtomicBool::new(false),
            fail_refund: AtomicBool::new(false),
        }
    }

    pub fn fail_next_initiate(&self, fail: bool) {
        self.fail_initiate.store(fail, Ordering::SeqCst);
    }

    pub fn fail_next_refund(&self, fail: bool) {
        self.fail_refund.store(fail, Ordering::SeqCst);
    }

    pub fn refunded_total(&self) -> Decimal {
        self.refunds
            .lock()
            .unwrap()
            .iter()
            .map(|(_, amount, _)| *amount)
            .sum()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn initiate(
        &self,
        request: InitiatePaymentRequest,
    ) -> Result<PaymentInitiation, ServiceError> {
        if self.fail_initiate.load(Ordering::SeqCst) {
            return Err(ServiceError::Gateway("initiation declined".to_string()));
        }
        let order_id = request.order_id;
        self.initiations.lock().unwrap().push(request);
        Ok(PaymentInitiation {
            payment_url: format!("https://pay.test/checkout/{}", order_id),
            transaction_ref: format!("txn-{}", order_id),
        })
    }

    async fn refund(
        &self,
        transaction_ref: &str,
        amount: Decimal,
        reason: &str,
    ) -> Result<RefundAck, ServiceError> {
        if self.fail_refund.load(Ordering::SeqCst) {
            return Err(ServiceError::Gateway("refund declined".to_string()));
        }
        self.refunds.lock().unwrap().push((
            transaction_ref.to_string(),
            amount,
            reason.to_string(),
        ));
        Ok(RefundAck {
            reference: format!("rf-{}", transaction_ref),
        })
    }
}

pub struct TestCore {
    pub db: Arc<DbPool>,
    pub gateway: Arc<MockPaymentGateway>,
    pub booking: BookingService,
    pub refunds: RefundService,
    pub trips: TripService,
    pub orders: OrderService,
    pub pricing: PricingService,
    _tmp: TempDir,
}

impl TestCore {
    /// Fresh database, migrated, with services wired against the mock
    /// gateway and no event channel (events are exercised separately).
    pub async fn new() -> Self {
        let tmp = TempDir::new().expect("temp dir");
        let db_path = tmp.path().join("busline_test.db");
        let config = DbConfig {
            url: format!("sqlite://{}?mode=rwc", db_path.display()),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };

        let pool = db::establish_connection_with_config(&config)
            .await
            .expect("db connect");
        db::run_migrations(&pool).await.expect("migrations");

        let db = Arc::new(pool);
        let gateway = Arc::new(MockPaymentGateway::new());
        let gateway_dyn: Arc<dyn PaymentGateway> = gateway.clone();

        let booking = BookingService::new(
            db.clone(),
            gateway_dyn.clone(),
            None,
            Duration::from_secs(20 * 60),
            Duration::from_secs(30 * 60),
        );
        let refunds = RefundService::new(db.clone(), gateway_dyn.clone(), None);
        let trips = TripService::new(db.clone(), gateway_dyn.clone(), None);
        let orders = OrderService::new(db.clone());
        let pricing = PricingService::new(db.clone());

        Self {
            db,
            gateway,
            booking,
            refunds,
            trips,
            orders,
            pricing,
            _tmp: tmp,
        }
    }

    /// Seeds a route with evenly described stops.
    pub async fn seed_route(
        &self,
        base_price: Decimal,
        total_distance_km: Decimal,
        stops: &[(&str, Decimal)],
    ) -> route::Model {
        let now = Utc::now();
        let route = route::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Springfield - Shelbyville".to_string()),
            base_price: Set(base_price),
            total_distance_km: Set(total_distance_km),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&*self.db)
        .await
        .expect("insert route");

        for (seq, (name, km)) in stops.iter().enumerate() {
            route_stop::ActiveModel {
                id: Set(Uuid::new_v4()),
                route_id: Set(route.id),
                seq: Set(seq as i32),
                stop_name: Set((*name).to_string()),
                distance_from_start_km: Set(*km),
            }
            .insert(&*self.db)
            .await
            .expect("insert stop");
        }

        route
    }

    /// Creates a scheduled trip with a single-floor layout of `seats` seats.
    pub async fn seed_trip(
        &self,
        route_id: Uuid,
        vehicle_price: Decimal,
        seats: i32,
    ) -> busline_api::entities::trip::Model {
        self.trips
            .create_trip(CreateTripRequest {
                route_id,
                vehicle_name: "Coach 12".to_string(),
                vehicle_price,
                departure_at: Utc::now() + ChronoDuration::days(3),
                arrival_at: None,
                layout: SeatLayout {
                    floors: vec![FloorLayout {
                        floor: 1,
                        rows: seats,
                        columns: 1,
                        blocked: vec![],
                    }],
                },
            })
            .await
            .expect("create trip")
    }

    /// All seats of a trip ordered by id.
    pub async fn trip_seats(&self, trip_id: Uuid) -> Vec<seat::Model> {
        seat::Entity::find()
            .filter(seat::Column::TripId.eq(trip_id))
            .order_by_asc(seat::Column::Id)
            .all(&*self.db)
            .await
            .expect("load seats")
    }

    pub async fn seed_coupon(
        &self,
        code: &str,
        coupon_type: CouponType,
        value: Decimal,
        max_usage: i32,
    ) -> coupon::Model {
        let now = Utc::now();
        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            coupon_type: Set(coupon_type),
            value: Set(value),
            start_period: Set(now - ChronoDuration::days(1)),
            end_period: Set(now + ChronoDuration::days(30)),
            is_active: Set(true),
            max_usage: Set(max_usage),
            current_usage_count: Set(0),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&*self.db)
        .await
        .expect("insert coupon")
    }

    /// A guest booking request over the given seats.
    pub fn guest_request(&self, trip_id: Uuid, seat_ids: Vec<Uuid>) -> CreateOrderRequest {
        CreateOrderRequest {
            trip_id,
            seat_ids,
            user_id: None,
            guest_name: Some("Ngoc Tran".to_string()),
            guest_email: Some("rider@example.com".to_string()),
            guest_phone: Some("+84901234567".to_string()),
            payment_method_code: "bank_transfer".to_string(),
            coupon_code: None,
        }
    }

    /// A booking request for an authenticated user.
    pub fn user_request(
        &self,
        trip_id: Uuid,
        seat_ids: Vec<Uuid>,
        user_id: Uuid,
    ) -> CreateOrderRequest {
        CreateOrderRequest {
            trip_id,
            seat_ids,
            user_id: Some(user_id),
            guest_name: None,
            guest_email: None,
            guest_phone: None,
            payment_method_code: "card".to_string(),
            coupon_code: None,
        }
    }
}
