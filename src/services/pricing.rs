//! Fare computation.
//!
//! Trip price (route base price + vehicle-type price) is fixed at trip
//! creation and is authoritative for booking. Segment fares scale that price
//! by the fraction of the route actually travelled when a caller asks for a
//! sub-route quote.

use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::route::Entity as RouteEntity;
use crate::entities::route_stop::{self, Entity as RouteStopEntity};
use crate::entities::trip::Entity as TripEntity;
use crate::errors::ServiceError;

/// Fraction of the route covered by a segment, clamped to `[0, 1]`.
///
/// A computed ratio of exactly zero on a route with nonzero distance means
/// the stop-distance data is missing or degenerate; that falls back to full
/// fare. Missing data must never price a seat at zero.
pub fn segment_ratio(origin_km: Decimal, dest_km: Decimal, total_km: Decimal) -> Decimal {
    if total_km <= Decimal::ZERO {
        return Decimal::ONE;
    }

    let ratio = (dest_km - origin_km) / total_km;
    let clamped = ratio.clamp(Decimal::ZERO, Decimal::ONE);

    if clamped == Decimal::ZERO {
        Decimal::ONE
    } else {
        clamped
    }
}

/// Price for one seat over a segment fraction of the trip.
pub fn seat_fare(trip_price: Decimal, ratio: Decimal) -> Decimal {
    (trip_price * ratio).round_dp(2)
}

/// Read-side fare quoting for sub-route segments.
#[derive(Clone)]
pub struct PricingService {
    db: Arc<DatabaseConnection>,
}

impl PricingService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Quotes the fare for riding a trip between two of its route's stops.
    #[instrument(skip(self))]
    pub async fn quote_segment_fare(
        &self,
        trip_id: Uuid,
        origin_stop_id: Uuid,
        dest_stop_id: Uuid,
    ) -> Result<Decimal, ServiceError> {
        let db = &*self.db;

        let trip = TripEntity::find_by_id(trip_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Trip {} not found", trip_id)))?;

        let route = RouteEntity::find_by_id(trip.route_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Route {} not found", trip.route_id)))?;

        let stops = RouteStopEntity::find()
            .filter(route_stop::Column::Id.is_in(vec![origin_stop_id, dest_stop_id]))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let origin = stops
            .iter()
            .find(|s| s.id == origin_stop_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Stop {} not found", origin_stop_id)))?;
        let dest = stops
            .iter()
            .find(|s| s.id == dest_stop_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Stop {} not found", dest_stop_id)))?;

        if origin.route_id != route.id || dest.route_id != route.id {
            return Err(ServiceError::ValidationError(format!(
                "Stops do not belong to route {}",
                route.id
            )));
        }

        let ratio = segment_ratio(
            origin.distance_from_start_km,
            dest.distance_from_start_km,
            route.total_distance_km,
        );

        Ok(seat_fare(trip.price, ratio))
    }
}
