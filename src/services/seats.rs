//! The seat ledger: seat lifecycle state per trip.
//!
//! Every mutation here runs inside a caller-owned transaction and operates on
//! rows locked with `SELECT ... FOR UPDATE`. Seat id sets are locked in
//! ascending id order so two orders overlapping in seats cannot deadlock.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::entities::seat::{self, Entity as SeatEntity, SeatStatus};
use crate::errors::ServiceError;
use crate::services::realtime::SeatUpdate;

/// Seat-layout template used to create a trip's seats in bulk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatLayout {
    pub floors: Vec<FloorLayout>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloorLayout {
    pub floor: i32,
    pub rows: i32,
    pub columns: i32,
    /// Positions (row, column) created as Disabled, e.g. removed for luggage
    /// space in the layout template.
    #[serde(default)]
    pub blocked: Vec<(i32, i32)>,
}

impl SeatLayout {
    pub fn seat_count(&self) -> usize {
        self.floors
            .iter()
            .map(|f| (f.rows * f.columns) as usize)
            .sum()
    }
}

/// Loads and exclusively locks the given seats, validating that every id
/// exists, belongs to `trip_id`, and is currently Available.
///
/// The locks are held until the enclosing transaction ends, which is what
/// keeps two concurrent orders from both observing Available for one seat.
pub async fn validate_and_lock_seats(
    txn: &DatabaseTransaction,
    trip_id: Uuid,
    seat_ids: &[Uuid],
) -> Result<Vec<seat::Model>, ServiceError> {
    let mut wanted: Vec<Uuid> = seat_ids.to_vec();
    wanted.sort();
    wanted.dedup();

    if wanted.is_empty() {
        return Err(ServiceError::ValidationError(
            "At least one seat is required".to_string(),
        ));
    }

    let seats = SeatEntity::find()
        .filter(seat::Column::Id.is_in(wanted.clone()))
        .order_by_asc(seat::Column::Id)
        .lock_exclusive()
        .all(txn)
        .await
        .map_err(ServiceError::db_error)?;

    for wanted_id in &wanted {
        let seat = seats
            .iter()
            .find(|s| s.id == *wanted_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Seat {} not found", wanted_id)))?;

        if seat.trip_id != trip_id {
            return Err(ServiceError::NotFound(format!(
                "Seat {} does not belong to trip {}",
                wanted_id, trip_id
            )));
        }

        if seat.status != SeatStatus::Available {
            return Err(ServiceError::Conflict(format!(
                "Seat {} is not available",
                seat.id
            )));
        }
    }

    Ok(seats)
}

/// Transitions already-locked Available seats to Reserved, stamping the
/// holder and the reservation expiry.
pub async fn reserve(
    txn: &DatabaseTransaction,
    seats: Vec<seat::Model>,
    reserved_by: &str,
    reserved_until: DateTime<Utc>,
) -> Result<Vec<seat::Model>, ServiceError> {
    let now = Utc::now();
    let mut reserved = Vec::with_capacity(seats.len());

    for seat in seats {
        if seat.status != SeatStatus::Available {
            return Err(ServiceError::Conflict(format!(
                "Seat {} is not available",
                seat.id
            )));
        }

        let mut active: seat::ActiveModel = seat.into();
        active.status = Set(SeatStatus::Reserved);
        active.reserved_by = Set(Some(reserved_by.to_string()));
        active.reserved_until = Set(Some(reserved_until));
        active.updated_at = Set(Some(now));
        reserved.push(active.update(txn).await.map_err(ServiceError::db_error)?);
    }

    Ok(reserved)
}

/// Transitions Reserved seats to Booked on payment completion confirmation.
pub async fn mark_booked(
    txn: &DatabaseTransaction,
    seat_ids: &[Uuid],
) -> Result<Vec<seat::Model>, ServiceError> {
    let mut ids: Vec<Uuid> = seat_ids.to_vec();
    ids.sort();

    let seats = SeatEntity::find()
        .filter(seat::Column::Id.is_in(ids.clone()))
        .order_by_asc(seat::Column::Id)
        .lock_exclusive()
        .all(txn)
        .await
        .map_err(ServiceError::db_error)?;

    let now = Utc::now();
    let mut booked = Vec::with_capacity(seats.len());

    for seat in seats {
        if seat.status != SeatStatus::Reserved {
            return Err(ServiceError::Conflict(format!(
                "Seat {} is not reserved",
                seat.id
            )));
        }

        let mut active: seat::ActiveModel = seat.into();
        active.status = Set(SeatStatus::Booked);
        active.updated_at = Set(Some(now));
        booked.push(active.update(txn).await.map_err(ServiceError::db_error)?);
    }

    Ok(booked)
}

/// Releases Reserved/Booked seats back to Available, clearing the
/// reservation fields. Used by refund, void and the trip cascade.
pub async fn release(
    txn: &DatabaseTransaction,
    seat_ids: &[Uuid],
) -> Result<Vec<seat::Model>, ServiceError> {
    let mut ids: Vec<Uuid> = seat_ids.to_vec();
    ids.sort();

    let seats = SeatEntity::find()
        .filter(seat::Column::Id.is_in(ids.clone()))
        .order_by_asc(seat::Column::Id)
        .lock_exclusive()
        .all(txn)
        .await
        .map_err(ServiceError::db_error)?;

    let now = Utc::now();
    let mut released = Vec::with_capacity(seats.len());

    for seat in seats {
        if !seat.status.is_releasable() {
            return Err(ServiceError::Conflict(format!(
                "Seat {} cannot be released from its current state",
                seat.id
            )));
        }

        let mut active: seat::ActiveModel = seat.into();
        active.status = Set(SeatStatus::Available);
        active.reserved_by = Set(None);
        active.reserved_until = Set(None);
        active.updated_at = Set(Some(now));
        released.push(active.update(txn).await.map_err(ServiceError::db_error)?);
    }

    Ok(released)
}

/// Creates a trip's seats in bulk from a layout template. Called once, inside
/// the trip-creation transaction.
pub async fn create_for_trip(
    txn: &DatabaseTransaction,
    trip_id: Uuid,
    layout: &SeatLayout,
) -> Result<u64, ServiceError> {
    let now = Utc::now();
    let mut models = Vec::with_capacity(layout.seat_count());

    for floor in &layout.floors {
        for row in 1..=floor.rows {
            for column in 1..=floor.columns {
                let status = if floor.blocked.contains(&(row, column)) {
                    SeatStatus::Disabled
                } else {
                    SeatStatus::Available
                };
                models.push(seat::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    trip_id: Set(trip_id),
                    floor: Set(floor.floor),
                    row: Set(row),
                    column: Set(column),
                    status: Set(status),
                    reserved_by: Set(None),
                    reserved_until: Set(None),
                    created_at: Set(now),
                    updated_at: Set(Some(now)),
                });
            }
        }
    }

    let count = models.len() as u64;
    if count == 0 {
        return Err(ServiceError::ValidationError(
            "Seat layout produces no seats".to_string(),
        ));
    }

    SeatEntity::insert_many(models)
        .exec(txn)
        .await
        .map_err(ServiceError::db_error)?;

    info!(trip_id = %trip_id, seats = count, "Created seats from layout");
    Ok(count)
}

/// Snapshot of seats for realtime fan-out.
pub fn to_updates(seats: &[seat::Model]) -> Vec<SeatUpdate> {
    seats
        .iter()
        .map(|s| SeatUpdate {
            seat_id: s.id,
            status: s.status.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_counts_every_position() {
        let layout = SeatLayout {
            floors: vec![
                FloorLayout {
                    floor: 1,
                    rows: 10,
                    columns: 4,
                    blocked: vec![],
                },
                FloorLayout {
                    floor: 2,
                    rows: 8,
                    columns: 4,
                    blocked: vec![(1, 1)],
                },
            ],
        };
        // Blocked positions still exist as seats, just Disabled.
        assert_eq!(layout.seat_count(), 72);
    }

    #[test]
    fn releasable_states_match_the_transition_table() {
        assert!(SeatStatus::Reserved.is_releasable());
        assert!(SeatStatus::Booked.is_releasable());
        assert!(!SeatStatus::Available.is_releasable());
        assert!(!SeatStatus::Maintenance.is_releasable());
        assert!(!SeatStatus::Disabled.is_releasable());
    }
}
