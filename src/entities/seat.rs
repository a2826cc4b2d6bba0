use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Enum representing the lifecycle states of a seat.
///
/// Legal transitions: Available → Reserved (inside the booking transaction),
/// Reserved → Booked (payment confirmation), Reserved/Booked → Available
/// (refund or cancellation release). Maintenance and Disabled are set
/// administratively and never entered from the booking path.
#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum SeatStatus {
    #[sea_orm(string_value = "Available")]
    Available,
    #[sea_orm(string_value = "Reserved")]
    Reserved,
    #[sea_orm(string_value = "Booked")]
    Booked,
    #[sea_orm(string_value = "Maintenance")]
    Maintenance,
    #[sea_orm(string_value = "Disabled")]
    Disabled,
}

impl SeatStatus {
    /// Whether a seat in this state can be released back to Available.
    pub fn is_releasable(&self) -> bool {
        matches!(self, SeatStatus::Reserved | SeatStatus::Booked)
    }
}

/// One physical seat on one trip. Seats are created in bulk at trip creation
/// from a layout template and outlive any order: releases reset them to
/// Available rather than deleting them.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "seats")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub trip_id: Uuid,
    pub floor: i32,
    pub row: i32,
    #[sea_orm(column_name = "col")]
    pub column: i32,
    pub status: SeatStatus,
    /// User id or guest email of the holder while Reserved/Booked.
    pub reserved_by: Option<String>,
    pub reserved_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::trip::Entity",
        from = "Column::TripId",
        to = "super::trip::Column::Id"
    )]
    Trip,
    #[sea_orm(has_many = "super::ticket::Entity")]
    Tickets,
}

impl Related<super::trip::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Trip.def()
    }
}

impl Related<super::ticket::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tickets.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
