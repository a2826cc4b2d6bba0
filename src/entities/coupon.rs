use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Enum representing how a coupon's value is applied.
#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum CouponType {
    /// `value` is a flat amount taken off the order total.
    #[sea_orm(string_value = "Fixed")]
    Fixed,
    /// `value` is a percentage of the order total.
    #[sea_orm(string_value = "Percentage")]
    Percentage,
}

/// A discount code with an active window and usage caps.
///
/// Invariant: `current_usage_count` never exceeds `max_usage`, including
/// under concurrent redemption; the counter is only touched under an
/// exclusive row lock inside the order-creation transaction.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub coupon_type: CouponType,
    pub value: Decimal,
    pub start_period: DateTime<Utc>,
    pub end_period: DateTime<Utc>,
    pub is_active: bool,
    pub max_usage: i32,
    pub current_usage_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::coupon_usage::Entity")]
    CouponUsages,
}

impl Related<super::coupon_usage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CouponUsages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
