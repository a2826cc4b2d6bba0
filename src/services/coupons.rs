//! Coupon evaluation and redemption.
//!
//! `evaluate` is a read-only quote. Consumption happens through `redeem`,
//! which re-runs every check under an exclusive row lock inside the
//! order-creation transaction. That is the only way the usage counter is
//! allowed to move, so concurrent redemptions can never breach `max_usage`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QuerySelect, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::coupon::{self, CouponType, Entity as CouponEntity};
use crate::entities::coupon_usage::{self, Entity as CouponUsageEntity};
use crate::errors::ServiceError;

/// Outcome of a successful evaluation or redemption.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub discount: Decimal,
    pub coupon: coupon::Model,
}

/// Discount for a coupon against an order total, clamped so the discount can
/// never exceed what is being discounted.
fn compute_discount(coupon: &coupon::Model, order_total: Decimal) -> Decimal {
    let raw = match coupon.coupon_type {
        CouponType::Fixed => coupon.value,
        CouponType::Percentage => (order_total * coupon.value / Decimal::ONE_HUNDRED).round_dp(2),
    };
    raw.min(order_total)
}

fn check_redeemable(
    coupon: &coupon::Model,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    if !coupon.is_active {
        return Err(ServiceError::InvalidState(format!(
            "Coupon {} is not active",
            coupon.code
        )));
    }
    if now < coupon.start_period || now > coupon.end_period {
        return Err(ServiceError::InvalidState(format!(
            "Coupon {} is outside its active window",
            coupon.code
        )));
    }
    if coupon.current_usage_count >= coupon.max_usage {
        return Err(ServiceError::LimitExceeded(format!(
            "Coupon {} has reached its usage limit",
            coupon.code
        )));
    }
    Ok(())
}

async fn check_user_cap<C: ConnectionTrait>(
    conn: &C,
    coupon: &coupon::Model,
    user_id: Option<Uuid>,
) -> Result<(), ServiceError> {
    let Some(user_id) = user_id else {
        return Ok(());
    };

    let used = CouponUsageEntity::find()
        .filter(coupon_usage::Column::CouponId.eq(coupon.id))
        .filter(coupon_usage::Column::UserId.eq(user_id))
        .count(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if used >= coupon.max_usage as u64 {
        return Err(ServiceError::LimitExceeded(format!(
            "Coupon {} usage limit reached for this user",
            coupon.code
        )));
    }
    Ok(())
}

/// Read-side coupon quoting, for previewing a discount before checkout.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Evaluates a coupon against an order total without consuming it.
    #[instrument(skip(self), fields(code = %code, order_total = %order_total))]
    pub async fn evaluate(
        &self,
        code: &str,
        order_total: Decimal,
        user_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, ServiceError> {
        let db = &*self.db;

        let coupon = CouponEntity::find()
            .filter(coupon::Column::Code.eq(code))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", code)))?;

        check_redeemable(&coupon, now)?;
        check_user_cap(db, &coupon, user_id).await?;

        let discount = compute_discount(&coupon, order_total);
        Ok(Evaluation { discount, coupon })
    }
}

/// Consumes one use of a coupon inside the order-creation transaction:
/// re-checks everything under an exclusive row lock, increments the counter
/// and writes the usage row.
pub async fn redeem(
    txn: &DatabaseTransaction,
    code: &str,
    order_total: Decimal,
    user_id: Option<Uuid>,
    order_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Evaluation, ServiceError> {
    let coupon = CouponEntity::find()
        .filter(coupon::Column::Code.eq(code))
        .lock_exclusive()
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", code)))?;

    check_redeemable(&coupon, now)?;
    check_user_cap(txn, &coupon, user_id).await?;

    let discount = compute_discount(&coupon, order_total);

    let usage = coupon_usage::ActiveModel {
        id: Set(Uuid::new_v4()),
        coupon_id: Set(coupon.id),
        order_id: Set(order_id),
        user_id: Set(user_id),
        discount_amount: Set(discount),
        created_at: Set(now),
    };
    usage.insert(txn).await.map_err(ServiceError::db_error)?;

    let new_count = coupon.current_usage_count + 1;
    let mut active: coupon::ActiveModel = coupon.clone().into();
    active.current_usage_count = Set(new_count);
    active.updated_at = Set(Some(now));
    let coupon = active.update(txn).await.map_err(ServiceError::db_error)?;

    info!(coupon = %coupon.code, order_id = %order_id, %discount, "Coupon redeemed");

    Ok(Evaluation { discount, coupon })
}

/// Reverses an order's coupon usage when a full refund dissolves the order:
/// deletes the usage row and decrements the counter (floored at zero).
/// Returns whether a usage existed. Partial refunds never call this;
/// coupons are an all-or-nothing order-level benefit.
pub async fn reverse_for_order(
    txn: &DatabaseTransaction,
    order_id: Uuid,
) -> Result<bool, ServiceError> {
    let Some(usage) = CouponUsageEntity::find()
        .filter(coupon_usage::Column::OrderId.eq(order_id))
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
    else {
        return Ok(false);
    };

    let coupon = CouponEntity::find_by_id(usage.coupon_id)
        .lock_exclusive()
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Coupon {} not found", usage.coupon_id))
        })?;

    let decremented = (coupon.current_usage_count - 1).max(0);
    let mut active: coupon::ActiveModel = coupon.clone().into();
    active.current_usage_count = Set(decremented);
    active.updated_at = Set(Some(Utc::now()));
    active.update(txn).await.map_err(ServiceError::db_error)?;

    CouponUsageEntity::delete_by_id(usage.id)
        .exec(txn)
        .await
        .map_err(ServiceError::db_error)?;

    info!(coupon = %coupon.code, order_id = %order_id, "Coupon usage reversed");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_coupon(coupon_type: CouponType, value: Decimal) -> coupon::Model {
        let now = Utc::now();
        coupon::Model {
            id: Uuid::new_v4(),
            code: "SAVE".to_string(),
            coupon_type,
            value,
            start_period: now - chrono::Duration::days(1),
            end_period: now + chrono::Duration::days(30),
            is_active: true,
            max_usage: 100,
            current_usage_count: 0,
            created_at: now,
            updated_at: None,
        }
    }

    #[test]
    fn fixed_discount_is_the_face_value() {
        let coupon = test_coupon(CouponType::Fixed, dec!(50000));
        assert_eq!(compute_discount(&coupon, dec!(200000)), dec!(50000));
    }

    #[test]
    fn percentage_discount_scales_with_the_total() {
        let coupon = test_coupon(CouponType::Percentage, dec!(10));
        assert_eq!(compute_discount(&coupon, dec!(200000)), dec!(20000));
    }

    #[test]
    fn discount_never_exceeds_the_order_total() {
        let coupon = test_coupon(CouponType::Fixed, dec!(500000));
        assert_eq!(compute_discount(&coupon, dec!(200000)), dec!(200000));
    }

    #[test]
    fn inactive_and_out_of_window_coupons_are_rejected() {
        let now = Utc::now();

        let mut coupon = test_coupon(CouponType::Fixed, dec!(1000));
        coupon.is_active = false;
        assert!(matches!(
            check_redeemable(&coupon, now),
            Err(ServiceError::InvalidState(_))
        ));

        let mut coupon = test_coupon(CouponType::Fixed, dec!(1000));
        coupon.start_period = now + chrono::Duration::days(1);
        assert!(matches!(
            check_redeemable(&coupon, now),
            Err(ServiceError::InvalidState(_))
        ));

        let mut coupon = test_coupon(CouponType::Fixed, dec!(1000));
        coupon.end_period = now - chrono::Duration::hours(1);
        assert!(matches!(
            check_redeemable(&coupon, now),
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[test]
    fn exhausted_coupon_hits_the_cap() {
        let mut coupon = test_coupon(CouponType::Fixed, dec!(1000));
        coupon.max_usage = 5;
        coupon.current_usage_count = 5;
        assert!(matches!(
            check_redeemable(&coupon, Utc::now()),
            Err(ServiceError::LimitExceeded(_))
        ));
    }
}
