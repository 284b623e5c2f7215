use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect,
    Set, SqlErr,
};
use uuid::Uuid;

use crate::entities::coupon_redemption::{ActiveModel, Column};
use crate::entities::{CouponRedemption, CouponRedemptionModel};
use crate::errors::{CouponRejection, ServiceError};

/// Repository for the append-only redemption ledger
#[derive(Debug, Clone, Copy, Default)]
pub struct RedemptionRepository;

impl RedemptionRepository {
    /// Appends a ledger row.
    ///
    /// The unique index on `(coupon_id, user_id)` is the arbiter for duplicate
    /// redemptions; a violation surfaces as `AlreadyRedeemed`.
    pub async fn insert_unique<C: ConnectionTrait>(
        conn: &C,
        row: CouponRedemptionModel,
    ) -> Result<CouponRedemptionModel, ServiceError> {
        let active = ActiveModel {
            id: Set(row.id),
            coupon_id: Set(row.coupon_id),
            user_id: Set(row.user_id),
            payment_id: Set(row.payment_id),
            discount_amount: Set(row.discount_amount),
            created_at: Set(row.created_at),
        };

        match CouponRedemption::insert(active).exec(conn).await {
            Ok(_) => Ok(row),
            Err(err) => match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    Err(CouponRejection::AlreadyRedeemed.into())
                }
                _ => Err(err.into()),
            },
        }
    }

    pub async fn exists_for<C: ConnectionTrait>(
        conn: &C,
        coupon_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, DbErr> {
        let count = CouponRedemption::find()
            .filter(Column::CouponId.eq(coupon_id))
            .filter(Column::UserId.eq(user_id))
            .count(conn)
            .await?;
        Ok(count > 0)
    }

    pub async fn count_for_coupon<C: ConnectionTrait>(
        conn: &C,
        coupon_id: Uuid,
    ) -> Result<u64, DbErr> {
        CouponRedemption::find()
            .filter(Column::CouponId.eq(coupon_id))
            .count(conn)
            .await
    }

    /// Sum of every discount granted through the coupon, zero when unused.
    pub async fn total_discount_for_coupon<C: ConnectionTrait>(
        conn: &C,
        coupon_id: Uuid,
    ) -> Result<Decimal, DbErr> {
        let total: Option<Option<Decimal>> = CouponRedemption::find()
            .select_only()
            .column_as(Column::DiscountAmount.sum(), "total")
            .filter(Column::CouponId.eq(coupon_id))
            .into_tuple()
            .one(conn)
            .await?;

        Ok(total.flatten().unwrap_or(Decimal::ZERO).round_dp(2))
    }
}
