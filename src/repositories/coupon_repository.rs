use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::entities::coupon::{self, normalize_code, Column};
use crate::entities::{Coupon, CouponModel};

/// Repository for coupon definitions
#[derive(Debug, Clone, Copy, Default)]
pub struct CouponRepository;

impl CouponRepository {
    /// Find a coupon by its code; the lookup is trimmed and case-insensitive.
    pub async fn find_by_code<C: ConnectionTrait>(
        conn: &C,
        code: &str,
    ) -> Result<Option<CouponModel>, DbErr> {
        Coupon::find()
            .filter(Column::Code.eq(normalize_code(code)))
            .one(conn)
            .await
    }

    pub async fn find_by_id<C: ConnectionTrait>(
        conn: &C,
        id: Uuid,
    ) -> Result<Option<CouponModel>, DbErr> {
        Coupon::find_by_id(id).one(conn).await
    }

    /// Consumes one unit of capacity.
    ///
    /// Runs as a single conditional `UPDATE` so the database arbitrates
    /// concurrent redeemers: the row only changes while the coupon is active
    /// and still under its usage limit. Returns `false` when nothing was
    /// updated.
    pub async fn increment_used_count<C: ConnectionTrait>(
        conn: &C,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        let result = coupon::Entity::update_many()
            .col_expr(Column::UsedCount, Expr::col(Column::UsedCount).add(1))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(Column::UsageLimit.is_null())
                    .add(Expr::col(Column::UsedCount).lt(Expr::col(Column::UsageLimit))),
            )
            .exec(conn)
            .await?;

        Ok(result.rows_affected == 1)
    }
}
