use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use super::calculator::round_money;
use crate::errors::ServiceError;
use crate::repositories::{CouponRepository, RedemptionRepository};

/// Usage figures for one coupon.
///
/// `used_count` comes from the coupon row and `redemption_count` from the
/// ledger, read without coordinating with in-flight redemptions, so the two
/// may briefly disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponUsageStats {
    pub coupon_id: Uuid,
    pub code: String,
    pub used_count: i32,
    pub usage_limit: Option<i32>,
    pub remaining: Option<i32>,
    /// `None` for unlimited coupons
    pub usage_percentage: Option<Decimal>,
    pub redemption_count: u64,
    pub total_discount: Decimal,
}

#[derive(Clone)]
pub struct CouponAnalytics {
    db: Arc<DatabaseConnection>,
}

impl CouponAnalytics {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn usage_stats(&self, coupon_id: Uuid) -> Result<CouponUsageStats, ServiceError> {
        let coupon = CouponRepository::find_by_id(&*self.db, coupon_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", coupon_id)))?;

        let redemption_count = RedemptionRepository::count_for_coupon(&*self.db, coupon_id).await?;
        let total_discount =
            RedemptionRepository::total_discount_for_coupon(&*self.db, coupon_id).await?;

        Ok(CouponUsageStats {
            coupon_id,
            code: coupon.code.clone(),
            used_count: coupon.used_count,
            usage_limit: coupon.usage_limit,
            remaining: coupon.remaining_uses(),
            usage_percentage: coupon
                .usage_limit
                .map(|limit| usage_percentage(coupon.used_count, limit)),
            redemption_count,
            total_discount,
        })
    }
}

/// Share of the limit already used, in percent. A zero limit counts as fully
/// used.
fn usage_percentage(used: i32, limit: i32) -> Decimal {
    if limit <= 0 {
        return Decimal::ONE_HUNDRED;
    }
    round_money(Decimal::from(used) * Decimal::ONE_HUNDRED / Decimal::from(limit))
}
