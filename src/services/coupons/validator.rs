use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, DatabaseConnection};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::calculator::{compute, DiscountBreakdown, DiscountRule};
use crate::entities::{CartLine, CouponModel};
use crate::errors::{CouponRejection, ServiceError};
use crate::repositories::{CouponRepository, RedemptionRepository};

/// A coupon that passed every check for one user and cart.
#[derive(Debug, Clone, Serialize)]
pub struct EligibleCoupon {
    pub coupon: CouponModel,
    pub rule: DiscountRule,
    pub breakdown: DiscountBreakdown,
}

/// Read-only coupon checks against a user's cart.
#[derive(Clone)]
pub struct CouponValidator {
    db: Arc<DatabaseConnection>,
}

impl CouponValidator {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn validate(
        &self,
        code: &str,
        user_id: Uuid,
        lines: &[CartLine],
    ) -> Result<EligibleCoupon, ServiceError> {
        self.validate_at(code, user_id, lines, Utc::now()).await
    }

    /// Runs every check with a caller-supplied clock. The first failing check
    /// decides the rejection.
    #[instrument(skip(self, lines), fields(line_count = lines.len()))]
    pub async fn validate_at(
        &self,
        code: &str,
        user_id: Uuid,
        lines: &[CartLine],
        now: DateTime<Utc>,
    ) -> Result<EligibleCoupon, ServiceError> {
        let coupon = CouponRepository::find_by_code(&*self.db, code)
            .await?
            .ok_or(CouponRejection::NotFound)?;

        if lines.is_empty() {
            return Err(CouponRejection::EmptyCart.into());
        }

        let rule = DiscountRule::from_coupon(&coupon)?;
        let breakdown = compute(&rule, lines);

        check_eligibility(&*self.db, &coupon, user_id, breakdown.base_amount, now).await?;

        if !breakdown.is_applicable() {
            return Err(CouponRejection::NotApplicable.into());
        }

        debug!(
            coupon_id = %coupon.id,
            discount = %breakdown.discount_amount,
            "coupon eligible"
        );
        Ok(EligibleCoupon {
            coupon,
            rule,
            breakdown,
        })
    }
}

/// The state checks shared by validation and redemption: active flag,
/// validity window, remaining capacity, minimum amount and per-user reuse.
///
/// The window is half-open, so a coupon is usable at `valid_from` and no
/// longer at `valid_until`.
pub async fn check_eligibility<C: ConnectionTrait>(
    conn: &C,
    coupon: &CouponModel,
    user_id: Uuid,
    base_amount: Decimal,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    if !coupon.is_active {
        return Err(CouponRejection::Inactive.into());
    }
    if now < coupon.valid_from {
        return Err(CouponRejection::NotYetValid.into());
    }
    if now >= coupon.valid_until {
        return Err(CouponRejection::Expired.into());
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.used_count >= limit {
            return Err(CouponRejection::UsageLimitReached.into());
        }
    }
    if let Some(minimum) = coupon.minimum_amount {
        if base_amount < minimum {
            return Err(CouponRejection::MinimumNotMet.into());
        }
    }
    if RedemptionRepository::exists_for(conn, coupon.id, user_id).await? {
        return Err(CouponRejection::AlreadyRedeemed.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::coupon::{ApplicableTo, CouponType};
    use assert_matches::assert_matches;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn coupon(now: DateTime<Utc>) -> CouponModel {
        CouponModel {
            id: Uuid::new_v4(),
            code: "SAVE20".into(),
            title: "Save 20".into(),
            description: None,
            coupon_type: CouponType::Percentage,
            value: dec!(20),
            minimum_amount: None,
            maximum_discount: None,
            usage_limit: Some(5),
            used_count: 0,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            applicable_to: ApplicableTo::AllCourses,
            applicable_ids: None,
            is_active: true,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    // Every state check below fails before the ledger query runs.
    fn conn() -> DatabaseConnection {
        DatabaseConnection::default()
    }

    #[tokio::test]
    async fn window_is_half_open() {
        let now = Utc::now();
        let db = conn();

        let mut c = coupon(now);
        c.valid_from = now + Duration::seconds(1);
        assert_matches!(
            check_eligibility(&db, &c, Uuid::nil(), dec!(10), now).await,
            Err(ServiceError::CouponRejected(CouponRejection::NotYetValid))
        );

        let mut c = coupon(now);
        c.valid_until = now;
        assert_matches!(
            check_eligibility(&db, &c, Uuid::nil(), dec!(10), now).await,
            Err(ServiceError::CouponRejected(CouponRejection::Expired))
        );
    }

    #[tokio::test]
    async fn inactive_wins_over_expiry() {
        let now = Utc::now();
        let mut c = coupon(now);
        c.is_active = false;
        c.valid_until = now - Duration::days(2);
        c.valid_from = now - Duration::days(3);

        assert_matches!(
            check_eligibility(&conn(), &c, Uuid::nil(), dec!(10), now).await,
            Err(ServiceError::CouponRejected(CouponRejection::Inactive))
        );
    }

    #[tokio::test]
    async fn exhausted_and_minimum_checks() {
        let now = Utc::now();

        let mut c = coupon(now);
        c.used_count = 5;
        assert_matches!(
            check_eligibility(&conn(), &c, Uuid::nil(), dec!(10), now).await,
            Err(ServiceError::CouponRejected(CouponRejection::UsageLimitReached))
        );

        let mut c = coupon(now);
        c.minimum_amount = Some(dec!(100));
        assert_matches!(
            check_eligibility(&conn(), &c, Uuid::nil(), dec!(99.99), now).await,
            Err(ServiceError::CouponRejected(CouponRejection::MinimumNotMet))
        );
    }
}
