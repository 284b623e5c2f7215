use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::calculator::{discount_on, round_money, DiscountRule};
use super::validator::check_eligibility;
use crate::cache::{keys, CacheBackend, InvalidationSet};
use crate::entities::{CouponModel, CouponRedemptionModel};
use crate::errors::{CouponRejection, ServiceError};
use crate::events::{Event, EventSender};
use crate::repositories::{CouponRepository, RedemptionRepository};

/// A completed payment asking to consume one use of a coupon.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_amounts", skip_on_field_errors = true))]
pub struct RedemptionRequest {
    pub coupon_id: Uuid,
    pub user_id: Uuid,
    pub payment_id: Uuid,
    #[validate(custom = "validate_non_negative")]
    pub discount_amount: Decimal,
    /// Amount the coupon was applied to; checked against the coupon minimum.
    #[validate(custom = "validate_non_negative")]
    pub base_amount: Decimal,
}

fn validate_non_negative(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("Amount must not be negative".into());
        return Err(err);
    }
    Ok(())
}

fn validate_amounts(request: &RedemptionRequest) -> Result<(), ValidationError> {
    if request.discount_amount > request.base_amount {
        let mut err = ValidationError::new("discount_exceeds_base");
        err.message = Some("Discount cannot exceed the discounted amount".into());
        return Err(err);
    }
    Ok(())
}

/// Rejects a claimed discount larger than the coupon grants on the claimed
/// base.
fn check_allowance(coupon: &CouponModel, request: &RedemptionRequest) -> Result<(), ServiceError> {
    let allowed = discount_on(&DiscountRule::from_coupon(coupon)?, request.base_amount);
    if round_money(request.discount_amount) > allowed {
        return Err(ServiceError::ValidationError(format!(
            "discount {} exceeds the {} coupon {} allows on {}",
            request.discount_amount, allowed, coupon.code, request.base_amount
        )));
    }
    Ok(())
}

/// The one place coupon capacity is consumed.
///
/// A redemption is a ledger insert plus a conditional capacity increment in a
/// single transaction. The unique `(coupon_id, user_id)` index and the
/// conditional `UPDATE` arbitrate races; nothing here relies on an earlier
/// read still being true.
#[derive(Clone)]
pub struct RedemptionAccountant {
    db: Arc<DatabaseConnection>,
    cache: Arc<dyn CacheBackend>,
    event_sender: Arc<EventSender>,
}

impl RedemptionAccountant {
    pub fn new(
        db: Arc<DatabaseConnection>,
        cache: Arc<dyn CacheBackend>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            cache,
            event_sender,
        }
    }

    pub async fn redeem(
        &self,
        request: RedemptionRequest,
    ) -> Result<CouponRedemptionModel, ServiceError> {
        self.redeem_at(request, Utc::now()).await
    }

    /// Records the redemption and consumes one use.
    ///
    /// Retrying after a timeout is safe: the retry either commits once or
    /// reports `AlreadyRedeemed`.
    #[instrument(skip(self, request), fields(coupon_id = %request.coupon_id, user_id = %request.user_id))]
    pub async fn redeem_at(
        &self,
        request: RedemptionRequest,
        now: DateTime<Utc>,
    ) -> Result<CouponRedemptionModel, ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await?;

        let coupon = CouponRepository::find_by_id(&txn, request.coupon_id)
            .await?
            .ok_or(CouponRejection::NotFound)?;

        check_eligibility(&txn, &coupon, request.user_id, request.base_amount, now).await?;
        check_allowance(&coupon, &request)?;

        let row = Self::settle(txn, &coupon, &request, now).await?;

        self.invalidate(&coupon).await;
        self.event_sender
            .send_or_log(Event::CouponRedeemed {
                coupon_id: coupon.id,
                user_id: row.user_id,
                payment_id: row.payment_id,
                discount_amount: row.discount_amount,
                redeemed_at: row.created_at,
            })
            .await;

        info!(
            coupon_id = %coupon.id,
            redemption_id = %row.id,
            discount = %row.discount_amount,
            "coupon redeemed"
        );
        Ok(row)
    }

    /// Writes the ledger row and consumes one use against `coupon` as the
    /// caller read it, then commits `txn`.
    ///
    /// The copy may already be outdated: the conditional increment checks the
    /// live row, and on a miss the ledger insert is rolled back and the call
    /// fails with `ConcurrencyConflict`.
    pub async fn settle(
        txn: DatabaseTransaction,
        coupon: &CouponModel,
        request: &RedemptionRequest,
        now: DateTime<Utc>,
    ) -> Result<CouponRedemptionModel, ServiceError> {
        let row = RedemptionRepository::insert_unique(
            &txn,
            CouponRedemptionModel {
                id: Uuid::new_v4(),
                coupon_id: coupon.id,
                user_id: request.user_id,
                payment_id: request.payment_id,
                discount_amount: round_money(request.discount_amount),
                created_at: now,
            },
        )
        .await?;

        if !CouponRepository::increment_used_count(&txn, coupon.id, now).await? {
            txn.rollback().await?;
            warn!(coupon_id = %coupon.id, "coupon capacity taken by a concurrent redemption");
            return Err(CouponRejection::ConcurrencyConflict.into());
        }

        txn.commit().await?;
        Ok(row)
    }

    /// Cached coupon views that a committed redemption makes stale.
    pub fn invalidation_for(coupon: &CouponModel) -> InvalidationSet {
        InvalidationSet::new()
            .key(keys::coupon(coupon.id))
            .pattern(keys::COUPON_LISTS_PATTERN)
            .pattern(keys::coupon_validation_pattern(&coupon.code))
    }

    // The ledger is already committed; a cache failure only leaves views to
    // expire on their own.
    async fn invalidate(&self, coupon: &CouponModel) {
        if let Err(err) = Self::invalidation_for(coupon)
            .apply(self.cache.as_ref())
            .await
        {
            warn!(coupon_id = %coupon.id, error = %err, "cache invalidation after redemption failed");
        }
    }
}
