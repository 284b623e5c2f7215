use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::calculator::{cart_total, DiscountBreakdown};
use super::validator::{CouponValidator, EligibleCoupon};
use crate::cache::{get_json, keys, set_json, CacheBackend, CacheError};
use crate::config::CouponConfig;
use crate::entities::coupon::CouponType;
use crate::entities::CartLine;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Where the engine reads a user's cart from. The engine never writes through
/// it.
#[async_trait]
pub trait CartLineSource: Send + Sync {
    async fn lines_for_user(&self, user_id: Uuid) -> Result<Vec<CartLine>, ServiceError>;
}

/// A coupon applied to a cart, held in the cache until it expires or the cart
/// moves away from it. Never touches coupon capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponPreview {
    pub user_id: Uuid,
    pub coupon_id: Uuid,
    pub code: String,
    pub title: String,
    pub coupon_type: CouponType,
    pub base_amount: Decimal,
    pub discount_amount: Decimal,
    pub applicable_line_ids: Vec<Uuid>,
    pub cart_line_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CouponPreview {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewResult {
    pub preview: CouponPreview,
    pub cart_total: Decimal,
    pub final_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCoupon {
    pub coupon_id: Uuid,
    pub code: String,
    pub title: String,
}

/// Cart totals as shown at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub user_id: Uuid,
    pub line_count: usize,
    pub cart_total: Decimal,
    pub discount_amount: Decimal,
    pub final_total: Decimal,
    pub coupon: Option<AppliedCoupon>,
    /// The preview was dropped because a line it discounted left the cart.
    pub coupon_removed: bool,
    /// The cart changed since the preview was taken; re-apply to refresh.
    pub stale: bool,
}

/// Summary of a successful validation, cached per code and user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponCheck {
    pub coupon_id: Uuid,
    pub code: String,
    pub title: String,
    pub coupon_type: CouponType,
    pub value: Decimal,
    pub base_amount: Decimal,
    pub discount_amount: Decimal,
    pub final_total: Decimal,
    pub valid_until: DateTime<Utc>,
    pub cart_line_ids: Vec<Uuid>,
}

/// Per-user preview and totals entries in the cache.
///
/// Shared by the session service and the cart service so cart mutations can
/// drop derived views without depending on the session service.
#[derive(Clone)]
pub struct PreviewStore {
    cache: Arc<dyn CacheBackend>,
    preview_ttl: Duration,
    totals_ttl: Duration,
}

impl PreviewStore {
    pub fn new(cache: Arc<dyn CacheBackend>, config: &CouponConfig) -> Self {
        Self {
            cache,
            preview_ttl: config.preview_ttl(),
            totals_ttl: config.cart_totals_ttl(),
        }
    }

    pub fn preview_ttl(&self) -> Duration {
        self.preview_ttl
    }

    pub async fn load(&self, user_id: Uuid) -> Result<Option<CouponPreview>, CacheError> {
        get_json(self.cache.as_ref(), &keys::cart_coupon(user_id)).await
    }

    pub async fn store(&self, preview: &CouponPreview) -> Result<(), CacheError> {
        set_json(
            self.cache.as_ref(),
            &keys::cart_coupon(preview.user_id),
            preview,
            Some(self.preview_ttl),
        )
        .await
    }

    pub async fn drop_preview(&self, user_id: Uuid) -> Result<(), CacheError> {
        self.cache.delete(&keys::cart_coupon(user_id)).await
    }

    pub async fn store_totals(&self, totals: &CartTotals) -> Result<(), CacheError> {
        set_json(
            self.cache.as_ref(),
            &keys::cart_totals(totals.user_id),
            totals,
            Some(self.totals_ttl),
        )
        .await
    }

    pub async fn drop_totals(&self, user_id: Uuid) -> Result<(), CacheError> {
        self.cache.delete(&keys::cart_totals(user_id)).await
    }

    /// Cart lines were added; only the totals snapshot goes stale.
    pub async fn lines_added(&self, user_id: Uuid) {
        if let Err(err) = self.drop_totals(user_id).await {
            warn!(%user_id, error = %err, "failed to drop cart totals");
        }
    }

    /// Cart lines were removed. The preview goes too when it discounted one of
    /// them. Returns whether the preview was dropped.
    pub async fn lines_removed(&self, user_id: Uuid, removed: &[Uuid]) -> bool {
        self.lines_added(user_id).await;

        let preview = match self.load(user_id).await {
            Ok(preview) => preview,
            Err(err) => {
                warn!(%user_id, error = %err, "failed to read coupon preview");
                return false;
            }
        };
        let Some(preview) = preview else {
            return false;
        };
        if !removed
            .iter()
            .any(|id| preview.applicable_line_ids.contains(id))
        {
            return false;
        }

        match self.drop_preview(user_id).await {
            Ok(()) => true,
            Err(err) => {
                warn!(%user_id, error = %err, "failed to drop coupon preview");
                false
            }
        }
    }

    /// The cart was emptied; every derived view goes.
    pub async fn cart_cleared(&self, user_id: Uuid) {
        self.lines_added(user_id).await;
        if let Err(err) = self.drop_preview(user_id).await {
            warn!(%user_id, error = %err, "failed to drop coupon preview");
        }
    }
}

/// The buyer-facing side of coupons: applying one to the cart, reading it back
/// and computing checkout totals.
#[derive(Clone)]
pub struct CouponSessionService {
    validator: CouponValidator,
    carts: Arc<dyn CartLineSource>,
    previews: PreviewStore,
    cache: Arc<dyn CacheBackend>,
    validation_ttl: Duration,
    event_sender: Arc<EventSender>,
}

impl CouponSessionService {
    pub fn new(
        validator: CouponValidator,
        carts: Arc<dyn CartLineSource>,
        previews: PreviewStore,
        cache: Arc<dyn CacheBackend>,
        config: &CouponConfig,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            validator,
            carts,
            previews,
            cache,
            validation_ttl: config.validation_ttl(),
            event_sender,
        }
    }

    pub async fn preview(&self, user_id: Uuid, code: &str) -> Result<PreviewResult, ServiceError> {
        self.preview_at(user_id, code, Utc::now()).await
    }

    /// Validates the code against the live cart and stores the result as the
    /// user's preview, replacing any earlier one.
    #[instrument(skip(self))]
    pub async fn preview_at(
        &self,
        user_id: Uuid,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<PreviewResult, ServiceError> {
        let lines = self.carts.lines_for_user(user_id).await?;
        let EligibleCoupon {
            coupon, breakdown, ..
        } = self.validator.validate_at(code, user_id, &lines, now).await?;

        let ttl = chrono::Duration::from_std(self.previews.preview_ttl())
            .map_err(|e| ServiceError::InternalError(format!("invalid preview ttl: {}", e)))?;

        let preview = CouponPreview {
            user_id,
            coupon_id: coupon.id,
            code: coupon.code.clone(),
            title: coupon.title.clone(),
            coupon_type: coupon.coupon_type,
            base_amount: breakdown.base_amount,
            discount_amount: breakdown.discount_amount,
            applicable_line_ids: breakdown.applicable_line_ids.clone(),
            cart_line_ids: lines.iter().map(|line| line.id).collect(),
            created_at: now,
            expires_at: now + ttl,
        };

        self.previews.store(&preview).await?;
        if let Err(err) = self.previews.drop_totals(user_id).await {
            warn!(%user_id, error = %err, "failed to drop cart totals");
        }

        self.event_sender
            .send_or_log(Event::CouponPreviewed {
                user_id,
                coupon_id: coupon.id,
                discount_amount: breakdown.discount_amount,
            })
            .await;

        info!(%user_id, coupon_id = %coupon.id, discount = %breakdown.discount_amount, "coupon applied to cart");
        Ok(PreviewResult {
            preview,
            cart_total: breakdown.cart_total,
            final_total: breakdown.final_total,
        })
    }

    /// The user's current preview, if one is stored and not yet expired.
    pub async fn get(&self, user_id: Uuid) -> Result<Option<CouponPreview>, ServiceError> {
        let now = Utc::now();
        Ok(self
            .previews
            .load(user_id)
            .await?
            .filter(|preview| !preview.is_expired(now)))
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> Result<(), ServiceError> {
        self.previews.drop_preview(user_id).await?;
        if let Err(err) = self.previews.drop_totals(user_id).await {
            warn!(%user_id, error = %err, "failed to drop cart totals");
        }

        self.event_sender
            .send_or_log(Event::CouponPreviewCleared { user_id })
            .await;
        Ok(())
    }

    pub async fn totals(&self, user_id: Uuid) -> Result<CartTotals, ServiceError> {
        self.totals_at(user_id, Utc::now()).await
    }

    /// Recomputes the cart total from live lines and reconciles it with the
    /// stored preview.
    ///
    /// The preview's discount is reused as-is, clamped to the live total. If a
    /// line it discounted is gone the preview is discarded; if the cart merely
    /// gained or lost other lines the result is marked stale.
    #[instrument(skip(self))]
    pub async fn totals_at(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CartTotals, ServiceError> {
        let lines = self.carts.lines_for_user(user_id).await?;
        let cart_total = cart_total(&lines);
        let live_ids: BTreeSet<Uuid> = lines.iter().map(|line| line.id).collect();

        let preview = self
            .previews
            .load(user_id)
            .await?
            .filter(|preview| !preview.is_expired(now));

        let mut totals = CartTotals {
            user_id,
            line_count: lines.len(),
            cart_total,
            discount_amount: Decimal::ZERO,
            final_total: cart_total,
            coupon: None,
            coupon_removed: false,
            stale: false,
        };

        if let Some(preview) = preview {
            let applicable_present = preview
                .applicable_line_ids
                .iter()
                .all(|id| live_ids.contains(id));

            if applicable_present {
                let snapshot: BTreeSet<Uuid> = preview.cart_line_ids.iter().copied().collect();
                let discount = preview.discount_amount.min(cart_total).max(Decimal::ZERO);
                totals.discount_amount = discount;
                totals.final_total = (cart_total - discount).max(Decimal::ZERO);
                totals.stale = snapshot != live_ids;
                totals.coupon = Some(AppliedCoupon {
                    coupon_id: preview.coupon_id,
                    code: preview.code,
                    title: preview.title,
                });
            } else {
                self.previews.drop_preview(user_id).await?;
                totals.coupon_removed = true;
                info!(%user_id, coupon_id = %preview.coupon_id, "coupon preview dropped, discounted course left the cart");
            }
        }

        if let Err(err) = self.previews.store_totals(&totals).await {
            warn!(%user_id, error = %err, "failed to cache cart totals");
        }
        Ok(totals)
    }

    pub async fn check(&self, user_id: Uuid, code: &str) -> Result<CouponCheck, ServiceError> {
        self.check_at(user_id, code, Utc::now()).await
    }

    /// Validates a code without applying it. Successful results are cached per
    /// code and user and reused while the cart is unchanged.
    #[instrument(skip(self))]
    pub async fn check_at(
        &self,
        user_id: Uuid,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<CouponCheck, ServiceError> {
        let key = keys::coupon_validation(code, user_id);
        let lines = self.carts.lines_for_user(user_id).await?;
        let live_ids: Vec<Uuid> = lines.iter().map(|line| line.id).collect();

        match get_json::<CouponCheck>(self.cache.as_ref(), &key).await {
            Ok(Some(cached)) if cached.cart_line_ids == live_ids && now < cached.valid_until => {
                return Ok(cached);
            }
            Ok(_) => {}
            Err(err) => warn!(key = %key, error = %err, "failed to read cached coupon check"),
        }

        let EligibleCoupon {
            coupon, breakdown, ..
        } = self.validator.validate_at(code, user_id, &lines, now).await?;
        let check = summarize(&coupon, &breakdown, live_ids);

        if let Err(err) =
            set_json(self.cache.as_ref(), &key, &check, Some(self.validation_ttl)).await
        {
            warn!(key = %key, error = %err, "failed to cache coupon check");
        }
        Ok(check)
    }
}

fn summarize(
    coupon: &crate::entities::CouponModel,
    breakdown: &DiscountBreakdown,
    cart_line_ids: Vec<Uuid>,
) -> CouponCheck {
    CouponCheck {
        coupon_id: coupon.id,
        code: coupon.code.clone(),
        title: coupon.title.clone(),
        coupon_type: coupon.coupon_type,
        value: coupon.value,
        base_amount: breakdown.base_amount,
        discount_amount: breakdown.discount_amount,
        final_total: breakdown.final_total,
        valid_until: coupon.valid_until,
        cart_line_ids,
    }
}
