//! Coupon discount engine.
//!
//! Validation and discount math are read-only; [`CouponSessionService`] keeps
//! the per-user preview in the cache; [`RedemptionAccountant`] is the only
//! writer of coupon capacity.

pub mod analytics;
pub mod calculator;
pub mod redemption;
pub mod scope;
pub mod session;
pub mod validator;

pub use analytics::{CouponAnalytics, CouponUsageStats};
pub use calculator::{compute, discount_on, DiscountBreakdown, DiscountRule};
pub use redemption::{RedemptionAccountant, RedemptionRequest};
pub use scope::ApplicabilityScope;
pub use session::{
    AppliedCoupon, CartLineSource, CartTotals, CouponCheck, CouponPreview, CouponSessionService,
    PreviewResult, PreviewStore,
};
pub use validator::{check_eligibility, CouponValidator, EligibleCoupon};
