//! Data access for coupons and the redemption ledger.
//!
//! Every function takes a generic `ConnectionTrait` so the same query runs
//! against the pool or inside a caller's transaction.

pub mod coupon_repository;
pub mod redemption_repository;

pub use coupon_repository::CouponRepository;
pub use redemption_repository::RedemptionRepository;
