//! Persistent entities for coupons, the redemption ledger and cart lines.
pub mod cart_item;
pub mod coupon;
pub mod coupon_redemption;

pub use cart_item::{Entity as CartItem, Model as CartLine};
pub use coupon::{Entity as Coupon, Model as CouponModel};
pub use coupon_redemption::{Entity as CouponRedemption, Model as CouponRedemptionModel};
