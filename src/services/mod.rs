// Coupon discount engine
pub mod coupons;

// Commerce
pub mod commerce;
