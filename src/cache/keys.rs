//! Cache key layout for coupon and cart views.

use uuid::Uuid;

use crate::entities::coupon::normalize_code;

/// Every cached coupon listing lives under this prefix.
pub const COUPON_LISTS_PATTERN: &str = "coupons:*";

pub fn coupon(coupon_id: Uuid) -> String {
    format!("coupon:{}", coupon_id)
}

pub fn coupon_validation(code: &str, user_id: Uuid) -> String {
    format!("coupon_validation:{}:{}", normalize_code(code), user_id)
}

/// Matches the cached validation result of every user for one code.
pub fn coupon_validation_pattern(code: &str) -> String {
    format!("coupon_validation:{}:*", normalize_code(code))
}

pub fn cart_coupon(user_id: Uuid) -> String {
    format!("cart_coupon:{}", user_id)
}

pub fn cart_totals(user_id: Uuid) -> String {
    format!("cart_totals:{}", user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_keys_use_normalized_codes() {
        let user = Uuid::nil();
        assert_eq!(
            coupon_validation(" save20", user),
            format!("coupon_validation:SAVE20:{}", user)
        );
        assert_eq!(coupon_validation_pattern("save20"), "coupon_validation:SAVE20:*");
    }
}
