//! Pure discount arithmetic.
//!
//! Everything here is deterministic: the same rule and lines always give the
//! same breakdown, with no clock, cache or database involved.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::scope::ApplicabilityScope;
use crate::entities::coupon::{CouponType, Model as CouponModel};
use crate::entities::CartLine;
use crate::errors::ServiceError;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// The parts of a coupon that decide how much it takes off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountRule {
    pub coupon_type: CouponType,
    pub value: Decimal,
    pub maximum_discount: Option<Decimal>,
    pub scope: ApplicabilityScope,
}

impl DiscountRule {
    pub fn from_coupon(coupon: &CouponModel) -> Result<Self, ServiceError> {
        Ok(Self {
            coupon_type: coupon.coupon_type,
            value: coupon.value,
            maximum_discount: coupon.maximum_discount,
            scope: ApplicabilityScope::from_coupon(coupon)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountBreakdown {
    /// Sum of every line in the cart
    pub cart_total: Decimal,
    /// Sum of the lines the coupon applies to
    pub base_amount: Decimal,
    pub discount_amount: Decimal,
    pub final_total: Decimal,
    pub applicable_line_ids: Vec<Uuid>,
}

impl DiscountBreakdown {
    pub fn is_applicable(&self) -> bool {
        !self.applicable_line_ids.is_empty()
    }
}

/// Rounds a money amount to cents, halves away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Sum of the line prices, rounded to cents.
pub fn cart_total(lines: &[CartLine]) -> Decimal {
    round_money(lines.iter().map(|line| line.price_snapshot).sum())
}

/// The discount a rule grants on an already-scoped base amount. This is also
/// the most a redemption may claim for that base.
pub fn discount_on(rule: &DiscountRule, base_amount: Decimal) -> Decimal {
    let base_amount = round_money(base_amount);
    let raw = match rule.coupon_type {
        CouponType::Percentage => base_amount * rule.value / HUNDRED,
        CouponType::FixedAmount => rule.value.min(base_amount),
    };
    let capped = match rule.maximum_discount {
        Some(cap) => raw.min(cap),
        None => raw,
    };
    round_money(capped).min(base_amount).max(Decimal::ZERO)
}

/// Applies a rule to cart lines.
///
/// Lines outside the scope stay in `cart_total` but never contribute to the
/// base or the cap. The discount never exceeds the base and is never
/// negative.
pub fn compute(rule: &DiscountRule, lines: &[CartLine]) -> DiscountBreakdown {
    let cart_total = cart_total(lines);

    let applicable: Vec<&CartLine> = lines.iter().filter(|line| rule.scope.covers(line)).collect();
    let base_amount = round_money(applicable.iter().map(|line| line.price_snapshot).sum());

    let discount_amount = discount_on(rule, base_amount);
    let final_total = (cart_total - discount_amount).max(Decimal::ZERO);

    DiscountBreakdown {
        cart_total,
        base_amount,
        discount_amount,
        final_total,
        applicable_line_ids: applicable.iter().map(|line| line.id).collect(),
    }
}
