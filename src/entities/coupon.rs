use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed_amount")]
    FixedAmount,
}

/// Column-level shape of a coupon's applicability scope. The ids it refers to
/// live in `applicable_ids`; the engine only ever sees the combined
/// `ApplicabilityScope`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicableTo {
    #[sea_orm(string_value = "all_courses")]
    AllCourses,
    #[sea_orm(string_value = "specific_courses")]
    SpecificCourses,
    #[sea_orm(string_value = "category")]
    Category,
    #[sea_orm(string_value = "instructor")]
    Instructor,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub title: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub coupon_type: CouponType,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))", nullable)]
    pub minimum_amount: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))", nullable)]
    pub maximum_discount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub applicable_to: ApplicableTo,
    #[sea_orm(column_type = "Json", nullable)]
    pub applicable_ids: Option<Json>,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::coupon_redemption::Entity")]
    Redemptions,
}

impl Related<super::coupon_redemption::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Redemptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Remaining redemptions, or `None` when the coupon is unlimited.
    pub fn remaining_uses(&self) -> Option<i32> {
        self.usage_limit
            .map(|limit| (limit - self.used_count).max(0))
    }
}

/// Codes are stored and matched trimmed and uppercased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_code_trims_and_uppercases() {
        assert_eq!(normalize_code("  save20 "), "SAVE20");
        assert_eq!(normalize_code("Instr10"), "INSTR10");
    }
}
