use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::entities::coupon::{ApplicableTo, Model as CouponModel};
use crate::entities::CartLine;
use crate::errors::ServiceError;

/// Which cart lines a coupon's discount is computed against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ids", rename_all = "snake_case")]
pub enum ApplicabilityScope {
    AllCourses,
    SpecificCourses(BTreeSet<Uuid>),
    Category(BTreeSet<Uuid>),
    Instructor(BTreeSet<Uuid>),
}

impl ApplicabilityScope {
    /// Builds the scope from the persisted kind column and JSON id array.
    pub fn from_coupon(coupon: &CouponModel) -> Result<Self, ServiceError> {
        if coupon.applicable_to == ApplicableTo::AllCourses {
            return Ok(Self::AllCourses);
        }

        let ids: BTreeSet<Uuid> = match &coupon.applicable_ids {
            Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
                ServiceError::InternalError(format!(
                    "coupon {} has malformed applicable_ids: {}",
                    coupon.id, e
                ))
            })?,
            None => BTreeSet::new(),
        };

        Ok(match coupon.applicable_to {
            ApplicableTo::AllCourses => Self::AllCourses,
            ApplicableTo::SpecificCourses => Self::SpecificCourses(ids),
            ApplicableTo::Category => Self::Category(ids),
            ApplicableTo::Instructor => Self::Instructor(ids),
        })
    }

    /// Whether a line qualifies. Lines missing the denormalized category or
    /// instructor never match a category or instructor scope.
    pub fn covers(&self, line: &CartLine) -> bool {
        match self {
            Self::AllCourses => true,
            Self::SpecificCourses(ids) => ids.contains(&line.course_id),
            Self::Category(ids) => line.category_id.is_some_and(|id| ids.contains(&id)),
            Self::Instructor(ids) => line.instructor_id.is_some_and(|id| ids.contains(&id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn line(course: Uuid, category: Option<Uuid>, instructor: Option<Uuid>) -> CartLine {
        CartLine {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            course_id: course,
            category_id: category,
            instructor_id: instructor,
            price_snapshot: dec!(10.00),
            added_at: Utc::now(),
        }
    }

    #[test]
    fn each_scope_matches_on_its_own_key() {
        let course = Uuid::new_v4();
        let category = Uuid::new_v4();
        let instructor = Uuid::new_v4();
        let l = line(course, Some(category), Some(instructor));

        assert!(ApplicabilityScope::AllCourses.covers(&l));
        assert!(ApplicabilityScope::SpecificCourses([course].into()).covers(&l));
        assert!(ApplicabilityScope::Category([category].into()).covers(&l));
        assert!(ApplicabilityScope::Instructor([instructor].into()).covers(&l));

        assert!(!ApplicabilityScope::SpecificCourses([category].into()).covers(&l));
        assert!(!ApplicabilityScope::Category([course].into()).covers(&l));
    }

    #[test]
    fn missing_category_never_matches() {
        let l = line(Uuid::new_v4(), None, None);
        assert!(!ApplicabilityScope::Category([Uuid::nil()].into()).covers(&l));
        assert!(!ApplicabilityScope::Instructor([Uuid::nil()].into()).covers(&l));
    }
}
