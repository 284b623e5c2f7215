mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{reload, CouponFixture, TestApp};
use coursemart_api::{
    cache::CacheBackend,
    entities::coupon::ApplicableTo,
    errors::{CouponRejection, ServiceError},
};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn validator_reports_each_rejection() {
    let app = TestApp::new().await;
    let sessions = &app.services().coupon_sessions;
    let user = Uuid::new_v4();
    let now = Utc::now();

    assert_matches!(
        sessions.preview(user, "NOPE").await,
        Err(ServiceError::CouponRejected(CouponRejection::NotFound))
    );

    CouponFixture::percentage("EMPTY", dec!(10)).insert(&app.db).await;
    assert_matches!(
        sessions.preview(user, "EMPTY").await,
        Err(ServiceError::CouponRejected(CouponRejection::EmptyCart))
    );

    app.add_course(user, dec!(80)).await;

    CouponFixture::percentage("SOON", dec!(10))
        .window(now + Duration::days(1), now + Duration::days(2))
        .insert(&app.db)
        .await;
    assert_matches!(
        sessions.preview(user, "soon").await,
        Err(ServiceError::CouponRejected(CouponRejection::NotYetValid))
    );

    CouponFixture::percentage("OLD", dec!(10))
        .window(now - Duration::days(2), now - Duration::days(1))
        .insert(&app.db)
        .await;
    assert_matches!(
        sessions.preview(user, "OLD").await,
        Err(ServiceError::CouponRejected(CouponRejection::Expired))
    );

    CouponFixture::fixed("BIG", dec!(10))
        .minimum(dec!(100))
        .insert(&app.db)
        .await;
    assert_matches!(
        sessions.preview(user, "BIG").await,
        Err(ServiceError::CouponRejected(CouponRejection::MinimumNotMet))
    );

    CouponFixture::fixed("OTHER", dec!(10))
        .scoped(ApplicableTo::SpecificCourses, vec![Uuid::new_v4()])
        .insert(&app.db)
        .await;
    assert_matches!(
        sessions.preview(user, "OTHER").await,
        Err(ServiceError::CouponRejected(CouponRejection::NotApplicable))
    );

    assert!(sessions.get(user).await.unwrap().is_none());
}

#[tokio::test]
async fn instructor_scope_discounts_only_matching_lines() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let (course_a, course_b, course_c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    CouponFixture::fixed("INSTR10", dec!(30))
        .scoped(ApplicableTo::SpecificCourses, vec![course_a, course_b])
        .insert(&app.db)
        .await;
    let line_a = app
        .add_course_with(user, course_a, None, None, dec!(100))
        .await;
    app.add_course_with(user, course_c, None, None, dec!(50))
        .await;

    let result = app
        .services()
        .coupon_sessions
        .preview(user, "INSTR10")
        .await
        .expect("preview");

    assert_eq!(result.preview.base_amount.round_dp(2), dec!(100));
    assert_eq!(result.preview.discount_amount.round_dp(2), dec!(30));
    assert_eq!(result.final_total.round_dp(2), dec!(120));
    assert_eq!(result.preview.applicable_line_ids, vec![line_a.id]);
}

#[tokio::test]
async fn preview_does_not_consume_capacity() {
    let app = TestApp::new().await;
    let coupon = CouponFixture::percentage("LIMITED", dec!(10))
        .usage_limit(1)
        .insert(&app.db)
        .await;

    for _ in 0..3 {
        let user = Uuid::new_v4();
        app.add_course(user, dec!(20)).await;
        app.services()
            .coupon_sessions
            .preview(user, "LIMITED")
            .await
            .expect("preview");
    }

    assert_eq!(reload(&app.db, coupon.id).await.used_count, 0);
}

#[tokio::test]
async fn totals_track_cart_changes_against_the_preview() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let category = Uuid::new_v4();

    CouponFixture::percentage("CAT50", dec!(50))
        .scoped(ApplicableTo::Category, vec![category])
        .insert(&app.db)
        .await;
    let discounted = app
        .add_course_with(user, Uuid::new_v4(), Some(category), None, dec!(60))
        .await;
    let other = app.add_course(user, dec!(40)).await;

    let sessions = &app.services().coupon_sessions;
    sessions.preview(user, "CAT50").await.expect("preview");

    let totals = sessions.totals(user).await.expect("totals");
    assert_eq!(totals.cart_total.round_dp(2), dec!(100));
    assert_eq!(totals.discount_amount.round_dp(2), dec!(30));
    assert_eq!(totals.final_total.round_dp(2), dec!(70));
    assert!(!totals.stale);
    assert!(!totals.coupon_removed);
    assert_eq!(totals.coupon.as_ref().map(|c| c.code.as_str()), Some("CAT50"));

    // An unrelated course leaving keeps the coupon but flags the totals.
    assert!(app
        .services()
        .cart
        .remove_item(user, other.course_id)
        .await
        .unwrap());
    let totals = sessions.totals(user).await.expect("totals");
    assert_eq!(totals.cart_total.round_dp(2), dec!(60));
    assert_eq!(totals.discount_amount.round_dp(2), dec!(30));
    assert!(totals.stale);
    assert!(sessions.get(user).await.unwrap().is_some());

    // The discounted course leaving drops the preview.
    assert!(app
        .services()
        .cart
        .remove_item(user, discounted.course_id)
        .await
        .unwrap());
    assert!(sessions.get(user).await.unwrap().is_none());
    let totals = sessions.totals(user).await.expect("totals");
    assert_eq!(totals.discount_amount, dec!(0));
    assert_eq!(totals.final_total, dec!(0));
    assert!(totals.coupon.is_none());
}

#[tokio::test]
async fn totals_detect_a_preview_whose_lines_vanished() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    CouponFixture::percentage("SAVE20", dec!(20)).insert(&app.db).await;
    let line = app.add_course(user, dec!(250.00)).await;
    let sessions = &app.services().coupon_sessions;
    sessions.preview(user, "SAVE20").await.expect("preview");

    // Delete behind the cart service's back so the preview survives.
    use coursemart_api::entities::CartItem;
    use sea_orm::EntityTrait;
    CartItem::delete_by_id(line.id)
        .exec(app.db.as_ref())
        .await
        .unwrap();
    app.add_course(user, dec!(10)).await;

    let totals = sessions.totals(user).await.expect("totals");
    assert!(totals.coupon_removed);
    assert!(totals.coupon.is_none());
    assert_eq!(totals.final_total.round_dp(2), dec!(10));
    assert!(sessions.get(user).await.unwrap().is_none());
}

#[tokio::test]
async fn clearing_cart_or_coupon_drops_the_preview() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    CouponFixture::percentage("SAVE20", dec!(20)).insert(&app.db).await;
    app.add_course(user, dec!(100)).await;
    let sessions = &app.services().coupon_sessions;

    sessions.preview(user, "SAVE20").await.expect("preview");
    sessions.clear(user).await.expect("clear");
    assert!(sessions.get(user).await.unwrap().is_none());

    sessions.preview(user, "SAVE20").await.expect("preview");
    sessions.totals(user).await.expect("totals");
    assert!(app
        .cache
        .get(&format!("cart_totals:{}", user))
        .await
        .unwrap()
        .is_some());

    assert_eq!(app.services().cart.clear_cart(user).await.unwrap(), 1);
    assert!(sessions.get(user).await.unwrap().is_none());
    assert!(app
        .cache
        .get(&format!("cart_totals:{}", user))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn adding_the_same_course_twice_keeps_one_line() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let course = Uuid::new_v4();

    let first = app.add_course_with(user, course, None, None, dec!(30)).await;
    let second = app.add_course_with(user, course, None, None, dec!(35)).await;
    assert_eq!(first.id, second.id);

    let added = app
        .services()
        .cart
        .add_items(
            user,
            vec![
                coursemart_api::services::commerce::AddCartItemInput {
                    course_id: course,
                    category_id: None,
                    instructor_id: None,
                    price: dec!(30),
                },
                coursemart_api::services::commerce::AddCartItemInput {
                    course_id: Uuid::new_v4(),
                    category_id: None,
                    instructor_id: None,
                    price: dec!(12.50),
                },
            ],
        )
        .await
        .expect("bulk add");
    assert_eq!(added.len(), 1);
    assert_eq!(
        app.services().cart.lines_for_user(user).await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn http_flow_applies_coupon_and_reports_rejections() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    CouponFixture::percentage("SAVE20", dec!(20)).insert(&app.db).await;

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/cart/items",
            Some(user),
            Some(json!({ "course_id": Uuid::new_v4(), "price": "250.00" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/cart/coupon",
            Some(user),
            Some(json!({ "code": "save20" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["preview"]["code"], "SAVE20");

    let (status, body) = app
        .request(Method::GET, "/api/v1/cart/totals", Some(user), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stale"], false);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/cart/coupon",
            Some(user),
            Some(json!({ "code": "UNKNOWN" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, _) = app
        .request(Method::GET, "/api/v1/cart/totals", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request(Method::DELETE, "/api/v1/cart/coupon", Some(user), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .request(Method::GET, "/api/v1/cart/coupon", Some(user), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "up");
}
