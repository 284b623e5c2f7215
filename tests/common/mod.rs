#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use coursemart_api::{
    cache::InMemoryCache,
    config::AppConfig,
    db,
    entities::{
        coupon::{self, ApplicableTo, CouponType},
        CartLine, CouponModel,
    },
    events::{Event, EventSender},
    handlers::{common::USER_ID_HEADER, AppServices},
    services::commerce::AddCartItemInput,
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Application wired over a throwaway SQLite file and an in-memory cache.
///
/// The pool holds a single connection, so concurrent transactions queue on
/// the pool instead of failing with `SQLITE_BUSY`.
pub struct TestApp {
    pub state: AppState,
    pub db: Arc<DatabaseConnection>,
    pub cache: Arc<InMemoryCache>,
    pub events: mpsc::Receiver<Event>,
    router: Router,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("coursemart_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.db_acquire_timeout_secs = 30;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool).await.expect("migrations");
        let db_arc = Arc::new(pool);

        let cache = Arc::new(InMemoryCache::new());
        let (tx, rx) = mpsc::channel(1024);
        let event_sender = EventSender::new(tx);

        let services = AppServices::new(
            db_arc.clone(),
            cache.clone(),
            Arc::new(event_sender.clone()),
            &cfg.coupons,
        );
        let state = AppState {
            db: db_arc.clone(),
            config: cfg,
            event_sender,
            cache: cache.clone(),
            services,
        };

        Self {
            router: coursemart_api::app(state.clone()),
            state,
            db: db_arc,
            cache,
            events: rx,
            _dir: dir,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    /// Puts a course in the user's cart at the given price.
    pub async fn add_course(&self, user_id: Uuid, price: Decimal) -> CartLine {
        self.add_course_with(user_id, Uuid::new_v4(), None, None, price)
            .await
    }

    pub async fn add_course_with(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        category_id: Option<Uuid>,
        instructor_id: Option<Uuid>,
        price: Decimal,
    ) -> CartLine {
        self.services()
            .cart
            .add_item(
                user_id,
                AddCartItemInput {
                    course_id,
                    category_id,
                    instructor_id,
                    price,
                },
            )
            .await
            .expect("add course to cart")
    }

    /// Drains every event published so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Sends one request through the router and decodes the JSON body.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        user_id: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user_id {
            builder = builder.header(USER_ID_HEADER, user_id.to_string());
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, json)
    }
}

/// Coupon row builder with sensible defaults: active, unlimited, valid from a
/// day ago to a day from now, applicable to every course.
#[derive(Debug, Clone)]
pub struct CouponFixture {
    pub code: String,
    pub coupon_type: CouponType,
    pub value: Decimal,
    pub minimum_amount: Option<Decimal>,
    pub maximum_discount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub applicable_to: ApplicableTo,
    pub applicable_ids: Vec<Uuid>,
    pub is_active: bool,
}

impl CouponFixture {
    pub fn percentage(code: &str, value: Decimal) -> Self {
        let now = Utc::now();
        Self {
            code: code.to_string(),
            coupon_type: CouponType::Percentage,
            value,
            minimum_amount: None,
            maximum_discount: None,
            usage_limit: None,
            used_count: 0,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            applicable_to: ApplicableTo::AllCourses,
            applicable_ids: Vec::new(),
            is_active: true,
        }
    }

    pub fn fixed(code: &str, value: Decimal) -> Self {
        Self {
            coupon_type: CouponType::FixedAmount,
            ..Self::percentage(code, value)
        }
    }

    pub fn usage_limit(mut self, limit: i32) -> Self {
        self.usage_limit = Some(limit);
        self
    }

    pub fn minimum(mut self, amount: Decimal) -> Self {
        self.minimum_amount = Some(amount);
        self
    }

    pub fn scoped(mut self, applicable_to: ApplicableTo, ids: Vec<Uuid>) -> Self {
        self.applicable_to = applicable_to;
        self.applicable_ids = ids;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn window(mut self, from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.valid_from = from;
        self.valid_until = until;
        self
    }

    pub async fn insert(self, db: &DatabaseConnection) -> CouponModel {
        let now = Utc::now();
        let ids = if self.applicable_ids.is_empty() {
            None
        } else {
            Some(serde_json::to_value(&self.applicable_ids).expect("ids json"))
        };

        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(self.code.to_uppercase()),
            title: Set(format!("{} coupon", self.code)),
            description: Set(None),
            coupon_type: Set(self.coupon_type),
            value: Set(self.value),
            minimum_amount: Set(self.minimum_amount),
            maximum_discount: Set(self.maximum_discount),
            usage_limit: Set(self.usage_limit),
            used_count: Set(self.used_count),
            valid_from: Set(self.valid_from),
            valid_until: Set(self.valid_until),
            applicable_to: Set(self.applicable_to),
            applicable_ids: Set(ids),
            is_active: Set(self.is_active),
            created_by: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .expect("insert coupon")
    }
}

/// Re-reads a coupon row.
pub async fn reload(db: &DatabaseConnection, coupon_id: Uuid) -> CouponModel {
    coursemart_api::repositories::CouponRepository::find_by_id(db, coupon_id)
        .await
        .expect("query coupon")
        .expect("coupon exists")
}
