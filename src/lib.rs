//! CourseMart API Library
//!
//! Course carts and the coupon discount engine behind them.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod repositories;
pub mod services;

use axum::{
    routing::{delete, get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub cache: Arc<dyn cache::CacheBackend>,
    pub services: handlers::AppServices,
}

/// Cart and coupon routes.
pub fn api_routes() -> Router<AppState> {
    let cart = Router::new()
        .route(
            "/cart",
            get(handlers::cart::get_cart).delete(handlers::cart::clear_cart),
        )
        .route("/cart/items", post(handlers::cart::add_cart_item))
        .route("/cart/items/bulk", post(handlers::cart::add_cart_items))
        .route(
            "/cart/items/:course_id",
            delete(handlers::cart::remove_cart_item),
        )
        .route(
            "/cart/coupon",
            post(handlers::coupons::apply_coupon)
                .get(handlers::coupons::get_applied_coupon)
                .delete(handlers::coupons::remove_coupon),
        )
        .route("/cart/totals", get(handlers::coupons::cart_totals));

    // Both routes share the `:coupon` segment: a code for checks, an id for usage.
    let coupons = Router::new()
        .route("/coupons/redemptions", post(handlers::coupons::redeem_coupon))
        .route("/coupons/:coupon/check", get(handlers::coupons::check_coupon))
        .route("/coupons/:coupon/usage", get(handlers::coupons::coupon_usage));

    cart.merge(coupons)
}

/// The full application router with its state attached; transport layers
/// (tracing, CORS, timeouts) are added by the binary.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
}
