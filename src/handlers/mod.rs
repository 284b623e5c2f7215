pub mod cart;
pub mod common;
pub mod coupons;
pub mod health;

use crate::cache::CacheBackend;
use crate::config::CouponConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::commerce::CartService;
use crate::services::coupons::{
    CouponAnalytics, CouponSessionService, CouponValidator, PreviewStore, RedemptionAccountant,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub cart: Arc<CartService>,
    pub coupon_sessions: Arc<CouponSessionService>,
    pub redemptions: Arc<RedemptionAccountant>,
    pub coupon_analytics: Arc<CouponAnalytics>,
}

impl AppServices {
    /// Wires the cart and coupon services over one pool, cache and event channel.
    pub fn new(
        db_pool: Arc<DbPool>,
        cache: Arc<dyn CacheBackend>,
        event_sender: Arc<EventSender>,
        coupon_config: &CouponConfig,
    ) -> Self {
        let previews = PreviewStore::new(cache.clone(), coupon_config);

        let cart = Arc::new(CartService::new(
            db_pool.clone(),
            previews.clone(),
            event_sender.clone(),
        ));
        let coupon_sessions = Arc::new(CouponSessionService::new(
            CouponValidator::new(db_pool.clone()),
            cart.clone(),
            previews,
            cache.clone(),
            coupon_config,
            event_sender.clone(),
        ));
        let redemptions = Arc::new(RedemptionAccountant::new(
            db_pool.clone(),
            cache,
            event_sender,
        ));
        let coupon_analytics = Arc::new(CouponAnalytics::new(db_pool));

        Self {
            cart,
            coupon_sessions,
            redemptions,
            coupon_analytics,
        }
    }
}
