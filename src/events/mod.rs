use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    /// Events are notifications; losing one never undoes the committed work.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(err) = self.send(event).await {
            warn!(error = %err, "dropping event");
        }
    }
}

/// Things that happened to carts and coupons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    CartItemAdded {
        user_id: Uuid,
        course_id: Uuid,
    },
    CartItemRemoved {
        user_id: Uuid,
        course_id: Uuid,
    },
    CartCleared(Uuid),

    CouponPreviewed {
        user_id: Uuid,
        coupon_id: Uuid,
        discount_amount: Decimal,
    },
    CouponPreviewCleared {
        user_id: Uuid,
    },
    CouponRedeemed {
        coupon_id: Uuid,
        user_id: Uuid,
        payment_id: Uuid,
        discount_amount: Decimal,
        redeemed_at: DateTime<Utc>,
    },
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::CouponRedeemed {
                coupon_id,
                user_id,
                payment_id,
                discount_amount,
                redeemed_at,
            } => {
                info!(
                    %coupon_id,
                    %user_id,
                    %payment_id,
                    %discount_amount,
                    %redeemed_at,
                    "coupon redeemed"
                );
            }
            Event::CouponPreviewed {
                user_id,
                coupon_id,
                discount_amount,
            } => {
                info!(%user_id, %coupon_id, %discount_amount, "coupon previewed");
            }
            Event::CouponPreviewCleared { user_id } => {
                info!(%user_id, "coupon preview cleared");
            }
            Event::CartItemAdded { user_id, course_id } => {
                info!(%user_id, %course_id, "cart item added");
            }
            Event::CartItemRemoved { user_id, course_id } => {
                info!(%user_id, %course_id, "cart item removed");
            }
            Event::CartCleared(user_id) => {
                info!(%user_id, "cart cleared");
            }
        }
    }

    warn!("Event processing loop has ended");
}
