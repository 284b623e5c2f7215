//! Coupon endpoints: applying a code to the cart, checkout totals, code
//! checks, redemption at payment completion and usage figures.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::common::{created_response, no_content_response, success_response, validate_input, ActingUser};
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::coupons::RedemptionRequest;

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyCouponRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
}

/// `POST /cart/coupon`
pub async fn apply_coupon(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Json(payload): Json<ApplyCouponRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let result = state
        .services
        .coupon_sessions
        .preview(user_id, &payload.code)
        .await?;
    Ok(success_response(result))
}

/// `GET /cart/coupon`
pub async fn get_applied_coupon(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
) -> Result<impl IntoResponse, ServiceError> {
    let preview = state
        .services
        .coupon_sessions
        .get(user_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("No coupon applied to cart".to_string()))?;
    Ok(success_response(preview))
}

/// `DELETE /cart/coupon`
pub async fn remove_coupon(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.coupon_sessions.clear(user_id).await?;
    Ok(no_content_response())
}

/// `GET /cart/totals`
pub async fn cart_totals(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
) -> Result<impl IntoResponse, ServiceError> {
    let totals = state.services.coupon_sessions.totals(user_id).await?;
    Ok(success_response(totals))
}

/// `GET /coupons/:coupon/check`, where `:coupon` is the code
pub async fn check_coupon(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let check = state.services.coupon_sessions.check(user_id, &code).await?;
    Ok(success_response(check))
}

/// `POST /coupons/redemptions`, called by the payment flow once a payment
/// has completed.
pub async fn redeem_coupon(
    State(state): State<AppState>,
    Json(payload): Json<RedemptionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let redemption = state.services.redemptions.redeem(payload).await?;
    Ok(created_response(redemption))
}

/// `GET /coupons/:coupon/usage`, where `:coupon` is the coupon id
pub async fn coupon_usage(
    State(state): State<AppState>,
    Path(coupon_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let stats = state.services.coupon_analytics.usage_stats(coupon_id).await?;
    Ok(success_response(stats))
}
