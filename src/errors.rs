use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};

use crate::cache::CacheError;

/// Error body returned by every handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Unprocessable Entity")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Machine-readable reason for coupon rejections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

/// Why a coupon could not be previewed or redeemed.
///
/// These are expected business outcomes, not infrastructure failures. Each one
/// maps to its own message so the storefront can tell the buyer exactly what
/// went wrong. None of them is worth retrying unchanged: capacity and per-user
/// reuse are final, and `ConcurrencyConflict` means the last use went to
/// another redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponRejection {
    #[error("coupon code not found")]
    NotFound,
    #[error("coupon is not active")]
    Inactive,
    #[error("coupon is not valid yet")]
    NotYetValid,
    #[error("coupon has expired")]
    Expired,
    #[error("coupon usage limit has been reached")]
    UsageLimitReached,
    #[error("coupon has already been used by this account")]
    AlreadyRedeemed,
    #[error("cart does not meet the coupon's minimum amount")]
    MinimumNotMet,
    #[error("coupon does not apply to any course in the cart")]
    NotApplicable,
    #[error("cart is empty")]
    EmptyCart,
    #[error("coupon just ran out")]
    ConcurrencyConflict,
}

impl CouponRejection {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Inactive => "inactive",
            Self::NotYetValid => "not_yet_valid",
            Self::Expired => "expired",
            Self::UsageLimitReached => "usage_limit_reached",
            Self::AlreadyRedeemed => "already_redeemed",
            Self::MinimumNotMet => "minimum_not_met",
            Self::NotApplicable => "not_applicable",
            Self::EmptyCart => "empty_cart",
            Self::ConcurrencyConflict => "concurrency_conflict",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::AlreadyRedeemed | Self::ConcurrencyConflict => StatusCode::CONFLICT,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Coupon rejected: {0}")]
    CouponRejected(#[from] CouponRejection),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl From<CacheError> for ServiceError {
    fn from(err: CacheError) -> Self {
        ServiceError::CacheError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// The coupon rejection carried by this error, if it is one.
    pub fn rejection(&self) -> Option<CouponRejection> {
        match self {
            Self::CouponRejected(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::CouponRejected(reason) => reason.status_code(),
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::DatabaseError(_)
            | Self::InternalError(_)
            | Self::CacheError(_)
            | Self::SerializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::CacheError(_) | Self::SerializationError(_) => {
                "Internal server error".to_string()
            }
            Self::CouponRejected(reason) => reason.to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            code: self.rejection().map(|reason| reason.code().to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
