use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::time::Instant;

use crate::handlers::AppState;

/// Component health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub version: &'static str,
    pub timestamp: String,
    pub database: ComponentStatus,
    pub database_latency_ms: u128,
}

/// Readiness probe: the service is up when the database answers a ping.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let database = match crate::db::check_connection(&state.db).await {
        Ok(()) => ComponentStatus::Up,
        Err(_) => ComponentStatus::Down,
    };

    let body = HealthResponse {
        status: database,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        database,
        database_latency_ms: start.elapsed().as_millis(),
    };
    let status = match database {
        ComponentStatus::Up => StatusCode::OK,
        ComponentStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(body))
}
