use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::common::{created_response, no_content_response, success_response, ActingUser};
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::commerce::AddCartItemInput;

#[derive(Debug, Deserialize)]
pub struct AddCartItemsRequest {
    pub items: Vec<AddCartItemInput>,
}

#[derive(Debug, Serialize)]
pub struct ClearCartResponse {
    pub removed: u64,
}

/// `GET /cart`
pub async fn get_cart(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
) -> Result<impl IntoResponse, ServiceError> {
    let lines = state.services.cart.lines_for_user(user_id).await?;
    Ok(success_response(lines))
}

/// `POST /cart/items`
pub async fn add_cart_item(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Json(payload): Json<AddCartItemInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let line = state.services.cart.add_item(user_id, payload).await?;
    Ok(created_response(line))
}

/// `POST /cart/items/bulk`
pub async fn add_cart_items(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Json(payload): Json<AddCartItemsRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let lines = state.services.cart.add_items(user_id, payload.items).await?;
    Ok(created_response(lines))
}

/// `DELETE /cart/items/:course_id`
pub async fn remove_cart_item(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    if state.services.cart.remove_item(user_id, course_id).await? {
        Ok(no_content_response())
    } else {
        Err(ServiceError::NotFound(format!(
            "Course {} is not in the cart",
            course_id
        )))
    }
}

/// `DELETE /cart`
pub async fn clear_cart(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
) -> Result<impl IntoResponse, ServiceError> {
    let removed = state.services.cart.clear_cart(user_id).await?;
    Ok(success_response(ClearCartResponse { removed }))
}
