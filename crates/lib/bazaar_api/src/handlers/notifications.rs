//! Notification dispatch handler.

use axum::Json;
use axum::extract::State;
use bazaar_core::notifications::{NotificationOutcome, NotificationRequest};

use crate::AppState;
use crate::error::AppResult;
use crate::response::ApiResponse;

/// `POST /api/notifications`
pub async fn send_notification(
    State(state): State<AppState>,
    Json(body): Json<NotificationRequest>,
) -> AppResult<Json<ApiResponse<NotificationOutcome>>> {
    let outcome = state.notifications.send(body).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}
