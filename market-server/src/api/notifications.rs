//! In-app notifications of the caller

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use shared::error::AppError;
use shared::models::Notification;

use crate::auth::CallerIdentity;
use crate::notify;
use crate::state::AppState;

use super::ApiResult;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/{id}/read", post(mark_read))
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    pub limit: Option<usize>,
}

/// GET /api/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Vec<Notification>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let items = notify::list_for_user(&state.store, &identity.user_id, limit).map_err(|e| {
        tracing::error!(error = %e, "Notification query failed");
        AppError::database("Failed to load notifications")
    })?;
    Ok(Json(items))
}

/// POST /api/notifications/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    let found = notify::mark_read(&state.store, &identity.user_id, &id).map_err(|e| {
        tracing::error!(error = %e, "Notification update failed");
        AppError::database("Failed to update notification")
    })?;
    if !found {
        return Err(AppError::not_found("Notification"));
    }
    Ok(Json(serde_json::json!({ "id": id, "is_read": true })))
}
