//! Delivery code endpoints

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use shared::order::DeliveryCode;
use shared::util::now_millis;

use crate::auth::CallerIdentity;
use crate::orders::{ConfirmDeliveryRequest, DeliveryConfirmation};
use crate::state::AppState;

use super::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/orders/{id}/delivery-code", get(delivery_code))
        .route("/api/delivery/confirm", post(confirm_delivery))
}

/// GET /api/orders/:id/delivery-code
pub async fn delivery_code(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Path(order_id): Path<String>,
) -> ApiResult<DeliveryCode> {
    Ok(Json(state.orders.delivery_code(&identity, &order_id)?))
}

/// POST /api/delivery/confirm
///
/// Body carries either the scanned `qr_code` or the `order_id`.
pub async fn confirm_delivery(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Json(request): Json<ConfirmDeliveryRequest>,
) -> ApiResult<DeliveryConfirmation> {
    Ok(Json(state.orders.confirm_delivery(
        &identity,
        request,
        now_millis(),
    )?))
}
