//! Order endpoints: checkout, listings, status changes, disputes, PIX

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use shared::order::Order;
use shared::util::now_millis;

use crate::auth::CallerIdentity;
use crate::orders::{
    CreateOrderRequest, DisputeRequest, ListQuery, OrderPage, PaymentStatusView, StatusChange,
    TrackingUpdate,
};
use crate::state::AppState;

use super::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/orders", post(create_order).get(list_buyer_orders))
        .route("/api/orders/{id}", get(get_order))
        .route("/api/orders/{id}/payment-status", get(payment_status))
        .route("/api/orders/{id}/pix", post(regenerate_pix))
        .route("/api/orders/{id}/dispute", post(open_dispute))
        .route("/api/seller/orders", get(list_seller_orders))
        .route("/api/seller/orders/{id}/status", put(update_status))
        .route("/api/seller/orders/{id}/tracking", put(update_tracking))
}

/// POST /api/orders
pub async fn create_order(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Json(request): Json<CreateOrderRequest>,
) -> ApiResult<Order> {
    let order = state
        .orders
        .create_order(&identity, request, now_millis())
        .await?;
    Ok(Json(order))
}

/// GET /api/orders
pub async fn list_buyer_orders(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Query(query): Query<ListQuery>,
) -> ApiResult<OrderPage> {
    Ok(Json(state.orders.list_buyer_orders(&identity, &query)?))
}

/// GET /api/seller/orders
pub async fn list_seller_orders(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Query(query): Query<ListQuery>,
) -> ApiResult<OrderPage> {
    Ok(Json(state.orders.list_seller_orders(&identity, &query)?))
}

/// GET /api/orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Path(order_id): Path<String>,
) -> ApiResult<Order> {
    Ok(Json(state.orders.get_order(&identity, &order_id)?))
}

/// GET /api/orders/:id/payment-status
pub async fn payment_status(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Path(order_id): Path<String>,
) -> ApiResult<PaymentStatusView> {
    Ok(Json(state.orders.payment_status(&identity, &order_id).await?))
}

/// POST /api/orders/:id/pix
pub async fn regenerate_pix(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Path(order_id): Path<String>,
) -> ApiResult<Order> {
    let order = state
        .orders
        .regenerate_pix(&identity, &order_id, now_millis())
        .await?;
    Ok(Json(order))
}

/// POST /api/orders/:id/dispute
pub async fn open_dispute(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Path(order_id): Path<String>,
    Json(request): Json<DisputeRequest>,
) -> ApiResult<Order> {
    let order = state
        .orders
        .open_dispute(&identity, &order_id, request, now_millis())
        .await?;
    Ok(Json(order))
}

/// PUT /api/seller/orders/:id/status
pub async fn update_status(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Path(order_id): Path<String>,
    Json(change): Json<StatusChange>,
) -> ApiResult<Order> {
    let order = state
        .orders
        .update_status(&identity, &order_id, change, now_millis())
        .await?;
    Ok(Json(order))
}

/// PUT /api/seller/orders/:id/tracking
pub async fn update_tracking(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Path(order_id): Path<String>,
    Json(update): Json<TrackingUpdate>,
) -> ApiResult<Order> {
    Ok(Json(state.orders.update_tracking(
        &identity,
        &order_id,
        update,
        now_millis(),
    )?))
}
