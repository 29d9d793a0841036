//! Buyer cart endpoints

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use shared::models::Cart;
use shared::util::now_millis;

use crate::auth::CallerIdentity;
use crate::cart::{AddItemRequest, UpdateItemRequest};
use crate::state::AppState;

use super::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/cart", get(get_cart).delete(clear_cart))
        .route("/api/cart/items", post(add_item))
        .route("/api/cart/items/{item_id}", put(update_item))
}

/// GET /api/cart
pub async fn get_cart(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
) -> ApiResult<Cart> {
    Ok(Json(state.carts.get(&identity.user_id, now_millis())?))
}

/// POST /api/cart/items
pub async fn add_item(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Json(request): Json<AddItemRequest>,
) -> ApiResult<Cart> {
    Ok(Json(state.carts.add_item(
        &identity.user_id,
        &request,
        now_millis(),
    )?))
}

/// PUT /api/cart/items/:item_id
pub async fn update_item(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Path(item_id): Path<String>,
    Json(request): Json<UpdateItemRequest>,
) -> ApiResult<Cart> {
    Ok(Json(state.carts.update_item(
        &identity.user_id,
        &item_id,
        &request,
        now_millis(),
    )?))
}

/// DELETE /api/cart
pub async fn clear_cart(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
) -> ApiResult<Cart> {
    state.carts.clear(&identity.user_id)?;
    let now = now_millis();
    Ok(Json(Cart::empty(identity.user_id, now)))
}
