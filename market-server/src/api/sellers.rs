//! Seller gateway connection endpoints

use axum::extract::State;
use axum::routing::get;
use axum::{Extension, Json, Router};
use shared::util::now_millis;

use crate::auth::CallerIdentity;
use crate::sellers::{ConnectAction, ConnectResponse, ConnectionStatus};
use crate::state::AppState;

use super::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/seller/gateway",
        get(connection_status).post(connect).delete(disconnect),
    )
}

/// GET /api/seller/gateway
pub async fn connection_status(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
) -> ApiResult<ConnectionStatus> {
    let tenant_id = identity.seller_tenant()?;
    Ok(Json(state.sellers.status(tenant_id)?))
}

/// POST /api/seller/gateway
///
/// `{"action":"url"}` starts the OAuth flow;
/// `{"action":"callback","code":..,"state":..}` completes it.
pub async fn connect(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Json(action): Json<ConnectAction>,
) -> ApiResult<ConnectResponse> {
    let response = state
        .sellers
        .handle(&identity, action, now_millis())
        .await?;
    Ok(Json(response))
}

/// DELETE /api/seller/gateway
pub async fn disconnect(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
) -> ApiResult<ConnectionStatus> {
    let tenant_id = identity.seller_tenant()?;
    Ok(Json(state.sellers.disconnect(tenant_id, now_millis())?))
}
