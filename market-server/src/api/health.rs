//! Health check endpoint

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let store = if state.store.get::<shared::models::Cart>("__health__").is_ok() {
        "ok"
    } else {
        "error"
    };
    Json(serde_json::json!({
        "status": "ok",
        "service": "market-server",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "store": store,
    }))
}
