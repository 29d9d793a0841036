//! Gateway webhook
//!
//! POST /webhooks/gateway: raw body and headers go to the reconciler, which
//! verifies the signature itself.
//!
//! Status codes drive the gateway's retries: 5xx is retried, anything else
//! is not. Permanent processing errors therefore answer 200.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use std::collections::HashMap;

use crate::state::AppState;
use crate::webhook::WebhookError;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/gateway", post(handle_webhook))
}

pub async fn handle_webhook(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let result = state
        .webhook
        .handle(
            header("x-signature"),
            header("x-request-id"),
            &body,
            &query,
            shared::util::now_millis(),
        )
        .await;

    match result {
        Ok(_) => StatusCode::OK,
        Err(WebhookError::SecretMissing) => {
            tracing::error!("Webhook secret not configured, rejecting delivery");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(e @ (WebhookError::Signature(_) | WebhookError::BadPayload)) => {
            tracing::warn!(error = %e, "Webhook rejected");
            StatusCode::BAD_REQUEST
        }
        Err(WebhookError::InProgress) => StatusCode::CONFLICT,
        Err(WebhookError::Processing(e)) if e.is_retryable() => StatusCode::INTERNAL_SERVER_ERROR,
        Err(WebhookError::Processing(e)) => {
            tracing::warn!(error = %e, "Webhook not processable, acknowledging");
            StatusCode::OK
        }
    }
}
