//! HTTP API
//!
//! Everything under `/api` requires a bearer token. `/health` and the
//! gateway webhook are public; the webhook authenticates by signature.

pub mod audit;
pub mod cart;
pub mod delivery;
pub mod health;
pub mod notifications;
pub mod orders;
pub mod sellers;
pub mod wallet;
pub mod webhook;

use axum::{Router, middleware};
use http::{HeaderName, HeaderValue};
use shared::error::AppError;
use tower::ServiceBuilder;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::auth_middleware;
use crate::state::AppState;

pub type ApiResult<T> = Result<axum::Json<T>, AppError>;

const REQUEST_ID_HEADER: &str = "x-request-id";
/// In-flight request cap across the whole router
const MAX_IN_FLIGHT: usize = 256;

/// Request id for requests that arrive without one
#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .merge(cart::router())
        .merge(orders::router())
        .merge(delivery::router())
        .merge(wallet::router())
        .merge(sellers::router())
        .merge(notifications::router())
        .merge(audit::router())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // The webhook is merged after the request-id layers: its x-request-id
    // is part of the signed manifest and must reach it untouched.
    Router::new()
        .merge(health::router())
        .merge(authenticated)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    HeaderName::from_static(REQUEST_ID_HEADER),
                    XRequestId,
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER))),
        )
        .merge(webhook::router())
        .layer(CompressionLayer::new())
        .layer(ConcurrencyLimitLayer::new(MAX_IN_FLIGHT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
