//! Audit log of the caller's seller tenant

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Deserialize;
use shared::error::AppError;

use crate::audit::{self, AuditEntry};
use crate::auth::CallerIdentity;
use crate::state::AppState;

use super::ApiResult;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 500;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/seller/audit", get(list_audit))
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

/// GET /api/seller/audit
pub async fn list_audit(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Vec<AuditEntry>> {
    let tenant_id = identity.seller_tenant()?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let entries = audit::query(&state.store, tenant_id, limit).map_err(|e| {
        tracing::error!(error = %e, "Audit query failed");
        AppError::database("Failed to load audit log")
    })?;
    Ok(Json(entries))
}
