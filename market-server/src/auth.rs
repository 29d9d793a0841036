//! Bearer JWT authentication
//!
//! Tokens are issued by the identity service; this server only verifies them
//! and turns the claims into a [`CallerIdentity`] request extension.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};

use crate::state::AppState;

/// JWT claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Seller tenant owned by the user, if any
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Expiration (Unix timestamp seconds)
    pub exp: usize,
    /// Issued at (Unix timestamp seconds)
    pub iat: usize,
}

/// Authenticated caller extracted from the JWT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
    pub email: String,
    pub name: Option<String>,
    pub tenant_id: Option<String>,
}

impl CallerIdentity {
    /// Seller tenant of the caller, or `SELLER_REQUIRED`
    pub fn seller_tenant(&self) -> Result<&str, AppError> {
        self.tenant_id
            .as_deref()
            .ok_or_else(|| AppError::new(ErrorCode::SellerRequired))
    }
}

const JWT_EXPIRY_HOURS: i64 = 24;

/// Create a token (local tooling and tests)
pub fn create_token(
    identity: &CallerIdentity,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: identity.user_id.clone(),
        email: identity.email.clone(),
        name: identity.name.clone(),
        tenant_id: identity.tenant_id.clone(),
        exp: (now + chrono::Duration::hours(JWT_EXPIRY_HOURS)).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify a bearer token
pub fn verify_token(token: &str, secret: &str) -> Result<CallerIdentity, AppError> {
    let token_data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("JWT validation failed: {e}");
        match e.kind() {
            ErrorKind::ExpiredSignature => AppError::token_expired(),
            _ => AppError::invalid_token("Invalid token"),
        }
    })?;

    let claims = token_data.claims;
    Ok(CallerIdentity {
        user_id: claims.sub,
        email: claims.email,
        name: claims.name,
        tenant_id: claims.tenant_id.filter(|t| !t.is_empty()),
    })
}

/// Middleware that verifies the Authorization header and inserts the caller
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = request
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::not_authenticated().into_response())?;

    let identity = verify_token(token, &state.config.jwt_secret).map_err(IntoResponse::into_response)?;
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}
