//! Unified service-layer error type
//!
//! `ServiceError` bridges storage and gateway errors with the API-layer error
//! (`AppError`), so services can use `?` on both without mapping by hand.

use axum::response::IntoResponse;
use shared::error::{AppError, ErrorCode};

use crate::gateway::GatewayError;
use crate::store::StorageError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Service-layer error with two variants.
///
/// - `Internal`: storage/infrastructure errors (logged, mapped to InternalError)
/// - `App`: business-rule errors (passed through to the client)
#[derive(Debug)]
pub enum ServiceError {
    /// Storage or infrastructure error (redb, serde, ...)
    Internal(BoxError),
    /// Business-rule error (already an AppError with the correct ErrorCode)
    App(AppError),
}

impl ServiceError {
    /// Whether the caller may retry the same request later.
    /// Infrastructure failures and 5xx business errors are retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Internal(_) => true,
            ServiceError::App(e) => e.http_status().is_server_error(),
        }
    }

    /// Error code as seen by the client
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::Internal(_) => ErrorCode::InternalError,
            ServiceError::App(e) => e.code,
        }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Internal(e) => write!(f, "internal: {e}"),
            ServiceError::App(e) => write!(f, "{}: {}", e.code, e.message),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        ServiceError::Internal(e.into())
    }
}

impl From<BoxError> for ServiceError {
    fn from(e: BoxError) -> Self {
        ServiceError::Internal(e)
    }
}

impl From<AppError> for ServiceError {
    fn from(e: AppError) -> Self {
        ServiceError::App(e)
    }
}

/// Gateway failures never expose the provider's response to clients
impl From<GatewayError> for ServiceError {
    fn from(e: GatewayError) -> Self {
        tracing::warn!(error = %e, "Payment gateway call failed");
        let code = match e {
            GatewayError::Unavailable(_) => ErrorCode::GatewayUnavailable,
            GatewayError::NotConfigured(_) => ErrorCode::GatewayConfigMissing,
            GatewayError::Api { .. } | GatewayError::Decode(_) => ErrorCode::GatewayError,
        };
        ServiceError::App(AppError::new(code))
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::App(app_err) => app_err,
            ServiceError::Internal(err) => {
                tracing::error!(error = %err, "Service internal error");
                AppError::new(ErrorCode::InternalError)
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

/// Convenience type alias for service-layer results
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Run derived `validator` rules, reporting failures as `VALIDATION_FAILED`
pub fn validate(request: &impl validator::Validate) -> Result<(), AppError> {
    request
        .validate()
        .map_err(|e| AppError::validation(e.to_string()))
}
