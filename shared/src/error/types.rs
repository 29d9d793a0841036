//! `AppError` and its JSON response body

use super::codes::ErrorCode;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Application error with structured error code and details
///
/// Carries a stable [`ErrorCode`], a client-safe message and optional
/// structured details (offending product id, current status, ...).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    /// The error code identifying the type of error
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    pub details: Option<HashMap<String, Value>>,
}

impl AppError {
    /// Create a new error with the default message for the error code
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            code,
            details: None,
        }
    }

    /// Create a new error with a custom message
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Add a detail entry to this error
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ValidationFailed, msg)
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        let r = resource.into();
        Self::with_message(ErrorCode::NotFound, format!("{} not found", r))
            .with_detail("resource", r)
    }

    pub fn not_authenticated() -> Self {
        Self::new(ErrorCode::NotAuthenticated)
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::PermissionDenied, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InternalError, msg)
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::DatabaseError, msg)
    }

    pub fn invalid_token(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::TokenInvalid, msg)
    }

    pub fn token_expired() -> Self {
        Self::new(ErrorCode::TokenExpired)
    }

    /// Requested quantity exceeds what is in stock
    pub fn insufficient_stock(product_id: impl Into<String>, available: i64) -> Self {
        Self::new(ErrorCode::InsufficientStock)
            .with_detail("product_id", product_id.into())
            .with_detail("available", available)
    }

    /// Status change rejected by the order state machine
    pub fn invalid_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        let (from, to) = (from.into(), to.into());
        Self::with_message(
            ErrorCode::InvalidTransition,
            format!("Cannot change order status from {from} to {to}"),
        )
        .with_detail("from", from)
        .with_detail("to", to)
    }

    /// An identical request is still running
    pub fn duplicate_processing() -> Self {
        Self::new(ErrorCode::DuplicateProcessing)
    }

    pub fn seller_not_connected() -> Self {
        Self::new(ErrorCode::SellerNotConnected)
    }

    /// Upstream gateway failure; the raw provider body is never exposed
    pub fn gateway() -> Self {
        Self::new(ErrorCode::GatewayError)
    }

    pub fn insufficient_balance() -> Self {
        Self::new(ErrorCode::InsufficientBalance)
    }

    /// 9xxx codes are our own faults and get logged at error level
    pub fn is_system(&self) -> bool {
        self.code.code() >= 9000
    }
}

/// JSON body of every error response
///
/// `code` is the numeric [`ErrorCode`]; `details` carries the structured
/// context attached with [`AppError::with_detail`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Value>>,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.code.code(),
            message: err.message.clone(),
            details: err.details.clone(),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        if self.is_system() {
            tracing::error!(code = %self.code, message = %self.message, "Request failed on a system error");
        }
        (self.http_status(), axum::Json(ErrorBody::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_new() {
        let err = AppError::new(ErrorCode::OrderNotFound);
        assert_eq!(err.code, ErrorCode::OrderNotFound);
        assert_eq!(err.message, "Order not found");
        assert!(err.details.is_none());
    }

    #[test]
    fn test_app_error_with_detail() {
        let err = AppError::validation("quantity must be positive")
            .with_detail("field", "quantity")
            .with_detail("min", 1);

        assert_eq!(err.code, ErrorCode::ValidationFailed);
        let details = err.details.unwrap();
        assert_eq!(details.get("field").unwrap(), "quantity");
        assert_eq!(details.get("min").unwrap(), 1);
    }

    #[test]
    fn test_insufficient_stock_carries_product() {
        let err = AppError::insufficient_stock("prod-1", 2);
        assert_eq!(err.code, ErrorCode::InsufficientStock);
        assert_eq!(err.http_status(), StatusCode::CONFLICT);
        let details = err.details.unwrap();
        assert_eq!(details.get("product_id").unwrap(), "prod-1");
        assert_eq!(details.get("available").unwrap(), 2);
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = AppError::invalid_transition("pending", "shipped");
        assert_eq!(err.code, ErrorCode::InvalidTransition);
        assert_eq!(err.message, "Cannot change order status from pending to shipped");
    }

    #[test]
    fn test_not_found_detail() {
        let err = AppError::not_found("Wallet");
        assert_eq!(err.message, "Wallet not found");
        assert!(err.details.as_ref().unwrap().contains_key("resource"));
    }

    #[test]
    fn test_is_system() {
        assert!(AppError::internal("boom").is_system());
        assert!(AppError::database("closed").is_system());
        assert!(!AppError::gateway().is_system());
        assert!(!AppError::duplicate_processing().is_system());
    }

    #[test]
    fn test_error_body_json() {
        let err = AppError::seller_not_connected().with_detail("seller_id", "s1");
        let json = serde_json::to_value(ErrorBody::from(&err)).unwrap();
        assert_eq!(json["code"], 3003);
        assert_eq!(json["details"]["seller_id"], "s1");

        let bare = serde_json::to_string(&ErrorBody::from(&AppError::gateway())).unwrap();
        assert!(!bare.contains("details"));
    }
}
