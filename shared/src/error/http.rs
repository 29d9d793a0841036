//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Success
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::NotFound
            | Self::OrderNotFound
            | Self::ProductNotFound
            | Self::VariantNotFound
            | Self::WalletNotFound
            | Self::DeliveryCodeInvalid
            | Self::DeliveryCodeNotIssued => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::InvalidTransition
            | Self::DuplicateProcessing
            | Self::InsufficientStock
            | Self::DeliveryAlreadyConfirmed
            | Self::DisputeAlreadyOpen => StatusCode::CONFLICT,

            // 401 Unauthorized
            Self::NotAuthenticated | Self::TokenExpired | Self::TokenInvalid => {
                StatusCode::UNAUTHORIZED
            }

            // 403 Forbidden
            Self::PermissionDenied
            | Self::SellerRequired
            | Self::SellerNotConnected => StatusCode::FORBIDDEN,

            // 502 Bad Gateway (upstream rejected the call)
            Self::GatewayError | Self::RefundFailed | Self::TransferFailed => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable (transient errors, client can retry)
            Self::GatewayUnavailable | Self::SystemBusy => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            Self::InternalError
            | Self::DatabaseError
            | Self::WebhookSecretMissing
            | Self::GatewayConfigMissing => StatusCode::INTERNAL_SERVER_ERROR,

            // 400 Bad Request (default for validation/business errors)
            _ => StatusCode::BAD_REQUEST,
        }
    }
}
