//! Unified error codes for the marketplace backend
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 3xxx: Seller / gateway connection errors
//! - 4xxx: Order errors
//! - 5xxx: Payment errors
//! - 6xxx: Product / inventory errors
//! - 7xxx: Wallet errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values so clients can branch on
/// them without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,

    // ==================== 1xxx: Auth ====================
    /// Caller is not authenticated
    NotAuthenticated = 1001,
    /// Token has expired
    TokenExpired = 1003,
    /// Token is invalid
    TokenInvalid = 1004,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,
    /// Caller must own a seller account
    SellerRequired = 2002,

    // ==================== 3xxx: Seller ====================
    /// Seller has not connected a payment gateway account
    SellerNotConnected = 3003,
    /// OAuth state does not match the stored one
    OAuthStateInvalid = 3004,
    /// OAuth state has expired
    OAuthStateExpired = 3005,
    /// Gateway OAuth configuration is incomplete
    GatewayConfigMissing = 3006,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Cart is empty
    CartEmpty = 4007,
    /// Cart contains items from more than one seller
    MixedSellerCart = 4008,
    /// Status transition is not allowed
    InvalidTransition = 4009,
    /// Same request is already being processed
    DuplicateProcessing = 4010,
    /// Delivery was already confirmed
    DeliveryAlreadyConfirmed = 4011,
    /// Dispute cannot be opened for this order
    DisputeNotAllowed = 4012,
    /// Order already has a dispute
    DisputeAlreadyOpen = 4013,
    /// Delivery code invalid or already used
    DeliveryCodeInvalid = 4014,
    /// Delivery code expired
    DeliveryCodeExpired = 4015,
    /// PIX payment cannot be regenerated for this order
    PixNotRegenerable = 4016,
    /// Delivery code has not been issued yet
    DeliveryCodeNotIssued = 4017,
    /// Order total must be positive
    InvalidOrderTotal = 4018,

    // ==================== 5xxx: Payment ====================
    /// Invalid payment method
    PaymentInvalidMethod = 5003,
    /// Refund was rejected or could not be issued
    RefundFailed = 5005,
    /// Payment gateway rejected the request
    GatewayError = 5006,
    /// Payment gateway unreachable
    GatewayUnavailable = 5007,
    /// Card token is required for card payments
    CardTokenRequired = 5008,
    /// Webhook signature invalid
    InvalidSignature = 5009,
    /// Webhook secret not configured
    WebhookSecretMissing = 5010,

    // ==================== 6xxx: Product ====================
    /// Product not found
    ProductNotFound = 6001,
    /// Product variant not found
    VariantNotFound = 6002,
    /// Not enough stock for the requested quantity
    InsufficientStock = 6003,
    /// Product has no valid price
    ProductUnavailable = 6004,

    // ==================== 7xxx: Wallet ====================
    /// Wallet not found
    WalletNotFound = 7001,
    /// Wallet is blocked
    WalletBlocked = 7002,
    /// Available balance too low
    InsufficientBalance = 7003,
    /// No bank account registered
    BankAccountMissing = 7004,
    /// Amount below the minimum withdrawal
    WithdrawalBelowMinimum = 7005,
    /// Bank transfer failed
    TransferFailed = 7006,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// System busy, retry later
    SystemBusy = 9404,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the default client-facing message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",

            // Auth
            ErrorCode::NotAuthenticated => "Authentication required",
            ErrorCode::TokenExpired => "Token has expired",
            ErrorCode::TokenInvalid => "Token is invalid",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",
            ErrorCode::SellerRequired => "Access restricted to sellers",

            // Seller
            ErrorCode::SellerNotConnected => {
                "Seller has not connected a payment account; checkout is unavailable"
            }
            ErrorCode::OAuthStateInvalid => "Authorization state is invalid, please reconnect",
            ErrorCode::OAuthStateExpired => "Authorization expired, please reconnect",
            ErrorCode::GatewayConfigMissing => "Payment gateway configuration is incomplete",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::CartEmpty => "Cart is empty",
            ErrorCode::MixedSellerCart => "All cart items must belong to the same seller",
            ErrorCode::InvalidTransition => "Order status transition is not allowed",
            ErrorCode::DuplicateProcessing => "Order is already being processed, please wait",
            ErrorCode::DeliveryAlreadyConfirmed => "Delivery has already been confirmed",
            ErrorCode::DisputeNotAllowed => "A dispute cannot be opened for this order",
            ErrorCode::DisputeAlreadyOpen => "This order already has a dispute",
            ErrorCode::DeliveryCodeInvalid => "Delivery code is invalid or already used",
            ErrorCode::DeliveryCodeExpired => "Delivery code has expired",
            ErrorCode::PixNotRegenerable => "PIX payment cannot be regenerated for this order",
            ErrorCode::DeliveryCodeNotIssued => "Delivery code has not been issued for this order",
            ErrorCode::InvalidOrderTotal => "Order total is invalid",

            // Payment
            ErrorCode::PaymentInvalidMethod => "Invalid payment method",
            ErrorCode::RefundFailed => "Refund could not be issued, please try again later",
            ErrorCode::GatewayError => "Payment provider error, please try again later",
            ErrorCode::GatewayUnavailable => "Payment provider unavailable, please try again later",
            ErrorCode::CardTokenRequired => "Card token is required",
            ErrorCode::InvalidSignature => "Invalid signature",
            ErrorCode::WebhookSecretMissing => "Webhook secret not configured",

            // Product
            ErrorCode::ProductNotFound => "Product not found",
            ErrorCode::VariantNotFound => "Product variant not found",
            ErrorCode::InsufficientStock => "Insufficient stock",
            ErrorCode::ProductUnavailable => "Product is unavailable",

            // Wallet
            ErrorCode::WalletNotFound => "Wallet not found",
            ErrorCode::WalletBlocked => "Wallet is blocked",
            ErrorCode::InsufficientBalance => "Insufficient balance",
            ErrorCode::BankAccountMissing => {
                "No bank account registered; add one before requesting a withdrawal"
            }
            ErrorCode::WithdrawalBelowMinimum => "Amount is below the minimum withdrawal",
            ErrorCode::TransferFailed => "Bank transfer failed, balance has been restored",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::SystemBusy => "System busy, please try again later",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1003 => Ok(ErrorCode::TokenExpired),
            1004 => Ok(ErrorCode::TokenInvalid),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),
            2002 => Ok(ErrorCode::SellerRequired),

            // Seller
            3003 => Ok(ErrorCode::SellerNotConnected),
            3004 => Ok(ErrorCode::OAuthStateInvalid),
            3005 => Ok(ErrorCode::OAuthStateExpired),
            3006 => Ok(ErrorCode::GatewayConfigMissing),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4007 => Ok(ErrorCode::CartEmpty),
            4008 => Ok(ErrorCode::MixedSellerCart),
            4009 => Ok(ErrorCode::InvalidTransition),
            4010 => Ok(ErrorCode::DuplicateProcessing),
            4011 => Ok(ErrorCode::DeliveryAlreadyConfirmed),
            4012 => Ok(ErrorCode::DisputeNotAllowed),
            4013 => Ok(ErrorCode::DisputeAlreadyOpen),
            4014 => Ok(ErrorCode::DeliveryCodeInvalid),
            4015 => Ok(ErrorCode::DeliveryCodeExpired),
            4016 => Ok(ErrorCode::PixNotRegenerable),
            4017 => Ok(ErrorCode::DeliveryCodeNotIssued),
            4018 => Ok(ErrorCode::InvalidOrderTotal),

            // Payment
            5003 => Ok(ErrorCode::PaymentInvalidMethod),
            5005 => Ok(ErrorCode::RefundFailed),
            5006 => Ok(ErrorCode::GatewayError),
            5007 => Ok(ErrorCode::GatewayUnavailable),
            5008 => Ok(ErrorCode::CardTokenRequired),
            5009 => Ok(ErrorCode::InvalidSignature),
            5010 => Ok(ErrorCode::WebhookSecretMissing),

            // Product
            6001 => Ok(ErrorCode::ProductNotFound),
            6002 => Ok(ErrorCode::VariantNotFound),
            6003 => Ok(ErrorCode::InsufficientStock),
            6004 => Ok(ErrorCode::ProductUnavailable),

            // Wallet
            7001 => Ok(ErrorCode::WalletNotFound),
            7002 => Ok(ErrorCode::WalletBlocked),
            7003 => Ok(ErrorCode::InsufficientBalance),
            7004 => Ok(ErrorCode::BankAccountMissing),
            7005 => Ok(ErrorCode::WithdrawalBelowMinimum),
            7006 => Ok(ErrorCode::TransferFailed),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9404 => Ok(ErrorCode::SystemBusy),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
