//! Unified error system for the marketplace backend
//!
//! - [`ErrorCode`]: Standardized error codes for all error types
//! - [`AppError`]: code plus client-safe message and optional details
//! - [`ErrorBody`]: JSON shape of error responses
//!
//! # Error Code Ranges
//!
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 3xxx: Seller / gateway connection errors
//! - 4xxx: Order errors
//! - 5xxx: Payment errors
//! - 6xxx: Product / inventory errors
//! - 7xxx: Wallet errors
//! - 9xxx: System errors
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorBody, ErrorCode};
//!
//! let err = AppError::insufficient_stock("prod-1", 0);
//! assert_eq!(err.code, ErrorCode::InsufficientStock);
//!
//! let body = ErrorBody::from(&err);
//! assert_eq!(body.code, 6003);
//! ```

mod codes;
mod http;
mod types;

pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{AppError, ErrorBody};
