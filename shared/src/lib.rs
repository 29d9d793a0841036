//! Shared types for the marketplace backend
//!
//! Domain documents (orders, wallets, products, carts, sellers), the unified
//! error system and small money/time utilities.

pub mod error;
pub mod models;
pub mod money;
pub mod order;
pub mod util;
pub mod wallet;

// Re-exports
pub use http;
pub use rust_decimal::Decimal;
pub use serde::{Deserialize, Serialize};
