//! Order domain types
//!
//! - [`status`]: fulfillment, payment and escrow status enums plus the
//!   transition rules consulted by every status change
//! - [`types`]: the order document and its nested values

pub mod status;
pub mod types;

pub use status::{Actor, DisputeStatus, OrderStatus, PaymentStatus, SplitStatus};
pub use types::*;
