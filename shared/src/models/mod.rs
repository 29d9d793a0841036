//! Marketplace data models shared between the server and its clients

pub mod cart;
pub mod notification;
pub mod product;
pub mod seller;

pub use cart::{Cart, CartItem};
pub use notification::{Notification, NotificationKind};
pub use product::{Product, Variant};
pub use seller::{OAUTH_STATE_TTL_MS, OAuthState, SellerAccount, SellerCredential};
