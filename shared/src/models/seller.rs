//! Seller account and payment gateway connection

use serde::{Deserialize, Serialize};

/// OAuth CSRF state, valid for 10 minutes
pub const OAUTH_STATE_TTL_MS: i64 = 10 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub value: String,
    pub expires_at: i64,
}

/// Seller tenant and its gateway connection status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerAccount {
    pub tenant_id: String,
    /// User that receives seller notifications
    pub owner_user_id: String,
    pub name: String,
    #[serde(default)]
    pub gateway_connected: bool,
    #[serde(default)]
    pub gateway_user_id: Option<String>,
    #[serde(default)]
    pub connected_at: Option<i64>,
    #[serde(default)]
    pub oauth_state: Option<OAuthState>,
    pub updated_at: i64,
}

/// OAuth credential for acting on the seller's gateway account
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerCredential {
    pub tenant_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub gateway_user_id: String,
    #[serde(default)]
    pub public_key: Option<String>,
    pub expires_at: i64,
    pub updated_at: i64,
}

impl SellerCredential {
    /// Token still valid for at least `margin_ms`
    pub fn is_fresh(&self, now: i64, margin_ms: i64) -> bool {
        self.expires_at - now > margin_ms
    }
}

impl std::fmt::Debug for SellerCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SellerCredential")
            .field("tenant_id", &self.tenant_id)
            .field("gateway_user_id", &self.gateway_user_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
