//! Payment gateway capability
//!
//! The rest of the crate talks to the gateway only through [`PaymentGateway`]:
//! create a split payment, read it back, refund it, exchange or refresh a
//! seller's OAuth grant, and pay out to a bank account. [`MercadoPagoClient`]
//! is the production implementation.

mod mercadopago;
pub mod signature;

pub use mercadopago::{MercadoPagoClient, OAuthApp};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::order::PaymentStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport failure or timeout; the call may be retried
    #[error("Gateway unreachable: {0}")]
    Unavailable(String),

    /// Gateway answered with a non-2xx status. The body is kept for logs only.
    #[error("Gateway returned HTTP {status}")]
    Api { status: u16, body: String },

    #[error("Unexpected gateway response: {0}")]
    Decode(String),

    #[error("Gateway not configured: {0}")]
    NotConfigured(&'static str),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Map a raw gateway payment status to the platform's payment status
pub fn map_status(raw: &str) -> PaymentStatus {
    match raw {
        "approved" => PaymentStatus::Paid,
        "pending" | "authorized" | "in_process" | "in_mediation" => PaymentStatus::Pending,
        "rejected" | "cancelled" => PaymentStatus::Failed,
        "refunded" | "charged_back" => PaymentStatus::Refunded,
        other => {
            tracing::warn!(status = other, "Unknown gateway payment status, treating as pending");
            PaymentStatus::Pending
        }
    }
}

/// Escrow hint sent with each payment: hold hours rounded up to whole days
pub fn money_release_days(hold_hours: i64) -> u32 {
    u32::try_from((hold_hours.max(0) + 23) / 24).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identification {
    #[serde(rename = "type")]
    pub kind: String,
    pub number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payer {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identification: Option<Identification>,
}

/// Split payment request, sent on behalf of the seller's account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatePayment {
    pub transaction_amount: Decimal,
    pub description: String,
    pub payment_method_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installments: Option<u32>,
    pub payer: Payer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_url: Option<String>,
    pub external_reference: String,
    /// Platform fee kept by the marketplace
    pub application_fee: Decimal,
    pub money_release_days: u32,
    /// RFC 3339 expiry, PIX only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_expiration: Option<String>,
    pub metadata: serde_json::Value,
}

/// Payment as reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GatewayPayment {
    pub id: String,
    /// Raw gateway status, e.g. `approved`
    pub status: String,
    pub status_detail: Option<String>,
    pub external_reference: Option<String>,
    pub pix_qr_code: Option<String>,
    pub pix_ticket_url: Option<String>,
}

impl GatewayPayment {
    pub fn payment_status(&self) -> PaymentStatus {
        map_status(&self.status)
    }
}

/// OAuth grant for a seller account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub public_key: Option<String>,
    /// Seconds until `access_token` expires
    pub expires_in: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferAccount {
    pub bank_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub number: String,
    pub holder_name: String,
    pub holder_document: String,
}

/// Payout from the seller's gateway balance to their bank account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BankTransfer {
    pub amount: Decimal,
    pub external_reference: String,
    pub bank_account: TransferAccount,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransferReceipt {
    pub id: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(
        &self,
        access_token: &str,
        request: &CreatePayment,
        idempotency_key: &str,
    ) -> GatewayResult<GatewayPayment>;

    async fn get_payment(&self, access_token: &str, payment_id: &str) -> GatewayResult<GatewayPayment>;

    /// Full refund
    async fn refund_payment(
        &self,
        access_token: &str,
        payment_id: &str,
        idempotency_key: &str,
    ) -> GatewayResult<()>;

    async fn exchange_code(&self, code: &str) -> GatewayResult<OAuthGrant>;

    async fn refresh_token(&self, refresh_token: &str) -> GatewayResult<OAuthGrant>;

    async fn create_bank_transfer(
        &self,
        access_token: &str,
        transfer: &BankTransfer,
        idempotency_key: &str,
    ) -> GatewayResult<TransferReceipt>;

    /// Seller authorization URL carrying `state`
    fn authorization_url(&self, state: &str) -> GatewayResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_table() {
        assert_eq!(map_status("approved"), PaymentStatus::Paid);
        for raw in ["pending", "authorized", "in_process", "in_mediation"] {
            assert_eq!(map_status(raw), PaymentStatus::Pending, "{raw}");
        }
        assert_eq!(map_status("rejected"), PaymentStatus::Failed);
        assert_eq!(map_status("cancelled"), PaymentStatus::Failed);
        assert_eq!(map_status("refunded"), PaymentStatus::Refunded);
        assert_eq!(map_status("charged_back"), PaymentStatus::Refunded);
        assert_eq!(map_status("something_new"), PaymentStatus::Pending);
    }

    #[test]
    fn test_money_release_days_rounds_up() {
        assert_eq!(money_release_days(0), 0);
        assert_eq!(money_release_days(1), 1);
        assert_eq!(money_release_days(24), 1);
        assert_eq!(money_release_days(25), 2);
        assert_eq!(money_release_days(-5), 0);
    }

    #[test]
    fn test_create_payment_omits_empty_fields() {
        let req = CreatePayment {
            transaction_amount: Decimal::new(5789, 2),
            description: "Pedido RDB-1".into(),
            payment_method_id: "pix".into(),
            token: None,
            installments: None,
            payer: Payer {
                email: "buyer@example.com".into(),
                first_name: None,
                last_name: None,
                identification: None,
            },
            notification_url: None,
            external_reference: "order-1".into(),
            application_fee: Decimal::new(289, 2),
            money_release_days: 1,
            date_of_expiration: None,
            metadata: serde_json::json!({ "order_id": "order-1" }),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["transaction_amount"], serde_json::json!(57.89));
        assert_eq!(json["application_fee"], serde_json::json!(2.89));
        assert!(json.get("token").is_none());
        assert!(json["payer"].get("first_name").is_none());
    }
}
