//! Order document and its nested value types

use super::status::{DisputeStatus, OrderStatus, PaymentStatus, SplitStatus};
use crate::money;
use crate::util::base36;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// PIX codes stay payable for 15 minutes
pub const PIX_EXPIRY_MS: i64 = 15 * 60 * 1000;

/// Delivery confirmation codes stay valid for 30 days
pub const DELIVERY_CODE_EXPIRY_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Human-readable order number, e.g. `RDB-LOYW3V28`
pub fn order_number(now_millis: i64) -> String {
    format!("RDB-{}", base36(now_millis.max(0) as u64).to_uppercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    #[default]
    Delivery,
    Pickup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Pix,
    #[serde(alias = "creditCard")]
    CreditCard,
    #[serde(alias = "debitCard")]
    DebitCard,
}

impl PaymentMethod {
    /// Accepts both the snake_case and the camelCase spelling
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pix" => Some(Self::Pix),
            "credit_card" | "creditCard" => Some(Self::CreditCard),
            "debit_card" | "debitCard" => Some(Self::DebitCard),
            _ => None,
        }
    }

    /// Gateway payment method id
    pub fn gateway_id(&self) -> &'static str {
        match self {
            Self::Pix => "pix",
            Self::CreditCard => "credit_card",
            Self::DebitCard => "debit_card",
        }
    }

    pub fn is_card(&self) -> bool {
        matches!(self, Self::CreditCard | Self::DebitCard)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub street: String,
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complement: Option<String>,
    #[serde(default)]
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

/// Line item, priced server-side at creation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total: Decimal,
}

/// Platform/seller split of the order total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSplit {
    pub platform_fee_amount: Decimal,
    /// Fee percentage in effect when the order was created
    pub platform_fee_percentage: Decimal,
    pub seller_amount: Decimal,
    #[serde(default)]
    pub gateway_payment_id: Option<String>,
    #[serde(default)]
    pub split_status: SplitStatus,
    /// Earliest release time, set on delivery confirmation
    #[serde(default)]
    pub held_until: Option<i64>,
}

impl PaymentSplit {
    /// Snapshot the split for `total` at the given fee percentage
    pub fn compute(total: Decimal, fee_percentage: Decimal) -> Self {
        let split = money::split(total, fee_percentage);
        Self {
            platform_fee_amount: split.platform_fee,
            platform_fee_percentage: fee_percentage,
            seller_amount: split.seller_amount,
            gateway_payment_id: None,
            split_status: SplitStatus::Pending,
            held_until: None,
        }
    }
}

/// One entry of the append-only status history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// Order status name, or a ledger event such as `payment_released`
    pub status: String,
    pub timestamp: i64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixData {
    pub code: Option<String>,
    pub ticket_url: Option<String>,
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub status: DisputeStatus,
    pub reason: String,
    pub opened_by: String,
    pub opened_at: i64,
}

/// Order document, one per checkout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub order_number: String,
    /// Seller tenant
    pub tenant_id: String,
    pub buyer_user_id: String,
    pub items: Vec<OrderItem>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
    pub delivery_type: DeliveryType,
    #[serde(default)]
    pub delivery_address: Option<DeliveryAddress>,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub payment_split: PaymentSplit,
    pub status_history: Vec<StatusEntry>,
    #[serde(default)]
    pub customer_notes: Option<String>,
    #[serde(default)]
    pub pix: Option<PixData>,
    /// Last raw status reported by the gateway
    #[serde(default)]
    pub gateway_status: Option<String>,
    #[serde(default)]
    pub gateway_status_detail: Option<String>,
    #[serde(default)]
    pub paid_at: Option<i64>,
    #[serde(default)]
    pub delivery_confirmed_at: Option<i64>,
    #[serde(default)]
    pub payment_released_at: Option<i64>,
    #[serde(default)]
    pub refunded_at: Option<i64>,
    #[serde(default)]
    pub dispute: Option<Dispute>,
    #[serde(default)]
    pub tracking_code: Option<String>,
    #[serde(default)]
    pub shipping_company: Option<String>,
    #[serde(default)]
    pub delivery_code_id: Option<String>,
    /// Set once reserved stock has been returned, so it is never returned twice
    #[serde(default)]
    pub stock_restored_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    /// Append a history entry without touching `status`
    pub fn record(
        &mut self,
        status: impl Into<String>,
        note: impl Into<String>,
        actor_id: Option<&str>,
        now: i64,
    ) {
        self.status_history.push(StatusEntry {
            status: status.into(),
            timestamp: now,
            note: Some(note.into()),
            actor_id: actor_id.map(str::to_string),
        });
        self.updated_at = now;
    }

    /// Move to `status` and log it. Callers check the transition first.
    pub fn set_status(
        &mut self,
        status: OrderStatus,
        note: impl Into<String>,
        actor_id: Option<&str>,
        now: i64,
    ) {
        self.status = status;
        self.record(status.as_str(), note, actor_id, now);
    }

    pub fn is_buyer(&self, user_id: &str) -> bool {
        self.buyer_user_id == user_id
    }

    pub fn is_seller(&self, tenant_id: Option<&str>) -> bool {
        tenant_id.is_some_and(|t| t == self.tenant_id)
    }

    pub fn gateway_payment_id(&self) -> Option<&str> {
        self.payment_split.gateway_payment_id.as_deref()
    }

    /// Fee plus seller share equals the total within a cent
    pub fn split_is_balanced(&self) -> bool {
        money::approx_eq(
            self.payment_split.platform_fee_amount + self.payment_split.seller_amount,
            self.total,
        )
    }
}

/// Code the buyer presents (usually as a QR) to confirm receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryCode {
    pub id: String,
    pub order_id: String,
    pub code: String,
    pub used: bool,
    #[serde(default)]
    pub used_at: Option<i64>,
    #[serde(default)]
    pub used_by: Option<String>,
    pub created_at: i64,
    pub expires_at: i64,
}

impl DeliveryCode {
    pub fn issue(order_id: &str, id: String, now: i64) -> Self {
        let code = format!(
            "DEL-{}-{}",
            prefix(order_id, 8),
            prefix(&id, 6)
        )
        .to_uppercase();
        Self {
            id,
            order_id: order_id.to_string(),
            code,
            used: false,
            used_at: None,
            used_by: None,
            created_at: now,
            expires_at: now + DELIVERY_CODE_EXPIRY_MS,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at < now
    }
}

fn prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample_order() -> Order {
        let total = Decimal::from_str("57.89").unwrap();
        Order {
            id: "0d6c1a2b-9f3e-4c55-8a1e-2b3c4d5e6f70".into(),
            order_number: order_number(1_700_000_000_000),
            tenant_id: "tenant-1".into(),
            buyer_user_id: "buyer-1".into(),
            items: vec![],
            subtotal: total,
            discount: Decimal::ZERO,
            delivery_fee: Decimal::ZERO,
            total,
            delivery_type: DeliveryType::Delivery,
            delivery_address: None,
            payment_method: PaymentMethod::Pix,
            payment_status: PaymentStatus::Pending,
            status: OrderStatus::Pending,
            payment_split: PaymentSplit::compute(total, Decimal::from(5)),
            status_history: vec![],
            customer_notes: None,
            pix: None,
            gateway_status: None,
            gateway_status_detail: None,
            paid_at: None,
            delivery_confirmed_at: None,
            payment_released_at: None,
            refunded_at: None,
            dispute: None,
            tracking_code: None,
            shipping_company: None,
            delivery_code_id: None,
            stock_restored_at: None,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn test_order_number_format() {
        assert_eq!(order_number(1_700_000_000_000), "RDB-LOYW3V28");
    }

    #[test]
    fn test_split_snapshot_is_balanced() {
        let order = sample_order();
        assert!(order.split_is_balanced());
        assert_eq!(
            order.payment_split.platform_fee_amount,
            Decimal::from_str("2.89").unwrap()
        );
        assert_eq!(order.payment_split.seller_amount, Decimal::from_str("55.00").unwrap());
    }

    #[test]
    fn test_set_status_appends_history() {
        let mut order = sample_order();
        order.set_status(OrderStatus::Confirmed, "Payment approved", None, 10);
        order.record("payment_released", "Released to seller", Some("system"), 20);

        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.status_history.len(), 2);
        assert_eq!(order.status_history[0].status, "confirmed");
        assert_eq!(order.status_history[1].status, "payment_released");
        assert_eq!(order.updated_at, 20);
    }

    #[test]
    fn test_payment_method_aliases() {
        let m: PaymentMethod = serde_json::from_str("\"creditCard\"").unwrap();
        assert_eq!(m, PaymentMethod::CreditCard);
        let m: PaymentMethod = serde_json::from_str("\"debit_card\"").unwrap();
        assert_eq!(m.gateway_id(), "debit_card");
        assert!(serde_json::from_str::<PaymentMethod>("\"boleto\"").is_err());
        assert_eq!(PaymentMethod::parse("debitCard"), Some(PaymentMethod::DebitCard));
        assert_eq!(PaymentMethod::parse("boleto"), None);
    }

    #[test]
    fn test_delivery_code_format() {
        let code = DeliveryCode::issue(
            "0d6c1a2b-9f3e-4c55-8a1e-2b3c4d5e6f70",
            "a1b2c3d4-0000".into(),
            1000,
        );
        assert_eq!(code.code, "DEL-0D6C1A2B-A1B2C3");
        assert_eq!(code.expires_at, 1000 + DELIVERY_CODE_EXPIRY_MS);
        assert!(!code.is_expired(1000));
        assert!(code.is_expired(code.expires_at + 1));
    }

    #[test]
    fn test_order_serde_roundtrip_keeps_money_exact() {
        let order = sample_order();
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(back.total, order.total);
        assert_eq!(back.payment_split, order.payment_split);
    }
}
