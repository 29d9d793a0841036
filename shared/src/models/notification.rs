//! In-app notification record

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderCreated,
    PaymentApproved,
    PaymentFailed,
    PaymentRefunded,
    PaymentReleased,
    OrderStatus,
    DeliveryConfirmed,
    Dispute,
    Chargeback,
    Withdrawal,
    GatewayDisconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: i64,
}
