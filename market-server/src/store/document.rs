//! Document kinds persisted in the ledger store
//!
//! Every document lives in its own `&str -> JSON` table and knows its key.

use redb::TableDefinition;
use serde::{Serialize, de::DeserializeOwned};
use shared::models::{Cart, Notification, Product, SellerAccount, SellerCredential};
use shared::order::{DeliveryCode, Order};
use shared::wallet::{Transaction, Wallet, Withdrawal};

use crate::audit::AuditEntry;
use crate::credentials::AdvisoryLock;
use crate::idempotency::IdempotencyRecord;
use crate::webhook::WebhookDelivery;

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

pub const ORDERS: Table = TableDefinition::new("orders");
pub const PRODUCTS: Table = TableDefinition::new("products");
pub const WALLETS: Table = TableDefinition::new("wallets");
pub const TRANSACTIONS: Table = TableDefinition::new("transactions");
pub const WITHDRAWALS: Table = TableDefinition::new("withdrawals");
pub const IDEMPOTENCY: Table = TableDefinition::new("idempotency");
pub const WEBHOOK_DELIVERIES: Table = TableDefinition::new("webhook_deliveries");
pub const SELLER_ACCOUNTS: Table = TableDefinition::new("seller_accounts");
pub const SELLER_CREDENTIALS: Table = TableDefinition::new("seller_credentials");
pub const ADVISORY_LOCKS: Table = TableDefinition::new("advisory_locks");
pub const CARTS: Table = TableDefinition::new("carts");
pub const DELIVERY_CODES: Table = TableDefinition::new("delivery_codes");
pub const NOTIFICATIONS: Table = TableDefinition::new("notifications");
pub const AUDIT_LOG: Table = TableDefinition::new("audit_log");
/// Gateway payment id -> order id
pub const PAYMENT_INDEX: Table = TableDefinition::new("payment_index");

/// Every table, created when the database is opened
pub(super) const ALL_TABLES: [Table; 15] = [
    ORDERS,
    PRODUCTS,
    WALLETS,
    TRANSACTIONS,
    WITHDRAWALS,
    IDEMPOTENCY,
    WEBHOOK_DELIVERIES,
    SELLER_ACCOUNTS,
    SELLER_CREDENTIALS,
    ADVISORY_LOCKS,
    CARTS,
    DELIVERY_CODES,
    NOTIFICATIONS,
    AUDIT_LOG,
    PAYMENT_INDEX,
];

/// A JSON document stored under a string key
pub trait Document: Serialize + DeserializeOwned {
    const TABLE: Table;

    fn key(&self) -> &str;
}

/// Secondary index entry mapping a gateway payment to its order
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PaymentIndex {
    pub payment_id: String,
    pub order_id: String,
    pub created_at: i64,
}

macro_rules! document {
    ($ty:ty, $table:expr, $key:ident) => {
        impl Document for $ty {
            const TABLE: Table = $table;

            fn key(&self) -> &str {
                &self.$key
            }
        }
    };
}

document!(Order, ORDERS, id);
document!(Product, PRODUCTS, id);
document!(Wallet, WALLETS, tenant_id);
document!(Transaction, TRANSACTIONS, id);
document!(Withdrawal, WITHDRAWALS, id);
document!(IdempotencyRecord, IDEMPOTENCY, key);
document!(WebhookDelivery, WEBHOOK_DELIVERIES, request_id);
document!(SellerAccount, SELLER_ACCOUNTS, tenant_id);
document!(SellerCredential, SELLER_CREDENTIALS, tenant_id);
document!(AdvisoryLock, ADVISORY_LOCKS, key);
document!(Cart, CARTS, buyer_id);
document!(DeliveryCode, DELIVERY_CODES, id);
document!(Notification, NOTIFICATIONS, id);
document!(AuditEntry, AUDIT_LOG, id);
document!(PaymentIndex, PAYMENT_INDEX, payment_id);
