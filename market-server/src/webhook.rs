//! Gateway notification reconciler
//!
//! Deliveries are verified, deduplicated by `x-request-id` and then handled
//! by type. A delivery is recorded as processed only after it succeeded, so
//! the gateway's own retries cover transient failures.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::error::ErrorCode;
use shared::order::Order;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::credentials::CredentialResolver;
use crate::error::{ServiceError, ServiceResult};
use crate::gateway::{PaymentGateway, signature};
use crate::idempotency::{Begin, IdempotencyGuard, webhook_key};
use crate::orders::{OrderService, PaymentUpdate, apply_chargeback, apply_payment_status};
use crate::sellers::SellerService;
use crate::store::{LedgerStore, PaymentIndex};

/// Processed delivery, keyed by the gateway's request id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub request_id: String,
    pub kind: String,
    #[serde(default)]
    pub action: Option<String>,
    pub data_id: String,
    pub processed_at: i64,
}

/// Parsed notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: String,
    pub action: Option<String>,
    pub data_id: String,
}

impl Notice {
    /// Body fields win over query parameters. Numeric ids are accepted.
    pub fn parse(body: &[u8], query: &HashMap<String, String>) -> Result<Self, WebhookError> {
        let value: Value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(body).map_err(|_| WebhookError::BadPayload)?
        };
        let kind = value["type"]
            .as_str()
            .or_else(|| query.get("type").map(String::as_str))
            .or_else(|| query.get("topic").map(String::as_str))
            .unwrap_or_default()
            .to_string();
        let data_id = match &value["data"]["id"] {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => query
                .get("data.id")
                .or_else(|| query.get("id"))
                .cloned()
                .unwrap_or_default(),
        };
        Ok(Self {
            kind,
            action: value["action"].as_str().map(str::to_string),
            data_id,
        })
    }
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Webhook secret not configured")]
    SecretMissing,
    #[error("Invalid signature: {0}")]
    Signature(#[from] signature::SignatureError),
    #[error("Malformed notification")]
    BadPayload,
    #[error("Delivery already in progress")]
    InProgress,
    #[error("Processing failed: {0}")]
    Processing(ServiceError),
}

/// What happened to a verified delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Processed,
    Duplicate,
    Ignored,
}

#[derive(Clone)]
pub struct WebhookReconciler {
    store: LedgerStore,
    gateway: Arc<dyn PaymentGateway>,
    credentials: CredentialResolver,
    orders: OrderService,
    sellers: SellerService,
    idempotency: IdempotencyGuard,
    secret: Option<String>,
}

impl WebhookReconciler {
    pub fn new(
        orders: OrderService,
        sellers: SellerService,
        gateway: Arc<dyn PaymentGateway>,
        credentials: CredentialResolver,
        secret: Option<String>,
    ) -> Self {
        let store = orders.store().clone();
        Self {
            idempotency: IdempotencyGuard::new(store.clone()),
            store,
            gateway,
            credentials,
            orders,
            sellers,
            secret,
        }
    }

    pub async fn handle(
        &self,
        signature_header: Option<&str>,
        request_id: Option<&str>,
        body: &[u8],
        query: &HashMap<String, String>,
        now: i64,
    ) -> Result<Handled, WebhookError> {
        let secret = self
            .secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(WebhookError::SecretMissing)?;
        let notice = Notice::parse(body, query)?;
        let request_id = request_id.unwrap_or_default();
        signature::verify(
            signature_header.unwrap_or_default(),
            &notice.data_id,
            request_id,
            secret,
        )?;

        tracing::info!(kind = %notice.kind, action = ?notice.action, data_id = %notice.data_id, "Webhook received");

        if request_id.is_empty() {
            self.dispatch(&notice, now)
                .await
                .map_err(WebhookError::Processing)?;
            return Ok(Handled::Processed);
        }

        let key = webhook_key(request_id);
        match self.idempotency.begin(&key, now) {
            Ok(Begin::Completed(_)) => {
                tracing::info!(request_id, "Webhook already processed, skipping");
                return Ok(Handled::Duplicate);
            }
            Ok(Begin::Started) => {}
            Err(ServiceError::App(e)) if e.code == ErrorCode::DuplicateProcessing => {
                return Err(WebhookError::InProgress);
            }
            Err(e) => return Err(WebhookError::Processing(e)),
        }

        match self.dispatch(&notice, now).await {
            Ok(handled) => {
                let delivery = WebhookDelivery {
                    request_id: request_id.to_string(),
                    kind: notice.kind.clone(),
                    action: notice.action.clone(),
                    data_id: notice.data_id.clone(),
                    processed_at: now,
                };
                let recorded = self
                    .store
                    .put(&delivery)
                    .and_then(|_| self.idempotency.complete(&key, Some(&notice.data_id), now));
                if let Err(e) = recorded {
                    tracing::error!(request_id, error = %e, "Failed to record webhook delivery");
                }
                Ok(handled)
            }
            Err(e) => {
                if let Err(fe) = self.idempotency.fail(&key, &e.code().to_string(), now) {
                    tracing::error!(request_id, error = %fe, "Failed to release webhook key");
                }
                tracing::error!(request_id, error = %e, "Webhook processing failed");
                Err(WebhookError::Processing(e))
            }
        }
    }

    async fn dispatch(&self, notice: &Notice, now: i64) -> ServiceResult<Handled> {
        match notice.kind.as_str() {
            "payment" => self.payment(&notice.data_id, now).await,
            "chargeback" | "topic_chargebacks_wh" => self.chargeback(&notice.data_id, now).await,
            "mp-connect" => self.connection(&notice.data_id, notice.action.as_deref(), now),
            "claim" | "topic_claims_integration_wh" => {
                tracing::warn!(data_id = %notice.data_id, action = ?notice.action, "Claim notification received, needs manual review");
                Ok(Handled::Ignored)
            }
            other => {
                tracing::info!(kind = other, "Unhandled webhook type");
                Ok(Handled::Ignored)
            }
        }
    }

    fn order_for_payment(&self, payment_id: &str) -> ServiceResult<Option<Order>> {
        if payment_id.is_empty() {
            return Ok(None);
        }
        let Some(index) = self.store.get::<PaymentIndex>(payment_id)? else {
            tracing::warn!(payment_id, "No order for payment");
            return Ok(None);
        };
        Ok(self.store.get::<Order>(&index.order_id)?)
    }

    /// Fetch the payment from the gateway and apply its status
    async fn payment(&self, payment_id: &str, now: i64) -> ServiceResult<Handled> {
        let Some(order) = self.order_for_payment(payment_id)? else {
            return Ok(Handled::Ignored);
        };
        let token = self.credentials.seller_or_platform_token(&order.tenant_id).await;
        let payment = self.gateway.get_payment(&token, payment_id).await?;
        let update = PaymentUpdate::from(&payment);

        let applied = self
            .store
            .transact(|txn| apply_payment_status(txn, &order.id, &update, now))?;
        tracing::info!(
            order_id = %order.id,
            payment_id,
            status = %update.gateway_status,
            outcome = ?applied.outcome,
            "Payment notification applied"
        );
        self.orders.after_payment(&applied, now).await?;
        Ok(Handled::Processed)
    }

    async fn chargeback(&self, payment_id: &str, now: i64) -> ServiceResult<Handled> {
        let Some(order) = self.order_for_payment(payment_id)? else {
            return Ok(Handled::Ignored);
        };
        let applied = self
            .store
            .transact(|txn| apply_chargeback(txn, &order.id, now))?;
        tracing::warn!(order_id = %order.id, payment_id, outcome = ?applied.outcome, "Chargeback applied");
        self.orders.after_payment(&applied, now).await?;
        Ok(Handled::Processed)
    }

    fn connection(&self, gateway_user_id: &str, action: Option<&str>, now: i64) -> ServiceResult<Handled> {
        match action {
            Some("mp-connect.disconnected" | "application.deauthorized") => {
                let tenants = self.sellers.deauthorized(gateway_user_id, now)?;
                if tenants.is_empty() {
                    tracing::warn!(gateway_user_id, "No seller linked to gateway user");
                    return Ok(Handled::Ignored);
                }
                Ok(Handled::Processed)
            }
            _ => {
                tracing::info!(gateway_user_id, action = ?action, "Connection event received");
                Ok(Handled::Ignored)
            }
        }
    }
}
