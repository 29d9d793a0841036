//! Order lifecycle
//!
//! - [`create`]: checkout from the buyer's cart
//! - [`payment`]: applying gateway outcomes to order and wallet
//! - [`lifecycle`]: seller status changes, cancellation, tracking, disputes
//! - [`delivery`]: delivery codes and buyer confirmation
//! - [`query`]: listings, live payment status, PIX regeneration
//!
//! Gateway calls never run inside a store transaction. Refunds run before
//! the transaction they gate; everything else (delivery code, sale ledger
//! entry, notifications) runs after commit and tolerates being repeated.

pub mod create;
pub mod delivery;
pub mod lifecycle;
pub mod payment;
pub mod query;

pub use create::CreateOrderRequest;
pub use delivery::{ConfirmDeliveryRequest, DeliveryConfirmation};
pub use lifecycle::{DisputeRequest, StatusChange, TrackingUpdate};
pub use payment::{Applied, PaymentOutcome, PaymentUpdate, apply_chargeback, apply_payment_status};
pub use query::{ListQuery, OrderPage, PaymentStatusView};

use shared::error::{AppError, ErrorCode};
use shared::models::NotificationKind;
use shared::order::{DeliveryCode, Order, OrderStatus, PaymentStatus};
use shared::wallet::{Transaction, TransactionStatus, TransactionType};
use std::sync::Arc;

use crate::auth::CallerIdentity;
use crate::config::MarketPolicy;
use crate::credentials::CredentialResolver;
use crate::error::ServiceResult;
use crate::gateway::PaymentGateway;
use crate::idempotency::IdempotencyGuard;
use crate::inventory;
use crate::notify::Notifier;
use crate::store::{LedgerStore, StorageError, StorageResult};

#[derive(Clone)]
pub struct OrderService {
    store: LedgerStore,
    gateway: Arc<dyn PaymentGateway>,
    credentials: CredentialResolver,
    idempotency: IdempotencyGuard,
    notifier: Notifier,
    policy: MarketPolicy,
}

impl OrderService {
    pub fn new(
        store: LedgerStore,
        gateway: Arc<dyn PaymentGateway>,
        credentials: CredentialResolver,
        notifier: Notifier,
        policy: MarketPolicy,
    ) -> Self {
        Self {
            idempotency: IdempotencyGuard::new(store.clone()),
            store,
            gateway,
            credentials,
            notifier,
            policy,
        }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    fn load(&self, order_id: &str) -> ServiceResult<Order> {
        self.store
            .get::<Order>(order_id)?
            .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound).into())
    }

    /// Load an order the caller is a party to, as buyer or owning seller
    fn load_for_party(&self, caller: &CallerIdentity, order_id: &str) -> ServiceResult<Order> {
        let order = self.load(order_id)?;
        if order.is_buyer(&caller.user_id) || order.is_seller(caller.tenant_id.as_deref()) {
            Ok(order)
        } else {
            Err(AppError::permission_denied("Not a party to this order").into())
        }
    }

    /// Post-commit side effects of a payment update. Each step is idempotent.
    /// Only refunding money that reached a cancelled order can fail; every
    /// other failure is logged because the ledger is already correct.
    pub async fn after_payment(&self, applied: &Applied, now: i64) -> ServiceResult<()> {
        let order = &applied.order;
        match &applied.outcome {
            PaymentOutcome::ApprovedAfterCancel => self.refund_after_cancel(order, now).await?,
            // A redelivery after a failed refund sees no change but still owes it
            PaymentOutcome::Unchanged => {
                if order.status == OrderStatus::Cancelled && order.payment_status == PaymentStatus::Paid {
                    self.refund_after_cancel(order, now).await?;
                }
            }
            PaymentOutcome::Approved => {
                if let Err(e) = self.record_sale(order) {
                    tracing::error!(order_id = %order.id, error = %e, "Failed to record sale");
                }
                if let Err(e) = self.issue_delivery_code(&order.id) {
                    tracing::error!(order_id = %order.id, error = %e, "Failed to issue delivery code");
                }
                self.notifier.buyer(
                    order,
                    NotificationKind::PaymentApproved,
                    "Pagamento aprovado",
                    format!("Seu pedido {} foi confirmado.", order.order_number),
                );
                self.notifier.seller(
                    order,
                    NotificationKind::PaymentApproved,
                    "Nova venda",
                    format!(
                        "Pedido {} pago. R$ {} ficará retido até a entrega.",
                        order.order_number, order.payment_split.seller_amount
                    ),
                );
            }
            PaymentOutcome::Failed => self.notifier.buyer(
                order,
                NotificationKind::PaymentFailed,
                "Pagamento recusado",
                format!("O pagamento do pedido {} não foi aprovado.", order.order_number),
            ),
            PaymentOutcome::Refunded { .. } => {
                if let Err(e) = self
                    .store
                    .transact(|txn| {
                        let Some(mut current) = txn.get::<Order>(&order.id)? else {
                            return Ok(false);
                        };
                        let restored = inventory::restore_for_order(txn, &mut current, now)?;
                        if restored {
                            txn.put(&current)?;
                        }
                        Ok::<_, StorageError>(restored)
                    })
                {
                    tracing::error!(order_id = %order.id, error = %e, "Failed to restore stock after refund");
                }
                self.notify_refund(order);
            }
            PaymentOutcome::Chargeback { .. } => {
                self.notifier.seller(
                    order,
                    NotificationKind::Chargeback,
                    "Chargeback recebido",
                    format!(
                        "O pedido {} sofreu chargeback e o valor foi estornado.",
                        order.order_number
                    ),
                );
                self.notifier.buyer(
                    order,
                    NotificationKind::Chargeback,
                    "Contestação registrada",
                    format!("O pedido {} foi encerrado após contestação.", order.order_number),
                );
            }
        }
        Ok(())
    }

    fn notify_refund(&self, order: &Order) {
        let body = format!("O pagamento do pedido {} foi estornado.", order.order_number);
        self.notifier
            .buyer(order, NotificationKind::PaymentRefunded, "Reembolso", body.clone());
        self.notifier
            .seller(order, NotificationKind::PaymentRefunded, "Reembolso", body);
    }

    /// Pending sale entry for an approved order, created once
    fn record_sale(&self, order: &Order) -> StorageResult<bool> {
        let now = order.paid_at.unwrap_or(order.updated_at);
        let sale = Transaction {
            id: payment::sale_transaction_id(&order.id),
            tenant_id: order.tenant_id.clone(),
            kind: TransactionType::Sale,
            amount: order.total,
            fee: order.payment_split.platform_fee_amount,
            net: order.payment_split.seller_amount,
            status: TransactionStatus::Pending,
            description: format!("Venda - Pedido {}", order.order_number),
            order_id: Some(order.id.clone()),
            withdrawal_id: None,
            created_at: now,
            updated_at: now,
        };
        self.store.transact(|txn| txn.insert_new(&sale))
    }

    /// Issue the delivery code unless the order already has one
    pub fn issue_delivery_code(&self, order_id: &str) -> ServiceResult<Option<DeliveryCode>> {
        let code_id = uuid::Uuid::new_v4().to_string();
        let now = shared::util::now_millis();
        self.store.transact(|txn| {
            let Some(mut order) = txn.get::<Order>(order_id)? else {
                return Ok(None);
            };
            if order.delivery_code_id.is_some() {
                return Ok(None);
            }
            let code = DeliveryCode::issue(&order.id, code_id.clone(), now);
            order.delivery_code_id = Some(code.id.clone());
            txn.put(&code)?;
            txn.put(&order)?;
            Ok(Some(code))
        })
    }
}
