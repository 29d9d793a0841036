//! Applying gateway payment outcomes to an order and its seller wallet
//!
//! Every function here runs inside the caller's transaction and is a pure
//! function of what it reads, so a retried commit produces the same result.
//! The current order is always re-read first: two deliveries racing for the
//! same order serialize on the store, and the second one sees the first one's
//! result and becomes a no-op.

use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};
use shared::order::{Actor, Order, OrderStatus, PaymentStatus, SplitStatus};
use shared::wallet::{Bucket, Transaction, TransactionStatus, TransactionType, Wallet};

use crate::audit::{self, AuditAction, AuditEntry};
use crate::error::ServiceResult;
use crate::gateway::GatewayPayment;
use crate::inventory;
use crate::store::{StorageResult, Txn};

/// Payment state as reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentUpdate {
    pub status: PaymentStatus,
    /// Raw gateway status, kept on the order for support
    pub gateway_status: String,
    pub status_detail: Option<String>,
}

impl From<&GatewayPayment> for PaymentUpdate {
    fn from(payment: &GatewayPayment) -> Self {
        Self {
            status: payment.payment_status(),
            gateway_status: payment.status.clone(),
            status_detail: payment.status_detail.clone(),
        }
    }
}

/// What an applied update did
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    /// Stale, duplicate or downgrading notification; nothing written
    Unchanged,
    /// Order confirmed and the seller amount escrowed
    Approved,
    /// Money arrived for an order that was already cancelled
    ApprovedAfterCancel,
    Failed,
    /// Refund recorded; `reversed` is what left the seller wallet
    Refunded { reversed: Decimal },
    Chargeback { reversed: Decimal },
}

#[derive(Debug, Clone)]
pub struct Applied {
    pub order: Order,
    pub outcome: PaymentOutcome,
}

pub fn sale_transaction_id(order_id: &str) -> String {
    format!("sale-{order_id}")
}

fn load(txn: &Txn<'_>, order_id: &str) -> ServiceResult<Order> {
    txn.get::<Order>(order_id)?
        .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound).into())
}

/// Apply a payment status to the order, honoring the status priority.
///
/// Approval confirms a pending order and credits the seller's pending
/// balance with the split snapshot taken at creation. A rejected card
/// payment cancels the pending order and returns its stock. A refund
/// reverses whatever the seller currently holds for the order.
pub fn apply_payment_status(
    txn: &Txn<'_>,
    order_id: &str,
    update: &PaymentUpdate,
    now: i64,
) -> ServiceResult<Applied> {
    let mut order = load(txn, order_id)?;
    if !order.payment_status.superseded_by(update.status) {
        tracing::debug!(
            order_id,
            current = %order.payment_status,
            incoming = %update.status,
            "Payment update ignored"
        );
        return Ok(Applied {
            order,
            outcome: PaymentOutcome::Unchanged,
        });
    }

    order.gateway_status = Some(update.gateway_status.clone());
    order.gateway_status_detail = update.status_detail.clone();

    let outcome = match update.status {
        PaymentStatus::Paid => approve(txn, &mut order, now)?,
        PaymentStatus::Failed => {
            order.payment_status = PaymentStatus::Failed;
            order.payment_split.split_status = SplitStatus::Failed;
            let note = format!("Pagamento recusado ({})", update.gateway_status);
            // A PIX order keeps its reservation while the code can be regenerated
            if order.payment_method.is_card()
                && order.status.can_transition(OrderStatus::Cancelled, Actor::Gateway)
            {
                order.set_status(OrderStatus::Cancelled, note, None, now);
                inventory::restore_for_order(txn, &mut order, now)?;
            } else {
                order.record("payment_failed", note, None, now);
            }
            PaymentOutcome::Failed
        }
        PaymentStatus::Refunded => {
            let reversed = mark_refunded(txn, &mut order, TransactionType::Refund, now)?;
            if order.status.can_transition(OrderStatus::Refunded, Actor::Gateway) {
                order.set_status(OrderStatus::Refunded, "Pagamento estornado", None, now);
            } else {
                order.record("payment_refunded", "Pagamento estornado", None, now);
            }
            PaymentOutcome::Refunded { reversed }
        }
        PaymentStatus::Pending => PaymentOutcome::Unchanged,
    };

    txn.put(&order)?;
    Ok(Applied { order, outcome })
}

fn approve(txn: &Txn<'_>, order: &mut Order, now: i64) -> StorageResult<PaymentOutcome> {
    order.payment_status = PaymentStatus::Paid;
    order.paid_at = Some(now);

    if order.status.is_terminal() {
        tracing::warn!(
            order_id = %order.id,
            status = %order.status,
            "Payment approved for a closed order, refund follows"
        );
        order.record("payment_after_cancel", "Pagamento aprovado após cancelamento", None, now);
        return Ok(PaymentOutcome::ApprovedAfterCancel);
    }

    if order.status.can_transition(OrderStatus::Confirmed, Actor::Gateway) {
        order.set_status(OrderStatus::Confirmed, "Pagamento aprovado", None, now);
    } else {
        order.record("payment_approved", "Pagamento aprovado", None, now);
    }
    order.payment_split.split_status = SplitStatus::Held;

    let seller_amount = order.payment_split.seller_amount;
    let mut wallet = txn
        .get::<Wallet>(&order.tenant_id)?
        .unwrap_or_else(|| Wallet::empty(order.tenant_id.clone(), now));
    wallet.balance.credit_pending(seller_amount);
    wallet.updated_at = now;
    txn.put(&wallet)?;

    tracing::info!(
        order_id = %order.id,
        tenant_id = %order.tenant_id,
        %seller_amount,
        "Payment approved, seller amount escrowed"
    );
    Ok(PaymentOutcome::Approved)
}

/// Record a refund on the order and take the seller amount back out of the
/// wallet. The caller decides what happens to the fulfillment status.
pub fn mark_refunded(
    txn: &Txn<'_>,
    order: &mut Order,
    kind: TransactionType,
    now: i64,
) -> StorageResult<Decimal> {
    order.payment_status = PaymentStatus::Refunded;
    order.refunded_at = Some(now);
    let split_status = match kind {
        TransactionType::Chargeback => SplitStatus::Chargedback,
        _ => SplitStatus::Refunded,
    };
    reverse_seller_share(txn, order, split_status, kind, now)
}

/// Remove the seller amount from whichever bucket holds it: `pending` while
/// the split is held, `available` once released. Splits in any other state
/// never reached the wallet and reverse nothing.
fn reverse_seller_share(
    txn: &Txn<'_>,
    order: &mut Order,
    split_status: SplitStatus,
    kind: TransactionType,
    now: i64,
) -> StorageResult<Decimal> {
    let bucket = match order.payment_split.split_status {
        SplitStatus::Held => Some(Bucket::Pending),
        SplitStatus::Released => Some(Bucket::Available),
        _ => None,
    };
    order.payment_split.split_status = split_status;
    let Some(bucket) = bucket else {
        return Ok(Decimal::ZERO);
    };

    let Some(mut wallet) = txn.get::<Wallet>(&order.tenant_id)? else {
        tracing::warn!(order_id = %order.id, tenant_id = %order.tenant_id, "No wallet to reverse");
        return Ok(Decimal::ZERO);
    };
    let amount = order.payment_split.seller_amount;
    let removed = wallet.balance.reverse(bucket, amount);
    if removed < amount {
        tracing::error!(
            order_id = %order.id,
            tenant_id = %order.tenant_id,
            %amount,
            %removed,
            bucket = ?bucket,
            "Wallet short while reversing seller amount"
        );
    }
    wallet.updated_at = now;
    txn.put(&wallet)?;

    let (prefix, description) = match kind {
        TransactionType::Chargeback => ("chargeback", "Chargeback"),
        _ => ("refund", "Estorno"),
    };
    txn.insert_new(&Transaction {
        id: format!("{prefix}-{}", order.id),
        tenant_id: order.tenant_id.clone(),
        kind,
        amount: -removed,
        fee: Decimal::ZERO,
        net: -removed,
        status: TransactionStatus::Completed,
        description: format!("{description} - Pedido {}", order.order_number),
        order_id: Some(order.id.clone()),
        withdrawal_id: None,
        created_at: now,
        updated_at: now,
    })?;
    Ok(removed)
}

/// Chargeback: money already left through the card network, so no refund
/// call. Reverses the seller amount, closes the order and returns its stock.
pub fn apply_chargeback(txn: &Txn<'_>, order_id: &str, now: i64) -> ServiceResult<Applied> {
    let mut order = load(txn, order_id)?;
    if order.payment_split.split_status == SplitStatus::Chargedback {
        return Ok(Applied {
            order,
            outcome: PaymentOutcome::Unchanged,
        });
    }

    let reversed = mark_refunded(txn, &mut order, TransactionType::Chargeback, now)?;
    if order.status.can_transition(OrderStatus::Refunded, Actor::Gateway) {
        order.set_status(OrderStatus::Refunded, "Chargeback", None, now);
    } else {
        order.record("chargeback", "Chargeback", None, now);
    }
    inventory::restore_for_order(txn, &mut order, now)?;
    audit::log(
        txn,
        &AuditEntry::new(&order.tenant_id, AuditAction::Chargeback, now)
            .order(&order.id)
            .detail(serde_json::json!({ "reversed": reversed })),
    )?;
    txn.put(&order)?;

    Ok(Applied {
        order,
        outcome: PaymentOutcome::Chargeback { reversed },
    })
}
