//! Seller-driven status changes, cancellation with refund, tracking and
//! buyer disputes

use serde::Deserialize;
use shared::error::{AppError, ErrorCode};
use shared::models::NotificationKind;
use shared::order::{Actor, Dispute, DisputeStatus, Order, OrderStatus, PaymentStatus, SplitStatus};
use shared::wallet::TransactionType;
use validator::Validate;

use super::OrderService;
use super::payment::mark_refunded;
use crate::audit::{self, AuditAction, AuditEntry};
use crate::auth::CallerIdentity;
use crate::error::{ServiceError, ServiceResult, validate};
use crate::inventory;
use crate::store::Txn;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StatusChange {
    pub status: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TrackingUpdate {
    #[validate(length(min = 1, max = 64))]
    pub tracking_code: String,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub shipping_company: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DisputeRequest {
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
}

const CANCEL_ATTEMPTS: u32 = 3;

fn refund_key(order_id: &str) -> String {
    format!("refund-{order_id}")
}

/// Close an order as cancelled by its seller. `was_paid` is the payment
/// state the caller refunded against; `None` means a payment was approved
/// since then and nothing was written.
fn cancel_in(
    txn: &Txn<'_>,
    order_id: &str,
    actor: &str,
    was_paid: bool,
    note: &str,
    now: i64,
) -> ServiceResult<Option<Order>> {
    let mut current = txn
        .get::<Order>(order_id)?
        .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;
    if !current.status.can_transition(OrderStatus::Cancelled, Actor::Seller) {
        return Err(AppError::invalid_transition(
            current.status.as_str(),
            OrderStatus::Cancelled.as_str(),
        )
        .into());
    }
    match (was_paid, current.payment_status) {
        (false, PaymentStatus::Paid) => return Ok(None),
        (true, PaymentStatus::Paid) => {
            let reversed = mark_refunded(txn, &mut current, TransactionType::Refund, now)?;
            audit::log(
                txn,
                &AuditEntry::new(&current.tenant_id, AuditAction::CancellationRefund, now)
                    .order(&current.id)
                    .actor(actor)
                    .detail(serde_json::json!({ "amount": current.total, "reversed": reversed })),
            )?;
        }
        // Refund notification already recorded it, or nothing was paid
        _ => {}
    }
    current.set_status(OrderStatus::Cancelled, note, Some(actor), now);
    inventory::restore_for_order(txn, &mut current, now)?;
    txn.put(&current)?;
    Ok(Some(current))
}

fn default_note(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Confirmed => "Pedido confirmado pelo vendedor",
        OrderStatus::Preparing => "Pedido em preparação",
        OrderStatus::Ready => "Pedido pronto",
        OrderStatus::Shipped => "Pedido enviado",
        OrderStatus::Delivered => "Pedido entregue",
        OrderStatus::Cancelled => "Pedido cancelado pelo vendedor",
        _ => "Status atualizado",
    }
}

impl OrderService {
    fn load_for_seller(&self, caller: &CallerIdentity, order_id: &str) -> ServiceResult<Order> {
        let tenant_id = caller.seller_tenant()?;
        let order = self.load(order_id)?;
        if !order.is_seller(Some(tenant_id)) {
            return Err(AppError::permission_denied("Order belongs to another seller").into());
        }
        Ok(order)
    }

    /// Move an order along the fulfillment table on behalf of its seller.
    /// Cancelling a paid order refunds it first and fails if the refund fails.
    pub async fn update_status(
        &self,
        caller: &CallerIdentity,
        order_id: &str,
        change: StatusChange,
        now: i64,
    ) -> ServiceResult<Order> {
        validate(&change)?;
        let target = OrderStatus::parse(&change.status)
            .ok_or_else(|| AppError::validation(format!("Unknown status: {}", change.status)))?;
        let order = self.load_for_seller(caller, order_id)?;
        if !order.status.can_transition(target, Actor::Seller) {
            return Err(AppError::invalid_transition(order.status.as_str(), target.as_str()).into());
        }
        let note = change
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(default_note(target))
            .to_string();

        if target == OrderStatus::Cancelled {
            return self.cancel(caller, order, note, now).await;
        }

        let updated = self.store.transact(|txn| {
            let mut order = txn
                .get::<Order>(order_id)?
                .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;
            if !order.status.can_transition(target, Actor::Seller) {
                return Err(
                    AppError::invalid_transition(order.status.as_str(), target.as_str()).into(),
                );
            }
            order.set_status(target, note.clone(), Some(&caller.user_id), now);
            txn.put(&order)?;
            Ok::<_, ServiceError>(order)
        })?;

        tracing::info!(order_id, status = %target, "Order status updated");
        self.notifier.buyer(
            &updated,
            NotificationKind::OrderStatus,
            "Atualização do pedido",
            format!("Pedido {}: {}", updated.order_number, note),
        );
        Ok(updated)
    }

    /// Refund first when the order is paid, then close it. An approval that
    /// lands between the read and the commit sends the loop round again so
    /// the new payment is refunded before the order closes.
    async fn cancel(
        &self,
        caller: &CallerIdentity,
        mut order: Order,
        note: String,
        now: i64,
    ) -> ServiceResult<Order> {
        let mut attempt = 0;
        let (cancelled, refunded) = loop {
            attempt += 1;
            let was_paid = order.payment_status == PaymentStatus::Paid;
            if was_paid {
                self.refund_at_gateway(&order).await?;
            }
            let closed = self
                .store
                .transact(|txn| cancel_in(txn, &order.id, &caller.user_id, was_paid, &note, now));
            match closed {
                Ok(Some(cancelled)) => break (cancelled, was_paid),
                Ok(None) if attempt < CANCEL_ATTEMPTS => {
                    tracing::info!(order_id = %order.id, attempt, "Payment approved during cancellation, refunding first");
                    order = self.load(&order.id)?;
                }
                Ok(None) => {
                    return Err(AppError::with_message(
                        ErrorCode::DuplicateProcessing,
                        "Order payment changed during cancellation, try again",
                    )
                    .into());
                }
                Err(e) => {
                    if was_paid {
                        tracing::error!(
                            order_id = %order.id,
                            error = %e,
                            "Refund issued but cancellation not recorded"
                        );
                    }
                    return Err(e);
                }
            }
        };

        tracing::info!(order_id = %cancelled.id, refunded, "Order cancelled");
        self.notifier.buyer(
            &cancelled,
            NotificationKind::OrderStatus,
            "Pedido cancelado",
            if refunded {
                format!("Pedido {} cancelado. O valor será estornado.", cancelled.order_number)
            } else {
                format!("Pedido {} cancelado.", cancelled.order_number)
            },
        );
        Ok(cancelled)
    }

    /// Refund a payment approved after its order was already cancelled.
    /// Repeatable: the gateway call reuses the order's refund key and the
    /// ledger only changes while the order still reads as paid.
    pub(super) async fn refund_after_cancel(&self, order: &Order, now: i64) -> ServiceResult<()> {
        self.refund_at_gateway(order).await?;
        let refunded = self.store.transact(|txn| {
            let Some(mut current) = txn.get::<Order>(&order.id)? else {
                return Ok(None);
            };
            if current.payment_status != PaymentStatus::Paid {
                return Ok(None);
            }
            let reversed = mark_refunded(txn, &mut current, TransactionType::Refund, now)?;
            current.record(
                "payment_refunded",
                "Pagamento estornado após cancelamento",
                None,
                now,
            );
            audit::log(
                txn,
                &AuditEntry::new(&current.tenant_id, AuditAction::CancellationRefund, now)
                    .order(&current.id)
                    .detail(serde_json::json!({ "amount": current.total, "reversed": reversed })),
            )?;
            txn.put(&current)?;
            Ok::<_, ServiceError>(Some(current))
        });
        match refunded {
            Ok(Some(refunded)) => {
                tracing::info!(order_id = %refunded.id, "Payment after cancellation refunded");
                self.notify_refund(&refunded);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "Refund issued but not recorded");
                Err(e)
            }
        }
    }

    /// Full refund with the seller's credential. Any failure is reported as
    /// `REFUND_FAILED` and nothing local has changed yet.
    async fn refund_at_gateway(&self, order: &Order) -> ServiceResult<()> {
        let payment_id = order
            .gateway_payment_id()
            .ok_or_else(|| AppError::with_message(ErrorCode::RefundFailed, "Order has no payment"))?;
        let token = self.credentials.seller_token(&order.tenant_id).await?;
        self.gateway
            .refund_payment(&token, payment_id, &refund_key(&order.id))
            .await
            .map_err(|e| {
                tracing::warn!(order_id = %order.id, payment_id, error = %e, "Refund failed");
                AppError::new(ErrorCode::RefundFailed)
            })?;
        tracing::info!(order_id = %order.id, payment_id, "Refund issued");
        Ok(())
    }

    pub fn update_tracking(
        &self,
        caller: &CallerIdentity,
        order_id: &str,
        update: TrackingUpdate,
        now: i64,
    ) -> ServiceResult<Order> {
        validate(&update)?;
        self.load_for_seller(caller, order_id)?;
        let tracking_code = update.tracking_code.trim().to_string();
        if tracking_code.is_empty() {
            return Err(AppError::validation("Tracking code is required").into());
        }
        let shipping_company = update
            .shipping_company
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let order = self.store.transact(|txn| {
            let mut order = txn
                .get::<Order>(order_id)?
                .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;
            order.tracking_code = Some(tracking_code.clone());
            order.shipping_company = shipping_company.clone();
            order.updated_at = now;
            txn.put(&order)?;
            Ok::<_, ServiceError>(order)
        })?;

        self.notifier.buyer(
            &order,
            NotificationKind::OrderStatus,
            "Código de rastreio",
            format!("Pedido {}: rastreio {}", order.order_number, tracking_code),
        );
        Ok(order)
    }

    /// Buyer dispute. The refund goes out before anything local changes; on
    /// success the order is closed as disputed and refunded in one step.
    pub async fn open_dispute(
        &self,
        caller: &CallerIdentity,
        order_id: &str,
        request: DisputeRequest,
        now: i64,
    ) -> ServiceResult<Order> {
        validate(&request)?;
        let reason = request.reason.trim().to_string();
        if reason.is_empty() {
            return Err(AppError::validation("Reason is required").into());
        }
        let order = self.load(order_id)?;
        if !order.is_buyer(&caller.user_id) {
            return Err(AppError::permission_denied("Only the buyer can open a dispute").into());
        }
        check_disputable(&order)?;

        self.refund_at_gateway(&order).await?;

        let disputed = self.store.transact(|txn| {
            let mut current = txn
                .get::<Order>(order_id)?
                .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;
            check_disputable(&current)?;
            current.dispute = Some(Dispute {
                status: DisputeStatus::Open,
                reason: reason.clone(),
                opened_by: caller.user_id.clone(),
                opened_at: now,
            });
            current.set_status(OrderStatus::Disputed, reason.clone(), Some(&caller.user_id), now);
            let reversed = mark_refunded(txn, &mut current, TransactionType::Refund, now)?;
            inventory::restore_for_order(txn, &mut current, now)?;
            audit::log(
                txn,
                &AuditEntry::new(&current.tenant_id, AuditAction::DisputeOpened, now)
                    .order(&current.id)
                    .actor(&caller.user_id)
                    .detail(serde_json::json!({ "reason": reason, "reversed": reversed })),
            )?;
            txn.put(&current)?;
            Ok::<_, ServiceError>(current)
        });
        let disputed = match disputed {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(order_id, error = %e, "Refund issued but dispute not recorded");
                return Err(e);
            }
        };

        tracing::info!(order_id, "Dispute opened and refunded");
        self.notifier.seller(
            &disputed,
            NotificationKind::Dispute,
            "Disputa aberta",
            format!("O comprador abriu uma disputa no pedido {}.", disputed.order_number),
        );
        self.notifier.buyer(
            &disputed,
            NotificationKind::Dispute,
            "Disputa registrada",
            format!("Pedido {}: o valor será estornado.", disputed.order_number),
        );
        Ok(disputed)
    }
}

fn check_disputable(order: &Order) -> Result<(), AppError> {
    if order.dispute.is_some() {
        return Err(AppError::new(ErrorCode::DisputeAlreadyOpen));
    }
    if !order.status.can_transition(OrderStatus::Disputed, Actor::Buyer)
        || order.payment_status != PaymentStatus::Paid
        || order.payment_split.split_status == SplitStatus::Released
    {
        return Err(AppError::new(ErrorCode::DisputeNotAllowed)
            .with_detail("status", order.status.as_str())
            .with_detail("payment_status", order.payment_status.as_str()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LedgerStore;
    use rust_decimal::Decimal;
    use shared::order::{DeliveryType, PaymentMethod, PaymentSplit, order_number};
    use shared::wallet::Wallet;

    fn order(status: OrderStatus, payment_status: PaymentStatus, split_status: SplitStatus) -> Order {
        let total = Decimal::from(100);
        let mut payment_split = PaymentSplit::compute(total, Decimal::from(5));
        payment_split.split_status = split_status;
        Order {
            id: "o1".into(),
            order_number: order_number(1_700_000_000_000),
            tenant_id: "t1".into(),
            buyer_user_id: "b1".into(),
            items: vec![],
            subtotal: total,
            discount: Decimal::ZERO,
            delivery_fee: Decimal::ZERO,
            total,
            delivery_type: DeliveryType::Pickup,
            delivery_address: None,
            payment_method: PaymentMethod::Pix,
            payment_status,
            status,
            payment_split,
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
            created_at: 0,
            updated_at: 0,
        }
    }

    fn escrowed(store: &LedgerStore) {
        let mut wallet = Wallet::empty("t1", 0);
        wallet.balance.credit_pending(Decimal::from(95));
        store.put(&wallet).unwrap();
    }

    fn cancel(store: &LedgerStore, was_paid: bool) -> Option<Order> {
        store
            .transact(|txn| cancel_in(txn, "o1", "seller-1", was_paid, "Sem estoque", 10))
            .unwrap()
    }

    #[test]
    fn test_approval_after_read_blocks_unrefunded_cancel() {
        let store = LedgerStore::open_in_memory().unwrap();
        store
            .put(&order(OrderStatus::Confirmed, PaymentStatus::Paid, SplitStatus::Held))
            .unwrap();
        escrowed(&store);

        assert_eq!(cancel(&store, false), None);
        let stored = store.get::<Order>("o1").unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert_eq!(
            store.get::<Wallet>("t1").unwrap().unwrap().balance.pending,
            Decimal::from(95)
        );
    }

    #[test]
    fn test_refunded_cancel_reverses_escrow() {
        let store = LedgerStore::open_in_memory().unwrap();
        store
            .put(&order(OrderStatus::Confirmed, PaymentStatus::Paid, SplitStatus::Held))
            .unwrap();
        escrowed(&store);

        let cancelled = cancel(&store, true).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);
        assert_eq!(cancelled.stock_restored_at, Some(10));
        let wallet = store.get::<Wallet>("t1").unwrap().unwrap();
        assert_eq!(wallet.balance.pending, Decimal::ZERO);
        assert!(wallet.balance.is_consistent());
    }

    #[test]
    fn test_refund_already_recorded_is_not_reversed_twice() {
        let store = LedgerStore::open_in_memory().unwrap();
        store
            .put(&order(OrderStatus::Confirmed, PaymentStatus::Refunded, SplitStatus::Refunded))
            .unwrap();

        let cancelled = cancel(&store, true).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(store.get::<Wallet>("t1").unwrap().is_none());
    }

    #[test]
    fn test_unpaid_cancel_closes_order() {
        let store = LedgerStore::open_in_memory().unwrap();
        store
            .put(&order(OrderStatus::Pending, PaymentStatus::Pending, SplitStatus::Pending))
            .unwrap();

        let cancelled = cancel(&store, false).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::Pending);
        let last = cancelled.status_history.last().unwrap();
        assert_eq!(last.actor_id.as_deref(), Some("seller-1"));
    }
}
