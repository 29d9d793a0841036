//! Escrow release scheduler
//!
//! Each sweep runs two passes:
//! 1. Auto-confirm: paid orders in transit or delivered, approved more than
//!    `auto_confirm_days` ago and never confirmed by the buyer, get
//!    `delivery_confirmed_at` and a hold deadline.
//! 2. Release: held splits whose hold deadline has passed move from the
//!    seller's pending balance to available.
//!
//! Candidates are selected from a snapshot and then re-checked inside their
//! own transaction, so a sweep racing a refund or a second sweep never
//! releases the same order twice.

use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};
use shared::models::NotificationKind;
use shared::order::{Actor, Order, OrderStatus, PaymentStatus, SplitStatus};
use shared::wallet::{Transaction, TransactionStatus, TransactionType, Wallet};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::MarketPolicy;
use crate::error::ServiceResult;
use crate::notify::Notifier;
use crate::orders::payment::sale_transaction_id;
use crate::store::{LedgerStore, StorageError, Txn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub auto_confirmed: usize,
    pub released: usize,
    pub errors: usize,
}

#[derive(Clone)]
pub struct ReleaseScheduler {
    store: LedgerStore,
    notifier: Notifier,
    policy: MarketPolicy,
    interval: Duration,
}

fn auto_confirm_candidate(order: &Order, cutoff: i64) -> bool {
    order.payment_status == PaymentStatus::Paid
        && order.payment_split.split_status == SplitStatus::Held
        && order.paid_at.is_some_and(|t| t <= cutoff)
        && order.delivery_confirmed_at.is_none()
        && order.payment_released_at.is_none()
        && order.status.is_in_transit_or_delivered()
}

fn release_candidate(order: &Order, now: i64) -> bool {
    order.payment_split.split_status == SplitStatus::Held
        && order.payment_split.held_until.is_some_and(|t| t <= now)
        && order.payment_released_at.is_none()
        && order.payment_split.seller_amount > Decimal::ZERO
}

impl ReleaseScheduler {
    pub fn new(store: LedgerStore, notifier: Notifier, policy: MarketPolicy, interval: Duration) -> Self {
        Self {
            store,
            notifier,
            policy,
            interval,
        }
    }

    /// Sweep on every tick until shutdown
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Release scheduler started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Release scheduler stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let report = self.sweep(shared::util::now_millis());
                    if report != SweepReport::default() {
                        tracing::info!(
                            auto_confirmed = report.auto_confirmed,
                            released = report.released,
                            errors = report.errors,
                            "Release sweep finished"
                        );
                    }
                }
            }
        }
    }

    /// One pass over both phases. Per-order failures are counted and logged;
    /// they never stop the sweep.
    pub fn sweep(&self, now: i64) -> SweepReport {
        let mut report = SweepReport::default();
        self.auto_confirm(now, &mut report);
        self.release(now, &mut report);
        report
    }

    fn auto_confirm(&self, now: i64, report: &mut SweepReport) {
        let cutoff = now - self.policy.auto_confirm_ms();
        let candidates = match self.store.scan::<Order>(|o| auto_confirm_candidate(o, cutoff)) {
            Ok(orders) => orders,
            Err(e) => {
                tracing::error!(error = %e, "Auto-confirm scan failed");
                report.errors += 1;
                return;
            }
        };

        let hold_ms = self.policy.hold_ms();
        for candidate in candidates.into_iter().take(self.policy.release_batch_size) {
            let result = self.store.transact(|txn| {
                let Some(mut order) = txn.get::<Order>(&candidate.id)? else {
                    return Ok(false);
                };
                if !auto_confirm_candidate(&order, cutoff) {
                    return Ok(false);
                }
                order.delivery_confirmed_at = Some(now);
                order.payment_split.held_until = Some(now + hold_ms);
                let note = "Entrega confirmada automaticamente";
                if order.status.can_transition(OrderStatus::Delivered, Actor::Scheduler) {
                    order.set_status(OrderStatus::Delivered, note, None, now);
                } else {
                    order.record("delivery_auto_confirmed", note, None, now);
                }
                txn.put(&order)?;
                Ok::<_, StorageError>(true)
            });
            match result {
                Ok(true) => {
                    tracing::info!(order_id = %candidate.id, "Delivery auto-confirmed");
                    report.auto_confirmed += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(order_id = %candidate.id, error = %e, "Auto-confirm failed");
                    report.errors += 1;
                }
            }
        }
    }

    fn release(&self, now: i64, report: &mut SweepReport) {
        let mut candidates = match self.store.scan::<Order>(|o| release_candidate(o, now)) {
            Ok(orders) => orders,
            Err(e) => {
                tracing::error!(error = %e, "Release scan failed");
                report.errors += 1;
                return;
            }
        };
        candidates.sort_by_key(|o| o.payment_split.held_until);

        for candidate in candidates.into_iter().take(self.policy.release_batch_size) {
            match self.store.transact(|txn| release_in(txn, &candidate.id, now)) {
                Ok(Some(order)) => {
                    tracing::info!(
                        order_id = %order.id,
                        tenant_id = %order.tenant_id,
                        amount = %order.payment_split.seller_amount,
                        "Seller payment released"
                    );
                    report.released += 1;
                    self.notifier.seller(
                        &order,
                        NotificationKind::PaymentReleased,
                        "Pagamento liberado",
                        format!(
                            "R$ {} do pedido {} está disponível para saque.",
                            order.payment_split.seller_amount, order.order_number
                        ),
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(order_id = %candidate.id, error = %e, "Release failed");
                    report.errors += 1;
                }
            }
        }
    }
}

/// Release one order. `None` when a concurrent change made it ineligible;
/// a pending balance short of the seller amount is an error and writes nothing.
fn release_in(txn: &Txn<'_>, order_id: &str, now: i64) -> ServiceResult<Option<Order>> {
    let Some(mut order) = txn.get::<Order>(order_id)? else {
        return Ok(None);
    };
    if !release_candidate(&order, now) {
        return Ok(None);
    }
    let amount = order.payment_split.seller_amount;

    let mut wallet = txn
        .get::<Wallet>(&order.tenant_id)?
        .unwrap_or_else(|| Wallet::empty(order.tenant_id.clone(), now));
    if !wallet.balance.release(amount) {
        return Err(AppError::with_message(
            ErrorCode::InsufficientBalance,
            "Pending balance short of seller amount",
        )
        .with_detail("pending", wallet.balance.pending.to_string())
        .with_detail("amount", amount.to_string())
        .into());
    }
    wallet.updated_at = now;
    txn.put(&wallet)?;

    order.payment_split.split_status = SplitStatus::Released;
    order.payment_released_at = Some(now);
    order.record("payment_released", "Pagamento liberado ao vendedor", None, now);
    txn.put(&order)?;

    let sale_id = sale_transaction_id(&order.id);
    let sale = match txn.get::<Transaction>(&sale_id)? {
        Some(mut sale) => {
            sale.status = TransactionStatus::Completed;
            sale.updated_at = now;
            sale
        }
        None => Transaction {
            id: sale_id,
            tenant_id: order.tenant_id.clone(),
            kind: TransactionType::Sale,
            amount: order.total,
            fee: order.payment_split.platform_fee_amount,
            net: amount,
            status: TransactionStatus::Completed,
            description: format!("Venda - Pedido {}", order.order_number),
            order_id: Some(order.id.clone()),
            withdrawal_id: None,
            created_at: now,
            updated_at: now,
        },
    };
    txn.put(&sale)?;

    Ok(Some(order))
}
