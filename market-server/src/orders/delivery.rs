//! Delivery codes and buyer confirmation of receipt

use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::models::NotificationKind;
use shared::order::{DeliveryCode, Order, OrderStatus};

use super::OrderService;
use crate::auth::CallerIdentity;
use crate::error::ServiceResult;
use crate::store::Txn;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmDeliveryRequest {
    #[serde(default)]
    pub qr_code: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryConfirmation {
    pub order_id: String,
    pub delivery_confirmed_at: i64,
    /// Earliest time the seller amount is released
    pub payment_release_date: i64,
}

impl OrderService {
    /// Delivery code of an order, for its buyer or seller
    pub fn delivery_code(&self, caller: &CallerIdentity, order_id: &str) -> ServiceResult<DeliveryCode> {
        let order = self.load_for_party(caller, order_id)?;
        let code_id = order
            .delivery_code_id
            .as_deref()
            .ok_or_else(|| AppError::new(ErrorCode::DeliveryCodeNotIssued))?;
        self.store
            .get::<DeliveryCode>(code_id)?
            .ok_or_else(|| AppError::new(ErrorCode::DeliveryCodeNotIssued).into())
    }

    /// Confirm receipt by scanning the delivery code or by order id.
    /// A scanned code is consumed in the same transaction as the confirmation.
    pub fn confirm_delivery(
        &self,
        caller: &CallerIdentity,
        request: ConfirmDeliveryRequest,
        now: i64,
    ) -> ServiceResult<DeliveryConfirmation> {
        let qr_code = request
            .qr_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_uppercase);
        let order_id = request.order_id.as_deref().filter(|id| !id.is_empty());
        if qr_code.is_none() && order_id.is_none() {
            return Err(AppError::validation("qr_code or order_id is required").into());
        }
        let hold_ms = self.policy.hold_ms();

        let order = self.store.transact(|txn| {
            let target = match &qr_code {
                Some(code) => consume_code(txn, code, &caller.user_id, now)?,
                None => order_id.map(str::to_string).unwrap_or_default(),
            };
            confirm_in(txn, &target, &caller.user_id, hold_ms, now)
        })?;

        let release_at = order.payment_split.held_until.unwrap_or(now + hold_ms);
        tracing::info!(order_id = %order.id, release_at, "Delivery confirmed");
        self.notifier.seller(
            &order,
            NotificationKind::DeliveryConfirmed,
            "Entrega confirmada",
            format!(
                "Pedido {} entregue. R$ {} será liberado em {}h.",
                order.order_number, order.payment_split.seller_amount, self.policy.payment_hold_hours
            ),
        );
        Ok(DeliveryConfirmation {
            order_id: order.id,
            delivery_confirmed_at: now,
            payment_release_date: release_at,
        })
    }
}

/// Mark an unused, unexpired code as used and return its order id
fn consume_code(txn: &Txn<'_>, code: &str, user_id: &str, now: i64) -> ServiceResult<String> {
    let mut found = txn
        .scan::<DeliveryCode>(|c| c.code == code && !c.used)?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::new(ErrorCode::DeliveryCodeInvalid))?;
    if found.is_expired(now) {
        return Err(AppError::new(ErrorCode::DeliveryCodeExpired).into());
    }
    found.used = true;
    found.used_at = Some(now);
    found.used_by = Some(user_id.to_string());
    txn.put(&found)?;
    Ok(found.order_id)
}

fn confirm_in(txn: &Txn<'_>, order_id: &str, buyer_id: &str, hold_ms: i64, now: i64) -> ServiceResult<Order> {
    let mut order = txn
        .get::<Order>(order_id)?
        .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;
    if !order.is_buyer(buyer_id) {
        return Err(AppError::permission_denied("Only the buyer can confirm delivery").into());
    }
    if order.delivery_confirmed_at.is_some() {
        return Err(AppError::new(ErrorCode::DeliveryAlreadyConfirmed).into());
    }
    if !order.status.accepts_delivery_confirmation() {
        return Err(AppError::invalid_transition(order.status.as_str(), OrderStatus::Delivered.as_str()).into());
    }

    order.delivery_confirmed_at = Some(now);
    order.payment_split.held_until = Some(now + hold_ms);
    if order.status == OrderStatus::Delivered {
        order.record("delivery_confirmed", "Entrega confirmada pelo comprador", Some(buyer_id), now);
    } else {
        order.set_status(
            OrderStatus::Delivered,
            "Entrega confirmada pelo comprador",
            Some(buyer_id),
            now,
        );
    }
    txn.put(&order)?;
    Ok(order)
}
