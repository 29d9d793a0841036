//! Order listings, live payment status and PIX regeneration

use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::order::{Order, OrderStatus, PIX_EXPIRY_MS, PaymentMethod, PaymentStatus, PixData};

use super::OrderService;
use super::create::CreateOrderRequest;
use crate::auth::CallerIdentity;
use crate::error::{ServiceError, ServiceResult};
use crate::store::PaymentIndex;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub status: Option<String>,
}

/// (offset, limit) for a 1-based page, limit clamped to `1..=MAX_PAGE_SIZE`
pub fn page_window(page: Option<usize>, limit: Option<usize>) -> (usize, usize) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let page = page.unwrap_or(1).max(1);
    ((page - 1) * limit, limit)
}

impl ListQuery {
    pub fn window(&self) -> (usize, usize) {
        page_window(self.page, self.limit)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentStatusView {
    pub order_id: String,
    pub payment_status: PaymentStatus,
    pub gateway_status: Option<String>,
    pub gateway_status_detail: Option<String>,
    /// Whether the gateway answered; `false` means the stored status is shown
    pub live: bool,
}

impl OrderService {
    pub fn get_order(&self, caller: &CallerIdentity, order_id: &str) -> ServiceResult<Order> {
        self.load_for_party(caller, order_id)
    }

    /// Buyer's orders, newest first
    pub fn list_buyer_orders(&self, caller: &CallerIdentity, query: &ListQuery) -> ServiceResult<OrderPage> {
        let buyer_id = caller.user_id.as_str();
        self.page(query, |o| o.buyer_user_id == buyer_id)
    }

    /// Seller's orders, newest first
    pub fn list_seller_orders(&self, caller: &CallerIdentity, query: &ListQuery) -> ServiceResult<OrderPage> {
        let tenant_id = caller.seller_tenant()?;
        self.page(query, |o| o.tenant_id == tenant_id)
    }

    fn page(&self, query: &ListQuery, owner: impl Fn(&Order) -> bool) -> ServiceResult<OrderPage> {
        let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => Some(
                OrderStatus::parse(raw)
                    .ok_or_else(|| AppError::validation(format!("Unknown status: {raw}")))?,
            ),
            None => None,
        };
        let mut orders = self
            .store
            .scan::<Order>(|o| owner(o) && status.is_none_or(|s| o.status == s))?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let (offset, limit) = query.window();
        let total = orders.len();
        let orders = orders.into_iter().skip(offset).take(limit).collect();
        Ok(OrderPage {
            orders,
            page: offset / limit + 1,
            limit,
            total,
        })
    }

    /// Ask the gateway for the current status. Any gateway failure falls back
    /// to what is stored; this read never changes the order.
    pub async fn payment_status(&self, caller: &CallerIdentity, order_id: &str) -> ServiceResult<PaymentStatusView> {
        let order = self.load_for_party(caller, order_id)?;
        let stored = PaymentStatusView {
            order_id: order.id.clone(),
            payment_status: order.payment_status,
            gateway_status: order.gateway_status.clone(),
            gateway_status_detail: order.gateway_status_detail.clone(),
            live: false,
        };
        let Some(payment_id) = order.gateway_payment_id() else {
            return Ok(stored);
        };

        let token = self.credentials.seller_or_platform_token(&order.tenant_id).await;
        match self.gateway.get_payment(&token, payment_id).await {
            Ok(payment) => Ok(PaymentStatusView {
                order_id: order.id,
                payment_status: payment.payment_status(),
                gateway_status: Some(payment.status),
                gateway_status_detail: payment.status_detail,
                live: true,
            }),
            Err(e) => {
                tracing::warn!(order_id, error = %e, "Live payment status unavailable");
                Ok(stored)
            }
        }
    }

    /// Replace an unpaid PIX charge with a fresh one. The old payment stays
    /// indexed to the order so its late notifications still resolve.
    pub async fn regenerate_pix(&self, caller: &CallerIdentity, order_id: &str, now: i64) -> ServiceResult<Order> {
        let order = self.load(order_id)?;
        if !order.is_buyer(&caller.user_id) {
            return Err(AppError::permission_denied("Only the buyer can regenerate PIX").into());
        }
        check_regenerable(&order)?;

        let token = self.credentials.seller_token(&order.tenant_id).await?;
        let request = CreateOrderRequest {
            delivery_type: order.delivery_type,
            delivery_address: order.delivery_address.clone(),
            payment_method: PaymentMethod::Pix.gateway_id().to_string(),
            card_token: None,
            installments: None,
            payer_document: None,
            customer_notes: None,
            idempotency_key: None,
        };
        let payment_request = self.payment_request(&order, caller, &request, None, now);
        let idempotency_key = format!("{}-pix-{now}", order.id);
        let payment = self
            .gateway
            .create_payment(&token, &payment_request, &idempotency_key)
            .await?;

        let index = PaymentIndex {
            payment_id: payment.id.clone(),
            order_id: order.id.clone(),
            created_at: now,
        };
        let updated = self.store.transact(|txn| {
            let mut current = txn
                .get::<Order>(order_id)?
                .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;
            check_regenerable(&current)?;
            current.payment_split.gateway_payment_id = Some(payment.id.clone());
            current.payment_status = PaymentStatus::Pending;
            current.gateway_status = Some(payment.status.clone());
            current.gateway_status_detail = payment.status_detail.clone();
            current.pix = Some(PixData {
                code: payment.pix_qr_code.clone(),
                ticket_url: payment.pix_ticket_url.clone(),
                expires_at: now + PIX_EXPIRY_MS,
            });
            current.record("pix_regenerated", "Novo código PIX gerado", Some(&caller.user_id), now);
            txn.put(&current)?;
            txn.put(&index)?;
            Ok::<_, ServiceError>(current)
        })?;

        tracing::info!(order_id, payment_id = %payment.id, "PIX regenerated");
        Ok(updated)
    }
}

fn check_regenerable(order: &Order) -> Result<(), AppError> {
    let unpaid = matches!(order.payment_status, PaymentStatus::Pending | PaymentStatus::Failed);
    if order.payment_method != PaymentMethod::Pix || !unpaid || order.status.is_terminal() {
        return Err(AppError::new(ErrorCode::PixNotRegenerable));
    }
    Ok(())
}
