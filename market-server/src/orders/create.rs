//! Checkout: cart to order with a split payment

use rust_decimal::Decimal;
use serde::Deserialize;
use shared::error::{AppError, ErrorCode};
use shared::models::{Cart, NotificationKind, Product};
use shared::money;
use shared::order::{
    DeliveryAddress, DeliveryType, Order, OrderItem, OrderStatus, PIX_EXPIRY_MS, PaymentMethod,
    PaymentSplit, PaymentStatus, PixData, order_number,
};
use std::collections::HashMap;
use validator::Validate;

use super::payment::{Applied, PaymentOutcome, PaymentUpdate, apply_payment_status};
use super::OrderService;
use crate::auth::CallerIdentity;
use crate::error::{ServiceResult, validate};
use crate::gateway::{CreatePayment, Identification, Payer, money_release_days};
use crate::idempotency::{Begin, order_key};
use crate::inventory::{self, StockLine};
use crate::store::{PaymentIndex, Txn};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub delivery_type: DeliveryType,
    #[serde(default)]
    pub delivery_address: Option<DeliveryAddress>,
    /// `pix`, `credit_card` or `debit_card`
    pub payment_method: String,
    #[serde(default)]
    pub card_token: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1, max = 12))]
    pub installments: Option<u32>,
    /// CPF of the payer, digits only or formatted
    #[serde(default)]
    pub payer_document: Option<String>,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub customer_notes: Option<String>,
    /// Client retry key; defaults to the generated order id
    #[serde(default)]
    #[validate(length(min = 8, max = 128))]
    pub idempotency_key: Option<String>,
}

impl OrderService {
    /// Turn the caller's cart into an order and submit its payment.
    ///
    /// Stock is reserved before the gateway is called and returned on every
    /// failure after that point, so stock is never left decremented without
    /// a persisted order.
    pub async fn create_order(
        &self,
        caller: &CallerIdentity,
        request: CreateOrderRequest,
        now: i64,
    ) -> ServiceResult<Order> {
        validate(&request)?;
        let method = PaymentMethod::parse(&request.payment_method)
            .ok_or_else(|| AppError::new(ErrorCode::PaymentInvalidMethod))?;
        let card_token = request
            .card_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        if method.is_card() && card_token.is_none() {
            return Err(AppError::new(ErrorCode::CardTokenRequired).into());
        }
        if request.delivery_type == DeliveryType::Delivery && request.delivery_address.is_none() {
            return Err(AppError::validation("Delivery address is required").into());
        }

        let order_id = uuid::Uuid::new_v4().to_string();
        let key = order_key(
            &caller.user_id,
            request.idempotency_key.as_deref().unwrap_or(&order_id),
        );
        match self.idempotency.begin(&key, now)? {
            Begin::Started => {}
            Begin::Completed(Some(existing)) => {
                tracing::info!(order_id = %existing, "Replaying completed checkout");
                return self.load_for_party(caller, &existing);
            }
            Begin::Completed(None) => {
                return Err(AppError::internal("Completed checkout without an order").into());
            }
        }

        let cart = match self.checkout_cart(&caller.user_id) {
            Ok(cart) => cart,
            Err(e) => {
                self.release_key(&key);
                return Err(e);
            }
        };
        let tenant_id = cart.items[0].tenant_id.clone();
        let lines: Vec<StockLine> = cart.items.iter().map(StockLine::from).collect();

        // Reserve and price against the same product snapshot
        let items = match self.store.transact(|txn| reserve_and_price(txn, &cart, &lines)) {
            Ok(items) => items,
            Err(e) => {
                self.release_key(&key);
                return Err(e);
            }
        };

        let mut order = self.build_order(caller, &request, order_id, tenant_id, items, method, now);
        if order.total <= Decimal::ZERO {
            self.compensate(&lines, &key, "non-positive total", now);
            return Err(AppError::new(ErrorCode::InvalidOrderTotal).into());
        }

        let token = match self.credentials.seller_token(&order.tenant_id).await {
            Ok(token) => token,
            Err(e) => {
                self.compensate(&lines, &key, "seller not connected", now);
                return Err(e);
            }
        };

        let payment_request = self.payment_request(&order, caller, &request, card_token, now);
        let payment = match self
            .gateway
            .create_payment(&token, &payment_request, &order.id)
            .await
        {
            Ok(payment) => payment,
            Err(e) => {
                self.compensate(&lines, &key, "payment creation failed", now);
                return Err(e.into());
            }
        };

        order.payment_split.gateway_payment_id = Some(payment.id.clone());
        order.gateway_status = Some(payment.status.clone());
        order.gateway_status_detail = payment.status_detail.clone();
        if method == PaymentMethod::Pix {
            order.pix = Some(PixData {
                code: payment.pix_qr_code.clone(),
                ticket_url: payment.pix_ticket_url.clone(),
                expires_at: now + PIX_EXPIRY_MS,
            });
        }
        let update = PaymentUpdate::from(&payment);
        let index = PaymentIndex {
            payment_id: payment.id.clone(),
            order_id: order.id.clone(),
            created_at: now,
        };

        let persisted = self.store.transact(|txn| {
            txn.put(&order)?;
            txn.put(&index)?;
            txn.delete::<Cart>(&caller.user_id)?;
            if update.status == PaymentStatus::Pending {
                Ok(Applied {
                    order: order.clone(),
                    outcome: PaymentOutcome::Unchanged,
                })
            } else {
                apply_payment_status(txn, &order.id, &update, now)
            }
        });
        let applied = match persisted {
            Ok(applied) => applied,
            Err(e) => {
                tracing::error!(
                    order_id = %order.id,
                    payment_id = %payment.id,
                    error = %e,
                    "Payment created but order not persisted"
                );
                self.compensate(&lines, &key, "order not persisted", now);
                return Err(e);
            }
        };

        if let Err(e) = self.idempotency.complete(&key, Some(&order.id), now) {
            tracing::warn!(key = %key, error = %e, "Failed to complete idempotency record");
        }
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            tenant_id = %order.tenant_id,
            total = %order.total,
            method = method.gateway_id(),
            gateway_status = %payment.status,
            "Order created"
        );

        let created = &applied.order;
        self.notifier.seller(
            created,
            NotificationKind::OrderCreated,
            "Novo pedido",
            format!("Pedido {} recebido (R$ {}).", created.order_number, created.total),
        );
        self.notifier.buyer(
            created,
            NotificationKind::OrderCreated,
            "Pedido realizado",
            format!("Pedido {} aguardando pagamento.", created.order_number),
        );
        if let Err(e) = self.after_payment(&applied, now).await {
            tracing::error!(order_id = %order.id, error = %e, "Post-payment step failed");
        }
        Ok(applied.order)
    }

    fn checkout_cart(&self, buyer_id: &str) -> ServiceResult<Cart> {
        let cart = self
            .store
            .get::<Cart>(buyer_id)?
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::new(ErrorCode::CartEmpty))?;
        if cart.single_tenant().is_none() {
            return Err(AppError::new(ErrorCode::MixedSellerCart).into());
        }
        Ok(cart)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_order(
        &self,
        caller: &CallerIdentity,
        request: &CreateOrderRequest,
        order_id: String,
        tenant_id: String,
        items: Vec<OrderItem>,
        method: PaymentMethod,
        now: i64,
    ) -> Order {
        let subtotal: Decimal = items.iter().map(|i| i.total).sum();
        let discount = Decimal::ZERO;
        let delivery_fee = Decimal::ZERO;
        let total = money::round2(subtotal - discount + delivery_fee);
        let mut order = Order {
            id: order_id,
            order_number: order_number(now),
            tenant_id,
            buyer_user_id: caller.user_id.clone(),
            items,
            subtotal,
            discount,
            delivery_fee,
            total,
            delivery_type: request.delivery_type,
            delivery_address: match request.delivery_type {
                DeliveryType::Delivery => request.delivery_address.clone(),
                DeliveryType::Pickup => None,
            },
            payment_method: method,
            payment_status: PaymentStatus::Pending,
            status: OrderStatus::Pending,
            payment_split: PaymentSplit::compute(total, self.policy.platform_fee_percentage),
            status_history: Vec::new(),
            customer_notes: request
                .customer_notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
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
            created_at: now,
            updated_at: now,
        };
        order.record(OrderStatus::Pending.as_str(), "Pedido criado", Some(&caller.user_id), now);
        order
    }

    pub(super) fn payment_request(
        &self,
        order: &Order,
        caller: &CallerIdentity,
        request: &CreateOrderRequest,
        card_token: Option<String>,
        now: i64,
    ) -> CreatePayment {
        let method = order.payment_method;
        let (first_name, last_name) = split_name(caller.name.as_deref());
        CreatePayment {
            transaction_amount: order.total,
            description: format!("Pedido {}", order.order_number),
            payment_method_id: method.gateway_id().to_string(),
            token: if method.is_card() { card_token } else { None },
            installments: match method {
                PaymentMethod::CreditCard => Some(request.installments.unwrap_or(1)),
                PaymentMethod::DebitCard => Some(1),
                PaymentMethod::Pix => None,
            },
            payer: Payer {
                email: caller.email.clone(),
                first_name,
                last_name,
                identification: request.payer_document.as_deref().and_then(|doc| {
                    let number: String = doc.chars().filter(char::is_ascii_digit).collect();
                    (!number.is_empty()).then(|| Identification {
                        kind: "CPF".into(),
                        number,
                    })
                }),
            },
            notification_url: self.policy.notification_url.clone(),
            external_reference: order.id.clone(),
            application_fee: order.payment_split.platform_fee_amount,
            money_release_days: money_release_days(self.policy.payment_hold_hours),
            date_of_expiration: (method == PaymentMethod::Pix)
                .then(|| pix_expiration(now))
                .flatten(),
            metadata: serde_json::json!({
                "order_id": order.id,
                "order_number": order.order_number,
                "tenant_id": order.tenant_id,
                "buyer_id": order.buyer_user_id,
            }),
        }
    }

    fn release_key(&self, key: &str) {
        if let Err(e) = self.idempotency.release(key) {
            tracing::warn!(key, error = %e, "Failed to release idempotency key");
        }
    }

    /// Undo a reservation after a failure further down the checkout
    fn compensate(&self, lines: &[StockLine], key: &str, reason: &str, now: i64) {
        if let Err(e) = inventory::restore_now(&self.store, lines) {
            tracing::error!(key, error = %e, "Failed to restore reserved stock");
        }
        if let Err(e) = self.idempotency.fail(key, reason, now) {
            tracing::warn!(key, error = %e, "Failed to mark idempotency key failed");
        }
    }
}

/// Reserve stock and price every line from the authoritative product
fn reserve_and_price(txn: &Txn<'_>, cart: &Cart, lines: &[StockLine]) -> ServiceResult<Vec<OrderItem>> {
    let products: HashMap<String, Product> = inventory::reserve(txn, lines)?;
    cart.items
        .iter()
        .map(|item| -> ServiceResult<OrderItem> {
            let product = products
                .get(&item.product_id)
                .ok_or_else(|| AppError::new(ErrorCode::ProductNotFound))?;
            if product.tenant_id != item.tenant_id {
                return Err(AppError::validation("Product does not belong to the cart's seller")
                    .with_detail("product_id", product.id.clone())
                    .into());
            }
            let unit_price = product
                .unit_price(item.variant_id.as_deref())
                .ok_or_else(|| {
                    AppError::new(ErrorCode::ProductUnavailable)
                        .with_detail("product_id", product.id.clone())
                })?;
            let variant_name = item
                .variant_id
                .as_deref()
                .and_then(|id| product.variant(id))
                .map(|v| v.name.as_str());
            Ok(OrderItem {
                product_id: product.id.clone(),
                variant_id: item.variant_id.clone(),
                name: match variant_name {
                    Some(v) => format!("{} ({v})", product.name),
                    None => product.name.clone(),
                },
                quantity: item.quantity,
                unit_price,
                total: money::line_total(unit_price, item.quantity),
            })
        })
        .collect()
}

fn split_name(name: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return (None, None);
    };
    match name.split_once(' ') {
        Some((first, last)) => (Some(first.to_string()), Some(last.trim().to_string())),
        None => (Some(name.to_string()), None),
    }
}

fn pix_expiration(now: i64) -> Option<String> {
    chrono::DateTime::from_timestamp_millis(now + PIX_EXPIRY_MS)
        .map(|d| d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}
