// market-server/tests/common/mod.rs
// Shared fixtures: in-memory store, scripted gateway, seeded seller/products

#![allow(dead_code)]

use async_trait::async_trait;
use market_server::auth::CallerIdentity;
use market_server::cart::AddItemRequest;
use market_server::gateway::signature;
use market_server::gateway::{
    BankTransfer, CreatePayment, GatewayError, GatewayPayment, GatewayResult, OAuthGrant,
    PaymentGateway, TransferReceipt,
};
use market_server::notify::{Notifier, Outgoing};
use market_server::orders::CreateOrderRequest;
use market_server::webhook::{Handled, WebhookError};
use market_server::{AppState, Config, LedgerStore, MarketPolicy};
use rust_decimal::Decimal;
use shared::models::{Product, SellerAccount, SellerCredential};
use shared::order::{DeliveryType, Order};
use shared::util::now_millis;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const TENANT: &str = "t-loja";
pub const SELLER_USER: &str = "u-seller";
pub const BUYER: &str = "u-buyer";
pub const WEBHOOK_SECRET: &str = "whsec-test";
pub const JWT_SECRET: &str = "jwt-test-secret";
pub const GATEWAY_USER: &str = "mp-user-1";

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Scripted payment gateway
#[derive(Default)]
pub struct MockGateway {
    payments: Mutex<HashMap<String, GatewayPayment>>,
    /// Raw status returned by `create_payment`; `pending` when unset
    create_status: Mutex<Option<String>>,
    pub last_create: Mutex<Option<CreatePayment>>,
    next_id: AtomicU32,
    pub fail_create: AtomicBool,
    pub fail_refund: AtomicBool,
    pub fail_transfer: AtomicBool,
    pub creates: AtomicU32,
    pub refunds: AtomicU32,
    pub refreshes: AtomicU32,
    pub transfers: AtomicU32,
    refresh_delay: Mutex<Duration>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn create_with_status(&self, status: &str) {
        *self.create_status.lock().unwrap() = Some(status.to_string());
    }

    /// Change what the gateway reports for a payment
    pub fn set_status(&self, payment_id: &str, status: &str) {
        let mut payments = self.payments.lock().unwrap();
        let payment = payments.entry(payment_id.to_string()).or_default();
        payment.id = payment_id.to_string();
        payment.status = status.to_string();
    }

    pub fn status_of(&self, payment_id: &str) -> Option<String> {
        self.payments
            .lock()
            .unwrap()
            .get(payment_id)
            .map(|p| p.status.clone())
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_payment(
        &self,
        _access_token: &str,
        request: &CreatePayment,
        _idempotency_key: &str,
    ) -> GatewayResult<GatewayPayment> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        *self.last_create.lock().unwrap() = Some(request.clone());
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: 400,
                body: "{\"message\":\"invalid card\"}".into(),
            });
        }
        let id = format!("pay-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let status = self
            .create_status
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "pending".into());
        let is_pix = request.payment_method_id == "pix";
        let payment = GatewayPayment {
            id: id.clone(),
            status,
            status_detail: None,
            external_reference: Some(request.external_reference.clone()),
            pix_qr_code: is_pix.then(|| format!("00020126-{id}")),
            pix_ticket_url: is_pix.then(|| format!("https://pix.example/{id}")),
        };
        self.payments.lock().unwrap().insert(id, payment.clone());
        Ok(payment)
    }

    async fn get_payment(&self, _access_token: &str, payment_id: &str) -> GatewayResult<GatewayPayment> {
        self.payments
            .lock()
            .unwrap()
            .get(payment_id)
            .cloned()
            .ok_or(GatewayError::Api {
                status: 404,
                body: "not found".into(),
            })
    }

    async fn refund_payment(
        &self,
        _access_token: &str,
        payment_id: &str,
        _idempotency_key: &str,
    ) -> GatewayResult<()> {
        if self.fail_refund.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("connection reset".into()));
        }
        self.refunds.fetch_add(1, Ordering::SeqCst);
        self.set_status(payment_id, "refunded");
        Ok(())
    }

    async fn exchange_code(&self, code: &str) -> GatewayResult<OAuthGrant> {
        if code == "bad" {
            return Err(GatewayError::Api {
                status: 400,
                body: "invalid_grant".into(),
            });
        }
        Ok(OAuthGrant {
            access_token: format!("seller-token-{code}"),
            refresh_token: "seller-refresh".into(),
            user_id: GATEWAY_USER.into(),
            public_key: Some("APP_USR-pk".into()),
            expires_in: 6 * 60 * 60,
        })
    }

    async fn refresh_token(&self, _refresh_token: &str) -> GatewayResult<OAuthGrant> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.refresh_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(OAuthGrant {
            access_token: format!("refreshed-{n}"),
            refresh_token: "seller-refresh-2".into(),
            user_id: GATEWAY_USER.into(),
            public_key: None,
            expires_in: 6 * 60 * 60,
        })
    }

    async fn create_bank_transfer(
        &self,
        _access_token: &str,
        transfer: &BankTransfer,
        _idempotency_key: &str,
    ) -> GatewayResult<TransferReceipt> {
        if self.fail_transfer.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: 422,
                body: "invalid account".into(),
            });
        }
        self.transfers.fetch_add(1, Ordering::SeqCst);
        Ok(TransferReceipt {
            id: format!("tr-{}", transfer.external_reference),
        })
    }

    fn authorization_url(&self, state: &str) -> GatewayResult<String> {
        Ok(format!("https://auth.example/authorization?state={state}"))
    }
}

pub fn test_config() -> Config {
    Config {
        environment: "development".into(),
        http_port: 0,
        data_dir: String::new(),
        log_level: None,
        log_json: false,
        log_dir: None,
        jwt_secret: JWT_SECRET.into(),
        mp_access_token: "platform-token".into(),
        mp_public_key: None,
        mp_client_id: Some("client-id".into()),
        mp_client_secret: Some("client-secret".into()),
        mp_webhook_secret: Some(WEBHOOK_SECRET.into()),
        mp_oauth_redirect_uri: None,
        mp_api_base: None,
        release_interval_secs: 60,
        policy: MarketPolicy::default(),
    }
}

pub struct Harness {
    pub state: AppState,
    pub gateway: Arc<MockGateway>,
    /// Held so queued notifications are not dropped on a closed channel
    pub notifications: mpsc::Receiver<Outgoing>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = LedgerStore::open_in_memory().unwrap();
        let gateway = MockGateway::new();
        let (notifier, notifications) = Notifier::channel(1024);
        let state = AppState::new(config, store, gateway.clone(), notifier);
        Self {
            state,
            gateway,
            notifications,
        }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.state.store
    }

    /// Seller with a connected gateway account and a long-lived token
    pub fn seed_seller(&self) {
        let now = now_millis();
        self.store()
            .put(&SellerAccount {
                tenant_id: TENANT.into(),
                owner_user_id: SELLER_USER.into(),
                name: "Loja Teste".into(),
                gateway_connected: true,
                gateway_user_id: Some(GATEWAY_USER.into()),
                connected_at: Some(now),
                oauth_state: None,
                updated_at: now,
            })
            .unwrap();
        self.store()
            .put(&SellerCredential {
                tenant_id: TENANT.into(),
                access_token: "seller-token".into(),
                refresh_token: "seller-refresh".into(),
                gateway_user_id: GATEWAY_USER.into(),
                public_key: None,
                expires_at: now + 6 * 60 * 60 * 1000,
                updated_at: now,
            })
            .unwrap();
    }

    pub fn seed_product(&self, id: &str, price: &str, quantity: u32) -> Product {
        let product = Product {
            id: id.into(),
            tenant_id: TENANT.into(),
            name: format!("Produto {id}"),
            price: d(price),
            promo_price: None,
            quantity,
            variants: Vec::new(),
            is_active: true,
        };
        self.store().put(&product).unwrap();
        product
    }

    pub fn product(&self, id: &str) -> Product {
        self.store().get::<Product>(id).unwrap().unwrap()
    }

    pub fn order(&self, id: &str) -> Order {
        self.store().get::<Order>(id).unwrap().unwrap()
    }

    pub fn add_to_cart(&self, buyer: &CallerIdentity, product_id: &str, quantity: u32) {
        self.state
            .carts
            .add_item(
                &buyer.user_id,
                &AddItemRequest {
                    product_id: product_id.into(),
                    variant_id: None,
                    quantity,
                },
                now_millis(),
            )
            .unwrap();
    }

    /// Put `quantity` of `product_id` in the cart and check out with PIX
    pub async fn checkout(&self, buyer: &CallerIdentity, product_id: &str, quantity: u32) -> Order {
        self.add_to_cart(buyer, product_id, quantity);
        self.state
            .orders
            .create_order(buyer, pix_request(None), now_millis())
            .await
            .unwrap()
    }

    /// Checkout approved through a signed payment webhook
    pub async fn paid_order(&self, buyer: &CallerIdentity, product_id: &str, quantity: u32) -> Order {
        let order = self.checkout(buyer, product_id, quantity).await;
        let payment_id = order.payment_split.gateway_payment_id.clone().unwrap();
        self.gateway.set_status(&payment_id, "approved");
        let handled = self
            .payment_webhook(&payment_id, &format!("req-approve-{payment_id}"))
            .await
            .unwrap();
        assert_eq!(handled, Handled::Processed);
        self.order(&order.id)
    }

    /// Deliver a correctly signed `payment` notification
    pub async fn payment_webhook(&self, payment_id: &str, request_id: &str) -> Result<Handled, WebhookError> {
        let body = payment_body(payment_id);
        let header = signature::sign(payment_id, request_id, "1700000000", WEBHOOK_SECRET);
        self.state
            .webhook
            .handle(
                Some(&header),
                Some(request_id),
                body.as_bytes(),
                &HashMap::new(),
                now_millis(),
            )
            .await
    }
}

pub fn payment_body(payment_id: &str) -> String {
    format!(r#"{{"type":"payment","action":"payment.updated","data":{{"id":"{payment_id}"}}}}"#)
}

pub fn buyer() -> CallerIdentity {
    CallerIdentity {
        user_id: BUYER.into(),
        email: "comprador@example.com".into(),
        name: Some("Ana Souza".into()),
        tenant_id: None,
    }
}

pub fn seller() -> CallerIdentity {
    CallerIdentity {
        user_id: SELLER_USER.into(),
        email: "loja@example.com".into(),
        name: Some("Loja Teste".into()),
        tenant_id: Some(TENANT.into()),
    }
}

pub fn pix_request(idempotency_key: Option<&str>) -> CreateOrderRequest {
    CreateOrderRequest {
        delivery_type: DeliveryType::Pickup,
        delivery_address: None,
        payment_method: "pix".into(),
        card_token: None,
        installments: None,
        payer_document: Some("123.456.789-09".into()),
        customer_notes: None,
        idempotency_key: idempotency_key.map(str::to_string),
    }
}
