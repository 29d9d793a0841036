//! Application state shared by every handler

use std::sync::Arc;
use std::time::Duration;

use crate::cart::CartService;
use crate::config::Config;
use crate::credentials::CredentialResolver;
use crate::gateway::PaymentGateway;
use crate::notify::Notifier;
use crate::orders::OrderService;
use crate::scheduler::ReleaseScheduler;
use crate::sellers::SellerService;
use crate::store::LedgerStore;
use crate::wallet::WalletService;
use crate::webhook::WebhookReconciler;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Ledger database
    pub store: LedgerStore,
    pub orders: OrderService,
    pub wallet: WalletService,
    pub sellers: SellerService,
    pub carts: CartService,
    pub webhook: WebhookReconciler,
    /// Queue into the notification worker
    pub notifier: Notifier,
}

impl AppState {
    /// Wire every service over one store and one gateway client
    pub fn new(
        config: Config,
        store: LedgerStore,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Notifier,
    ) -> Self {
        let credentials =
            CredentialResolver::new(store.clone(), gateway.clone(), config.mp_access_token.clone());
        let orders = OrderService::new(
            store.clone(),
            gateway.clone(),
            credentials.clone(),
            notifier.clone(),
            config.policy.clone(),
        );
        let sellers = SellerService::new(store.clone(), gateway.clone(), notifier.clone());
        let wallet = WalletService::new(
            store.clone(),
            gateway.clone(),
            credentials.clone(),
            notifier.clone(),
        );
        let webhook = WebhookReconciler::new(
            orders.clone(),
            sellers.clone(),
            gateway,
            credentials,
            config.mp_webhook_secret.clone(),
        );

        Self {
            config: Arc::new(config),
            carts: CartService::new(store.clone()),
            store,
            orders,
            wallet,
            sellers,
            webhook,
            notifier,
        }
    }

    pub fn release_scheduler(&self) -> ReleaseScheduler {
        ReleaseScheduler::new(
            self.store.clone(),
            self.notifier.clone(),
            self.config.policy.clone(),
            Duration::from_secs(self.config.release_interval_secs.max(1)),
        )
    }
}
