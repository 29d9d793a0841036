//! Marketplace order and payment backend
//!
//! Orders are paid through a split payment on the seller's gateway account.
//! The seller amount is escrowed in a pending balance and released once
//! delivery is confirmed and the hold period has passed.
//!
//! # Module layout
//!
//! ```text
//! market-server/src/
//! ├── store/         # redb ledger store (documents, transactions)
//! ├── gateway/       # payment gateway trait, Mercado Pago client, signatures
//! ├── orders/        # checkout, payment outcomes, lifecycle, delivery
//! ├── api/           # HTTP routes and handlers
//! ├── wallet.rs      # balances and withdrawals
//! ├── webhook.rs     # gateway notification reconciler
//! ├── scheduler.rs   # escrow auto-confirm and release
//! └── ...            # cart, sellers, credentials, idempotency, inventory
//! ```

pub mod api;
pub mod audit;
pub mod auth;
pub mod cart;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod idempotency;
pub mod inventory;
pub mod logger;
pub mod notify;
pub mod orders;
pub mod scheduler;
pub mod sellers;
pub mod state;
pub mod store;
pub mod tasks;
pub mod wallet;
pub mod webhook;

use anyhow::Context;
use std::sync::Arc;

pub use config::{Config, MarketPolicy};
pub use error::{ServiceError, ServiceResult};
pub use state::AppState;
pub use store::LedgerStore;

use gateway::{MercadoPagoClient, OAuthApp};
use notify::{LogPushSender, NotificationWorker, Notifier, QUEUE_CAPACITY};
use tasks::{BackgroundTasks, TaskKind};

/// Open the store, start background tasks and serve HTTP until Ctrl-C
pub async fn run(config: Config) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create data dir {}", config.data_dir))?;
    let db_path = config.database_path();
    let store = LedgerStore::open(&db_path)
        .with_context(|| format!("Failed to open ledger store at {}", db_path.display()))?;

    let gateway = MercadoPagoClient::new(
        config.mp_api_base.clone(),
        OAuthApp {
            client_id: config.mp_client_id.clone(),
            client_secret: config.mp_client_secret.clone(),
            redirect_uri: config.mp_oauth_redirect_uri.clone(),
        },
    )
    .context("Failed to build gateway client")?;
    if config.mp_webhook_secret.is_none() {
        tracing::warn!("MP_WEBHOOK_SECRET not set, webhook deliveries will be rejected");
    }

    let (notifier, notifications) = Notifier::channel(QUEUE_CAPACITY);
    let http_port = config.http_port;
    let state = AppState::new(config, store.clone(), Arc::new(gateway), notifier);

    let mut tasks = BackgroundTasks::new();
    let shutdown = tasks.shutdown_token();
    let worker = NotificationWorker::new(store, Arc::new(LogPushSender));
    tasks.spawn(
        "notification_worker",
        TaskKind::Worker,
        worker.run(notifications, shutdown.clone()),
    );
    tasks.spawn(
        "release_scheduler",
        TaskKind::Periodic,
        state.release_scheduler().run(shutdown.clone()),
    );
    tasks.log_summary();

    let app = api::create_router(state);
    let addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("market-server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
        })
        .await
        .context("HTTP server error")?;

    tasks.shutdown().await;
    Ok(())
}
