//! Notification queue
//!
//! Services enqueue through [`Notifier`], which never fails and never blocks.
//! [`NotificationWorker`] persists each in-app notification and forwards it
//! to a [`PushSender`], retrying with exponential backoff. Losing a
//! notification never affects the ledger.

use async_trait::async_trait;
use shared::models::{Notification, NotificationKind, SellerAccount};
use shared::order::Order;
use shared::util::now_millis;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::store::{LedgerStore, StorageError, StorageResult};

pub const QUEUE_CAPACITY: usize = 1024;
const MAX_SEND_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 200;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Push delivery failed: {0}")]
    Delivery(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    User(String),
    /// Resolved to the seller account's owner by the worker
    Seller(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub recipient: Recipient,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub order_id: Option<String>,
}

/// Cheap, cloneable handle to the notification queue
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Outgoing>,
}

impl Notifier {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outgoing>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueue; a full or closed queue drops the message with a warning
    pub fn notify(&self, message: Outgoing) {
        if let Err(e) = self.tx.try_send(message) {
            tracing::warn!(error = %e, "Notification dropped");
        }
    }

    pub fn buyer(&self, order: &Order, kind: NotificationKind, title: &str, body: String) {
        self.notify(Outgoing {
            recipient: Recipient::User(order.buyer_user_id.clone()),
            kind,
            title: title.to_string(),
            body,
            order_id: Some(order.id.clone()),
        });
    }

    pub fn seller(&self, order: &Order, kind: NotificationKind, title: &str, body: String) {
        self.notify(Outgoing {
            recipient: Recipient::Seller(order.tenant_id.clone()),
            kind,
            title: title.to_string(),
            body,
            order_id: Some(order.id.clone()),
        });
    }

    pub fn seller_tenant(&self, tenant_id: &str, kind: NotificationKind, title: &str, body: String) {
        self.notify(Outgoing {
            recipient: Recipient::Seller(tenant_id.to_string()),
            kind,
            title: title.to_string(),
            body,
            order_id: None,
        });
    }
}

/// Delivery channel to user devices
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Sender that only logs; used until a push provider is configured
pub struct LogPushSender;

#[async_trait]
impl PushSender for LogPushSender {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            user_id = %notification.user_id,
            kind = ?notification.kind,
            title = %notification.title,
            "Push notification"
        );
        Ok(())
    }
}

pub struct NotificationWorker {
    store: LedgerStore,
    sender: Arc<dyn PushSender>,
}

impl NotificationWorker {
    pub fn new(store: LedgerStore, sender: Arc<dyn PushSender>) -> Self {
        Self { store, sender }
    }

    pub async fn run(self, mut rx: mpsc::Receiver<Outgoing>, shutdown: CancellationToken) {
        tracing::info!("Notification worker started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                message = rx.recv() => match message {
                    Some(message) => {
                        if let Err(e) = self.deliver(message).await {
                            tracing::warn!(error = %e, "Notification not stored");
                        }
                    }
                    None => break,
                },
            }
        }
        tracing::info!("Notification worker stopped");
    }

    /// Persist the in-app notification, then push it
    pub async fn deliver(&self, message: Outgoing) -> Result<Notification, NotifyError> {
        let user_id = self.resolve(&message.recipient)?;
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            kind: message.kind,
            title: message.title,
            body: message.body,
            order_id: message.order_id,
            is_read: false,
            created_at: now_millis(),
        };
        self.store.put(&notification)?;

        for attempt in 1..=MAX_SEND_ATTEMPTS {
            match self.sender.send(&notification).await {
                Ok(()) => break,
                Err(e) if attempt < MAX_SEND_ATTEMPTS => {
                    let delay = RETRY_BASE_DELAY_MS * 2u64.pow(attempt - 1);
                    tracing::debug!(attempt, error = %e, delay_ms = delay, "Push failed, retrying");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => {
                    tracing::warn!(
                        notification_id = %notification.id,
                        error = %e,
                        "Push failed after {MAX_SEND_ATTEMPTS} attempts, dropping"
                    );
                }
            }
        }
        Ok(notification)
    }

    fn resolve(&self, recipient: &Recipient) -> StorageResult<String> {
        match recipient {
            Recipient::User(id) => Ok(id.clone()),
            Recipient::Seller(tenant_id) => Ok(self
                .store
                .get::<SellerAccount>(tenant_id)?
                .map(|a| a.owner_user_id)
                .unwrap_or_else(|| tenant_id.clone())),
        }
    }
}

/// Latest notifications of a user, newest first
pub fn list_for_user(store: &LedgerStore, user_id: &str, limit: usize) -> StorageResult<Vec<Notification>> {
    let mut items = store.scan::<Notification>(|n| n.user_id == user_id)?;
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    items.truncate(limit);
    Ok(items)
}

/// Mark one of the user's notifications read. Returns false if not found.
pub fn mark_read(store: &LedgerStore, user_id: &str, id: &str) -> StorageResult<bool> {
    store.transact(|txn| {
        match txn.get::<Notification>(id)? {
            Some(mut n) if n.user_id == user_id => {
                n.is_read = true;
                txn.put(&n)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    })
}
