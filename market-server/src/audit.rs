//! Audit log
//!
//! Money-moving actions (dispute, cancellation refund, chargeback, withdrawal)
//! write an entry in the same transaction as the state change they describe.

use serde::{Deserialize, Serialize};

use crate::store::{LedgerStore, StorageResult, Txn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    DisputeOpened,
    CancellationRefund,
    Chargeback,
    WithdrawalCompleted,
    WithdrawalFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub tenant_id: String,
    pub action: AuditAction,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    pub created_at: i64,
}

impl AuditEntry {
    pub fn new(tenant_id: &str, action: AuditAction, now: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            action,
            order_id: None,
            actor_id: None,
            detail: None,
            created_at: now,
        }
    }

    pub fn order(mut self, order_id: &str) -> Self {
        self.order_id = Some(order_id.to_string());
        self
    }

    pub fn actor(mut self, actor_id: &str) -> Self {
        self.actor_id = Some(actor_id.to_string());
        self
    }

    pub fn detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Write an audit entry inside the caller's transaction
pub fn log(txn: &Txn<'_>, entry: &AuditEntry) -> StorageResult<()> {
    tracing::info!(
        tenant_id = %entry.tenant_id,
        action = ?entry.action,
        order_id = ?entry.order_id,
        "Audit"
    );
    txn.put(entry)
}

/// Audit entries for a tenant, newest first
pub fn query(store: &LedgerStore, tenant_id: &str, limit: usize) -> StorageResult<Vec<AuditEntry>> {
    let mut entries = store.scan::<AuditEntry>(|e| e.tenant_id == tenant_id)?;
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    entries.truncate(limit);
    Ok(entries)
}
