//! Idempotency guard for order creation and webhook deliveries
//!
//! A record moves `processing -> completed | failed`. Only one caller at a
//! time can hold a key in `processing`; a second caller gets
//! `DUPLICATE_PROCESSING` and is expected to surface it, not retry.
//! A `failed` record may be claimed again. A `processing` record older than
//! the lease is treated as abandoned by a crashed worker and can be claimed.

use serde::{Deserialize, Serialize};
use shared::error::AppError;

use crate::error::ServiceResult;
use crate::store::{LedgerStore, StorageResult};

/// How long a `processing` claim is honored
pub const PROCESSING_LEASE_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub status: IdempotencyStatus,
    /// Result reference of a completed run (e.g. the order id)
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Outcome of [`IdempotencyGuard::begin`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Begin {
    /// Key claimed; the caller must finish with `complete`, `fail` or `release`
    Started,
    /// Already done; carries the prior result
    Completed(Option<String>),
}

/// Checkout keys are scoped to the buyer so two buyers never share a result
pub fn order_key(buyer_id: &str, key: &str) -> String {
    format!("order:{buyer_id}:{key}")
}

pub fn webhook_key(request_id: &str) -> String {
    format!("webhook:{request_id}")
}

#[derive(Clone)]
pub struct IdempotencyGuard {
    store: LedgerStore,
}

impl IdempotencyGuard {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    /// Atomically claim `key`
    pub fn begin(&self, key: &str, now: i64) -> ServiceResult<Begin> {
        self.store.transact(|txn| {
            let existing = txn.get::<IdempotencyRecord>(key)?;
            let created_at = match &existing {
                Some(record) => match record.status {
                    IdempotencyStatus::Completed => {
                        return Ok(Begin::Completed(record.result.clone()));
                    }
                    IdempotencyStatus::Processing
                        if now - record.updated_at < PROCESSING_LEASE_MS =>
                    {
                        return Err(AppError::duplicate_processing()
                            .with_detail("key", key.to_string())
                            .into());
                    }
                    IdempotencyStatus::Processing => {
                        tracing::warn!(key, "Reclaiming abandoned idempotency key");
                        record.created_at
                    }
                    IdempotencyStatus::Failed => record.created_at,
                },
                None => now,
            };

            txn.put(&IdempotencyRecord {
                key: key.to_string(),
                status: IdempotencyStatus::Processing,
                result: None,
                error: None,
                created_at,
                updated_at: now,
            })?;
            Ok(Begin::Started)
        })
    }

    pub fn complete(&self, key: &str, result: Option<&str>, now: i64) -> StorageResult<()> {
        self.finish(key, IdempotencyStatus::Completed, result, None, now)
    }

    pub fn fail(&self, key: &str, reason: &str, now: i64) -> StorageResult<()> {
        self.finish(key, IdempotencyStatus::Failed, None, Some(reason), now)
    }

    /// Forget the key entirely, as if it was never claimed
    pub fn release(&self, key: &str) -> StorageResult<()> {
        self.store
            .transact(|txn| txn.delete::<IdempotencyRecord>(key).map(|_| ()))
    }

    pub fn get(&self, key: &str) -> StorageResult<Option<IdempotencyRecord>> {
        self.store.get(key)
    }

    fn finish(
        &self,
        key: &str,
        status: IdempotencyStatus,
        result: Option<&str>,
        error: Option<&str>,
        now: i64,
    ) -> StorageResult<()> {
        self.store.transact(|txn| {
            let created_at = txn
                .get::<IdempotencyRecord>(key)?
                .map(|r| r.created_at)
                .unwrap_or(now);
            txn.put(&IdempotencyRecord {
                key: key.to_string(),
                status,
                result: result.map(str::to_string),
                error: error.map(str::to_string),
                created_at,
                updated_at: now,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::error::ErrorCode;

    fn guard() -> IdempotencyGuard {
        IdempotencyGuard::new(LedgerStore::open_in_memory().unwrap())
    }

    fn code(result: ServiceResult<Begin>) -> ErrorCode {
        match result {
            Err(e) => e.code(),
            Ok(b) => panic!("expected error, got {b:?}"),
        }
    }

    #[test]
    fn test_second_begin_while_processing_is_rejected() {
        let g = guard();
        assert_eq!(g.begin("k", 1000).unwrap(), Begin::Started);
        assert_eq!(code(g.begin("k", 1001)), ErrorCode::DuplicateProcessing);
    }

    #[test]
    fn test_completed_returns_prior_result() {
        let g = guard();
        g.begin("k", 1000).unwrap();
        g.complete("k", Some("order-1"), 1002).unwrap();

        assert_eq!(
            g.begin("k", 2000).unwrap(),
            Begin::Completed(Some("order-1".to_string()))
        );
        let record = g.get("k").unwrap().unwrap();
        assert_eq!(record.created_at, 1000);
        assert_eq!(record.status, IdempotencyStatus::Completed);
    }

    #[test]
    fn test_failed_key_can_be_retried() {
        let g = guard();
        g.begin("k", 1000).unwrap();
        g.fail("k", "gateway timeout", 1001).unwrap();
        assert_eq!(g.begin("k", 1002).unwrap(), Begin::Started);
    }

    #[test]
    fn test_release_forgets_key() {
        let g = guard();
        g.begin("k", 1000).unwrap();
        g.release("k").unwrap();
        assert!(g.get("k").unwrap().is_none());
        assert_eq!(g.begin("k", 1001).unwrap(), Begin::Started);
    }

    #[test]
    fn test_abandoned_processing_is_reclaimed() {
        let g = guard();
        g.begin("k", 0).unwrap();
        assert_eq!(g.begin("k", PROCESSING_LEASE_MS).unwrap(), Begin::Started);
    }

    #[test]
    fn test_scoped_keys_do_not_collide() {
        assert_ne!(order_key("b1", "abc"), webhook_key("abc"));
        assert_ne!(order_key("b1", "abc"), order_key("b2", "abc"));
    }
}
