//! Seller gateway credentials
//!
//! [`CredentialResolver`] hands out a usable access token for a seller,
//! refreshing it when it is about to expire. Refresh tokens are single use at
//! the gateway, so only one refresh per seller may run at a time: the refresher
//! holds an advisory lock document, and anyone else polls until the new
//! credential shows up.

use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::models::SellerCredential;
use shared::util::now_millis;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ServiceResult;
use crate::gateway::PaymentGateway;
use crate::store::{LedgerStore, StorageResult};

/// Refresh once the token has less than this left
pub const REFRESH_MARGIN_MS: i64 = 5 * 60 * 1000;
/// Lease of the refresh lock; a crashed holder blocks refreshes this long at most
pub const LOCK_LEASE_MS: i64 = 30 * 1000;
const POLL_STEP: Duration = Duration::from_millis(100);
const POLL_LIMIT: Duration = Duration::from_secs(3);

/// Short-lived lock document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryLock {
    pub key: String,
    pub holder: String,
    pub expires_at: i64,
}

fn refresh_lock_key(tenant_id: &str) -> String {
    format!("refresh:{tenant_id}")
}

/// Take the lock unless someone else holds an unexpired lease
pub fn try_lock(store: &LedgerStore, key: &str, holder: &str, now: i64) -> StorageResult<bool> {
    store.transact(|txn| match txn.get::<AdvisoryLock>(key)? {
        Some(lock) if lock.expires_at > now && lock.holder != holder => Ok(false),
        _ => {
            txn.put(&AdvisoryLock {
                key: key.to_string(),
                holder: holder.to_string(),
                expires_at: now + LOCK_LEASE_MS,
            })?;
            Ok(true)
        }
    })
}

/// Release the lock if `holder` still owns it
pub fn unlock(store: &LedgerStore, key: &str, holder: &str) -> StorageResult<()> {
    store.transact(|txn| {
        if let Some(lock) = txn.get::<AdvisoryLock>(key)?
            && lock.holder == holder
        {
            txn.delete::<AdvisoryLock>(key)?;
        }
        Ok(())
    })
}

#[derive(Clone)]
pub struct CredentialResolver {
    store: LedgerStore,
    gateway: Arc<dyn PaymentGateway>,
    platform_token: String,
}

impl CredentialResolver {
    pub fn new(store: LedgerStore, gateway: Arc<dyn PaymentGateway>, platform_token: String) -> Self {
        Self {
            store,
            gateway,
            platform_token,
        }
    }

    pub fn platform_token(&self) -> &str {
        &self.platform_token
    }

    /// Usable access token for the seller, or `SELLER_NOT_CONNECTED`
    pub async fn seller_token(&self, tenant_id: &str) -> ServiceResult<String> {
        let now = now_millis();
        let credential = self.load(tenant_id)?;
        if credential.is_fresh(now, REFRESH_MARGIN_MS) {
            return Ok(credential.access_token);
        }

        let lock_key = refresh_lock_key(tenant_id);
        let holder = uuid::Uuid::new_v4().to_string();
        if try_lock(&self.store, &lock_key, &holder, now)? {
            // Another holder may have finished between our read and the lock
            let result = match self.load(tenant_id) {
                Ok(current) if current.is_fresh(now_millis(), REFRESH_MARGIN_MS) => Ok(current.access_token),
                Ok(current) => self.refresh(current).await,
                Err(e) => Err(e),
            };
            if let Err(e) = unlock(&self.store, &lock_key, &holder) {
                tracing::warn!(tenant_id, error = %e, "Failed to release refresh lock");
            }
            return result;
        }

        tracing::debug!(tenant_id, "Token refresh in progress elsewhere, waiting");
        let deadline = tokio::time::Instant::now() + POLL_LIMIT;
        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(POLL_STEP).await;
            let current = self.load(tenant_id)?;
            if current.is_fresh(now_millis(), REFRESH_MARGIN_MS) {
                return Ok(current.access_token);
            }
        }

        let current = self.load(tenant_id)?;
        if current.expires_at > now_millis() {
            tracing::warn!(tenant_id, "Refresh still pending, using token close to expiry");
            return Ok(current.access_token);
        }
        Err(AppError::new(ErrorCode::SystemBusy).into())
    }

    /// Seller token when available, else the platform token
    pub async fn seller_or_platform_token(&self, tenant_id: &str) -> String {
        match self.seller_token(tenant_id).await {
            Ok(token) => token,
            Err(e) => {
                tracing::debug!(tenant_id, error = %e, "Falling back to platform token");
                self.platform_token.clone()
            }
        }
    }

    fn load(&self, tenant_id: &str) -> ServiceResult<SellerCredential> {
        self.store
            .get::<SellerCredential>(tenant_id)?
            .ok_or_else(|| AppError::seller_not_connected().into())
    }

    async fn refresh(&self, credential: SellerCredential) -> ServiceResult<String> {
        let grant = match self.gateway.refresh_token(&credential.refresh_token).await {
            Ok(grant) => grant,
            Err(e) => {
                tracing::warn!(tenant_id = %credential.tenant_id, error = %e, "Token refresh failed");
                return Err(AppError::seller_not_connected().into());
            }
        };

        let now = now_millis();
        let refreshed = SellerCredential {
            tenant_id: credential.tenant_id.clone(),
            access_token: grant.access_token,
            refresh_token: if grant.refresh_token.is_empty() {
                credential.refresh_token
            } else {
                grant.refresh_token
            },
            gateway_user_id: credential.gateway_user_id,
            public_key: grant.public_key.or(credential.public_key),
            expires_at: now + grant.expires_in * 1000,
            updated_at: now,
        };
        self.store.put(&refreshed)?;
        tracing::info!(tenant_id = %refreshed.tenant_id, "Seller token refreshed");
        Ok(refreshed.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_excludes_other_holders_until_expiry() {
        let store = LedgerStore::open_in_memory().unwrap();
        assert!(try_lock(&store, "refresh:t1", "a", 1000).unwrap());
        assert!(!try_lock(&store, "refresh:t1", "b", 1001).unwrap());
        assert!(try_lock(&store, "refresh:t1", "a", 1002).unwrap());
        assert!(try_lock(&store, "refresh:t1", "b", 1002 + LOCK_LEASE_MS).unwrap());
    }

    #[test]
    fn test_unlock_only_by_holder() {
        let store = LedgerStore::open_in_memory().unwrap();
        assert!(try_lock(&store, "k", "a", 0).unwrap());
        unlock(&store, "k", "b").unwrap();
        assert!(!try_lock(&store, "k", "b", 1).unwrap());
        unlock(&store, "k", "a").unwrap();
        assert!(try_lock(&store, "k", "b", 2).unwrap());
    }
}
