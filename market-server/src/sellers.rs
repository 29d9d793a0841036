//! Seller gateway connection (OAuth authorization code flow)

use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::models::{NotificationKind, OAUTH_STATE_TTL_MS, OAuthState, SellerAccount, SellerCredential};
use shared::util::random_token;
use std::sync::Arc;

use crate::auth::CallerIdentity;
use crate::error::{ServiceError, ServiceResult};
use crate::gateway::PaymentGateway;
use crate::notify::Notifier;
use crate::store::{LedgerStore, Txn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub gateway_user_id: Option<String>,
    pub connected_at: Option<i64>,
}

impl From<Option<&SellerAccount>> for ConnectionStatus {
    fn from(account: Option<&SellerAccount>) -> Self {
        match account {
            Some(a) => Self {
                is_connected: a.gateway_connected,
                gateway_user_id: a.gateway_user_id.clone(),
                connected_at: a.connected_at,
            },
            None => Self {
                is_connected: false,
                gateway_user_id: None,
                connected_at: None,
            },
        }
    }
}

/// Body of `POST /sellers/gateway`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ConnectAction {
    Url,
    Callback { code: String, state: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConnectResponse {
    Url { url: String },
    Connected(ConnectionStatus),
}

#[derive(Clone)]
pub struct SellerService {
    store: LedgerStore,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Notifier,
}

impl SellerService {
    pub fn new(store: LedgerStore, gateway: Arc<dyn PaymentGateway>, notifier: Notifier) -> Self {
        Self {
            store,
            gateway,
            notifier,
        }
    }

    pub fn status(&self, tenant_id: &str) -> ServiceResult<ConnectionStatus> {
        let account = self.store.get::<SellerAccount>(tenant_id)?;
        Ok(ConnectionStatus::from(account.as_ref()))
    }

    pub async fn handle(
        &self,
        caller: &CallerIdentity,
        action: ConnectAction,
        now: i64,
    ) -> ServiceResult<ConnectResponse> {
        match action {
            ConnectAction::Url => Ok(ConnectResponse::Url {
                url: self.authorization_url(caller, now)?,
            }),
            ConnectAction::Callback { code, state } => Ok(ConnectResponse::Connected(
                self.complete_authorization(caller, &code, &state, now).await?,
            )),
        }
    }

    /// Authorization URL with a fresh CSRF state stored on the account.
    /// Creates the seller account on first use.
    pub fn authorization_url(&self, caller: &CallerIdentity, now: i64) -> ServiceResult<String> {
        let tenant_id = caller.seller_tenant()?;
        let state = format!("{tenant_id}_{now}_{}", random_token(12));
        let url = self.gateway.authorization_url(&state).map_err(|e| {
            tracing::error!(error = %e, "OAuth app not configured");
            AppError::new(ErrorCode::GatewayConfigMissing)
        })?;

        self.store.transact(|txn| {
            let mut account = account_or_new(txn, caller, tenant_id, now)?;
            account.oauth_state = Some(OAuthState {
                value: state.clone(),
                expires_at: now + OAUTH_STATE_TTL_MS,
            });
            account.updated_at = now;
            txn.put(&account)?;
            Ok::<_, ServiceError>(())
        })?;
        Ok(url)
    }

    /// Validate and consume the state, then exchange the code. The stored
    /// state is removed whether or not it matches.
    pub async fn complete_authorization(
        &self,
        caller: &CallerIdentity,
        code: &str,
        state: &str,
        now: i64,
    ) -> ServiceResult<ConnectionStatus> {
        let tenant_id = caller.seller_tenant()?;
        if code.trim().is_empty() {
            return Err(AppError::validation("code is required").into());
        }

        let stored = self.store.transact(|txn| {
            let Some(mut account) = txn.get::<SellerAccount>(tenant_id)? else {
                return Ok(None);
            };
            let stored = account.oauth_state.take();
            if stored.is_some() {
                account.updated_at = now;
                txn.put(&account)?;
            }
            Ok::<_, ServiceError>(stored)
        })?;
        match stored {
            Some(s) if s.value != state => {
                tracing::warn!(tenant_id, "OAuth state mismatch");
                return Err(AppError::new(ErrorCode::OAuthStateInvalid).into());
            }
            Some(s) if s.expires_at < now => {
                return Err(AppError::new(ErrorCode::OAuthStateExpired).into());
            }
            Some(_) => {}
            None => return Err(AppError::new(ErrorCode::OAuthStateInvalid).into()),
        }

        let grant = self.gateway.exchange_code(code.trim()).await?;
        let credential = SellerCredential {
            tenant_id: tenant_id.to_string(),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            gateway_user_id: grant.user_id.clone(),
            public_key: grant.public_key,
            expires_at: now + grant.expires_in * 1000,
            updated_at: now,
        };
        let account = self.store.transact(|txn| {
            let mut account = account_or_new(txn, caller, tenant_id, now)?;
            account.gateway_connected = true;
            account.gateway_user_id = Some(grant.user_id.clone());
            account.connected_at = Some(now);
            account.updated_at = now;
            txn.put(&credential)?;
            txn.put(&account)?;
            Ok::<_, ServiceError>(account)
        })?;

        tracing::info!(tenant_id, gateway_user_id = %grant.user_id, "Seller gateway connected");
        Ok(ConnectionStatus::from(Some(&account)))
    }

    pub fn disconnect(&self, tenant_id: &str, now: i64) -> ServiceResult<ConnectionStatus> {
        let account = self.store.transact(|txn| disconnect_in(txn, tenant_id, now))?;
        tracing::info!(tenant_id, "Seller gateway disconnected");
        Ok(ConnectionStatus::from(account.as_ref()))
    }

    /// Gateway-side deauthorization: disconnect every tenant linked to the
    /// gateway user and tell them. Returns the affected tenants.
    pub fn deauthorized(&self, gateway_user_id: &str, now: i64) -> ServiceResult<Vec<String>> {
        let tenants = self.store.transact(|txn| {
            let linked = txn.scan::<SellerAccount>(|a| {
                a.gateway_user_id.as_deref() == Some(gateway_user_id)
            })?;
            let mut tenants = Vec::with_capacity(linked.len());
            for account in linked {
                disconnect_in(txn, &account.tenant_id, now)?;
                tenants.push(account.tenant_id);
            }
            Ok::<_, ServiceError>(tenants)
        })?;

        for tenant_id in &tenants {
            tracing::warn!(tenant_id = %tenant_id, gateway_user_id, "Seller deauthorized at gateway");
            self.notifier.seller_tenant(
                tenant_id,
                NotificationKind::GatewayDisconnected,
                "Conta de pagamento desconectada",
                "Sua conta do Mercado Pago foi desconectada. Reconecte para continuar vendendo."
                    .to_string(),
            );
        }
        Ok(tenants)
    }
}

fn account_or_new(
    txn: &Txn<'_>,
    caller: &CallerIdentity,
    tenant_id: &str,
    now: i64,
) -> ServiceResult<SellerAccount> {
    Ok(txn.get::<SellerAccount>(tenant_id)?.unwrap_or_else(|| SellerAccount {
        tenant_id: tenant_id.to_string(),
        owner_user_id: caller.user_id.clone(),
        name: caller.name.clone().unwrap_or_else(|| tenant_id.to_string()),
        gateway_connected: false,
        gateway_user_id: None,
        connected_at: None,
        oauth_state: None,
        updated_at: now,
    }))
}

fn disconnect_in(txn: &Txn<'_>, tenant_id: &str, now: i64) -> ServiceResult<Option<SellerAccount>> {
    txn.delete::<SellerCredential>(tenant_id)?;
    let Some(mut account) = txn.get::<SellerAccount>(tenant_id)? else {
        return Ok(None);
    };
    account.gateway_connected = false;
    account.gateway_user_id = None;
    account.connected_at = None;
    account.updated_at = now;
    txn.put(&account)?;
    Ok(Some(account))
}
