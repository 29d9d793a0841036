//! Seller wallet endpoints

use axum::extract::{Query, State};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use shared::util::now_millis;
use shared::wallet::{Wallet, Withdrawal};

use crate::auth::CallerIdentity;
use crate::state::AppState;
use crate::wallet::{BankAccountRequest, TransactionPage, TransactionQuery, WithdrawRequest};

use super::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/seller/wallet", get(get_wallet))
        .route("/api/seller/wallet/transactions", get(list_transactions))
        .route("/api/seller/wallet/bank-account", put(update_bank_account))
        .route("/api/seller/wallet/withdrawals", get(list_withdrawals).post(withdraw))
}

#[derive(Debug, Default, Deserialize)]
pub struct WithdrawalQuery {
    pub status: Option<String>,
}

/// GET /api/seller/wallet
pub async fn get_wallet(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
) -> ApiResult<Wallet> {
    let tenant_id = identity.seller_tenant()?;
    Ok(Json(state.wallet.wallet(tenant_id, now_millis())?))
}

/// GET /api/seller/wallet/transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Query(query): Query<TransactionQuery>,
) -> ApiResult<TransactionPage> {
    let tenant_id = identity.seller_tenant()?;
    Ok(Json(state.wallet.transactions(tenant_id, &query)?))
}

/// PUT /api/seller/wallet/bank-account
pub async fn update_bank_account(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Json(request): Json<BankAccountRequest>,
) -> ApiResult<Wallet> {
    let tenant_id = identity.seller_tenant()?;
    Ok(Json(state.wallet.update_bank_account(
        tenant_id,
        &request,
        now_millis(),
    )?))
}

/// GET /api/seller/wallet/withdrawals
pub async fn list_withdrawals(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Query(query): Query<WithdrawalQuery>,
) -> ApiResult<Vec<Withdrawal>> {
    let tenant_id = identity.seller_tenant()?;
    Ok(Json(state.wallet.withdrawals(tenant_id, query.status.as_deref())?))
}

/// POST /api/seller/wallet/withdrawals
pub async fn withdraw(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Json(request): Json<WithdrawRequest>,
) -> ApiResult<Withdrawal> {
    let withdrawal = state
        .wallet
        .withdraw(&identity, request, now_millis())
        .await?;
    Ok(Json(withdrawal))
}
