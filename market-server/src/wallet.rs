//! Seller wallet: balance, ledger entries, bank account and withdrawals
//!
//! A withdrawal moves `available -> blocked` before the bank transfer is
//! attempted. A successful transfer removes the blocked amount from the
//! wallet; a failed one returns it to `available`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::models::NotificationKind;
use shared::money::{self, MIN_WITHDRAWAL};
use shared::wallet::{
    AccountType, BankAccount, Transaction, TransactionStatus, TransactionType, Wallet,
    WalletStatus, Withdrawal, WithdrawalStatus,
};
use std::sync::Arc;
use validator::Validate;

use crate::audit::{self, AuditAction, AuditEntry};
use crate::auth::CallerIdentity;
use crate::credentials::CredentialResolver;
use crate::error::{ServiceError, ServiceResult, validate};
use crate::gateway::{BankTransfer, PaymentGateway, TransferAccount};
use crate::notify::Notifier;
use crate::orders::query::page_window;
use crate::store::{LedgerStore, Txn};

/// Withdrawals listed per request
pub const WITHDRAWAL_LIST_LIMIT: usize = 50;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BankAccountRequest {
    #[validate(length(min = 1, max = 10))]
    pub bank_code: String,
    #[validate(length(min = 1, max = 100))]
    pub bank_name: String,
    #[validate(length(min = 1, max = 10))]
    pub branch: String,
    #[validate(length(min = 1, max = 20))]
    pub account_number: String,
    #[validate(length(min = 1, max = 2))]
    pub account_digit: String,
    #[serde(default)]
    pub account_type: Option<AccountType>,
    #[validate(length(min = 1, max = 120))]
    pub holder_name: String,
    #[validate(length(min = 1, max = 20))]
    pub holder_document: String,
}

impl BankAccountRequest {
    /// Trimmed account with a digits-only holder document
    fn normalize(&self) -> Result<BankAccount, AppError> {
        let field = |name: &str, value: &str| -> Result<String, AppError> {
            let value = value.trim();
            if value.is_empty() {
                return Err(AppError::validation(format!("{name} is required")));
            }
            Ok(value.to_string())
        };
        let holder_document: String = self
            .holder_document
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        if holder_document.is_empty() {
            return Err(AppError::validation("holder_document is required"));
        }
        Ok(BankAccount {
            bank_code: field("bank_code", &self.bank_code)?,
            bank_name: field("bank_name", &self.bank_name)?,
            branch: field("branch", &self.branch)?,
            account_number: field("account_number", &self.account_number)?,
            account_digit: field("account_digit", &self.account_digit)?,
            account_type: self.account_type.unwrap_or_default(),
            holder_name: field("holder_name", &self.holder_name)?,
            holder_document,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawRequest {
    pub amount: Decimal,
}

#[derive(Clone)]
pub struct WalletService {
    store: LedgerStore,
    gateway: Arc<dyn PaymentGateway>,
    credentials: CredentialResolver,
    notifier: Notifier,
}

impl WalletService {
    pub fn new(
        store: LedgerStore,
        gateway: Arc<dyn PaymentGateway>,
        credentials: CredentialResolver,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            gateway,
            credentials,
            notifier,
        }
    }

    /// Wallet of the tenant; an empty active wallet if none exists yet
    pub fn wallet(&self, tenant_id: &str, now: i64) -> ServiceResult<Wallet> {
        Ok(self
            .store
            .get::<Wallet>(tenant_id)?
            .unwrap_or_else(|| Wallet::empty(tenant_id, now)))
    }

    /// Ledger entries, newest first
    pub fn transactions(&self, tenant_id: &str, query: &TransactionQuery) -> ServiceResult<TransactionPage> {
        let kind = match query.kind.as_deref().filter(|k| !k.is_empty()) {
            Some(raw) => Some(
                TransactionType::parse(raw)
                    .ok_or_else(|| AppError::validation(format!("Unknown transaction type: {raw}")))?,
            ),
            None => None,
        };
        let mut items = self
            .store
            .scan::<Transaction>(|t| t.tenant_id == tenant_id && kind.is_none_or(|k| t.kind == k))?;
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let (offset, limit) = page_window(query.page, query.limit);
        let total = items.len();
        Ok(TransactionPage {
            transactions: items.into_iter().skip(offset).take(limit).collect(),
            page: offset / limit + 1,
            limit,
            total,
        })
    }

    pub fn update_bank_account(
        &self,
        tenant_id: &str,
        request: &BankAccountRequest,
        now: i64,
    ) -> ServiceResult<Wallet> {
        validate(request)?;
        let account = request.normalize()?;
        let wallet = self.store.transact(|txn| {
            let mut wallet = txn
                .get::<Wallet>(tenant_id)?
                .unwrap_or_else(|| Wallet::empty(tenant_id, now));
            wallet.bank_account = Some(account.clone());
            wallet.updated_at = now;
            txn.put(&wallet)?;
            Ok::<_, ServiceError>(wallet)
        })?;
        tracing::info!(tenant_id, bank_code = %account.bank_code, "Bank account updated");
        Ok(wallet)
    }

    /// Latest withdrawals, optionally filtered by status
    pub fn withdrawals(&self, tenant_id: &str, status: Option<&str>) -> ServiceResult<Vec<Withdrawal>> {
        let status = match status.filter(|s| !s.is_empty()) {
            Some(raw) => Some(
                WithdrawalStatus::parse(raw)
                    .ok_or_else(|| AppError::validation(format!("Unknown withdrawal status: {raw}")))?,
            ),
            None => None,
        };
        let mut items = self
            .store
            .scan::<Withdrawal>(|w| w.tenant_id == tenant_id && status.is_none_or(|s| w.status == s))?;
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(WITHDRAWAL_LIST_LIMIT);
        Ok(items)
    }

    /// Pay out `amount` from the available balance to the seller's bank account
    pub async fn withdraw(
        &self,
        caller: &CallerIdentity,
        request: WithdrawRequest,
        now: i64,
    ) -> ServiceResult<Withdrawal> {
        let tenant_id = caller.seller_tenant()?.to_string();
        let amount = money::round2(request.amount);
        if amount <= Decimal::ZERO {
            return Err(AppError::validation("Amount must be positive").into());
        }
        if amount < MIN_WITHDRAWAL {
            return Err(AppError::new(ErrorCode::WithdrawalBelowMinimum)
                .with_detail("minimum", MIN_WITHDRAWAL.to_string())
                .into());
        }

        let withdrawal_id = uuid::Uuid::new_v4().to_string();
        let transaction_id = uuid::Uuid::new_v4().to_string();
        let withdrawal = self.store.transact(|txn| {
            reserve_withdrawal(txn, caller, &tenant_id, amount, &withdrawal_id, &transaction_id, now)
        })?;
        tracing::info!(tenant_id = %tenant_id, withdrawal_id = %withdrawal.id, %amount, "Withdrawal reserved");

        let account = &withdrawal.bank_account;
        let transfer = BankTransfer {
            amount,
            external_reference: withdrawal.id.clone(),
            bank_account: TransferAccount {
                bank_id: account.bank_code.clone(),
                kind: match account.account_type {
                    AccountType::Checking => "checking".into(),
                    AccountType::Savings => "savings".into(),
                },
                number: account.full_account_number(),
                holder_name: account.holder_name.clone(),
                holder_document: account.holder_document.clone(),
            },
        };
        let token = self.credentials.seller_or_platform_token(&tenant_id).await;
        let result = self
            .gateway
            .create_bank_transfer(&token, &transfer, &format!("withdrawal-{}", withdrawal.id))
            .await;

        let finished = match &result {
            Ok(receipt) => self.store.transact(|txn| {
                finish_withdrawal(txn, &withdrawal, Ok(&receipt.id), caller, now)
            }),
            Err(e) => {
                tracing::warn!(withdrawal_id = %withdrawal.id, error = %e, "Bank transfer failed");
                self.store.transact(|txn| {
                    finish_withdrawal(txn, &withdrawal, Err("transfer_failed"), caller, now)
                })
            }
        };
        let finished = match finished {
            Ok(w) => w,
            Err(e) => {
                tracing::error!(
                    withdrawal_id = %withdrawal.id,
                    transfer_ok = result.is_ok(),
                    error = %e,
                    "Withdrawal outcome not recorded, funds stay blocked"
                );
                return Err(e);
            }
        };

        match result {
            Ok(_) => {
                self.notifier.seller_tenant(
                    &tenant_id,
                    NotificationKind::Withdrawal,
                    "Saque realizado",
                    format!("Transferência de R$ {amount} enviada para sua conta."),
                );
                Ok(finished)
            }
            Err(_) => {
                self.notifier.seller_tenant(
                    &tenant_id,
                    NotificationKind::Withdrawal,
                    "Saque não realizado",
                    format!("A transferência de R$ {amount} falhou e o valor voltou ao saldo."),
                );
                Err(AppError::new(ErrorCode::TransferFailed)
                    .with_detail("withdrawal_id", finished.id)
                    .into())
            }
        }
    }
}

fn reserve_withdrawal(
    txn: &Txn<'_>,
    caller: &CallerIdentity,
    tenant_id: &str,
    amount: Decimal,
    withdrawal_id: &str,
    transaction_id: &str,
    now: i64,
) -> ServiceResult<Withdrawal> {
    let mut wallet = txn
        .get::<Wallet>(tenant_id)?
        .ok_or_else(|| AppError::new(ErrorCode::WalletNotFound))?;
    if wallet.status != WalletStatus::Active {
        return Err(AppError::new(ErrorCode::WalletBlocked).into());
    }
    let bank_account = wallet
        .bank_account
        .clone()
        .ok_or_else(|| AppError::new(ErrorCode::BankAccountMissing))?;
    if !wallet.balance.block(amount) {
        return Err(AppError::insufficient_balance()
            .with_detail("available", wallet.balance.available.to_string())
            .into());
    }
    wallet.updated_at = now;
    txn.put(&wallet)?;

    let withdrawal = Withdrawal {
        id: withdrawal_id.to_string(),
        tenant_id: tenant_id.to_string(),
        amount,
        status: WithdrawalStatus::Processing,
        bank_account,
        transaction_id: transaction_id.to_string(),
        transfer_id: None,
        failure_reason: None,
        requested_by: caller.user_id.clone(),
        created_at: now,
        updated_at: now,
        completed_at: None,
    };
    txn.put(&withdrawal)?;
    txn.put(&Transaction {
        id: transaction_id.to_string(),
        tenant_id: tenant_id.to_string(),
        kind: TransactionType::Withdrawal,
        amount: -amount,
        fee: Decimal::ZERO,
        net: -amount,
        status: TransactionStatus::Pending,
        description: "Saque para conta bancária".into(),
        order_id: None,
        withdrawal_id: Some(withdrawal_id.to_string()),
        created_at: now,
        updated_at: now,
    })?;
    Ok(withdrawal)
}

/// Settle (`Ok(transfer_id)`) or roll back (`Err(reason)`) a reserved withdrawal
fn finish_withdrawal(
    txn: &Txn<'_>,
    reserved: &Withdrawal,
    outcome: Result<&str, &str>,
    caller: &CallerIdentity,
    now: i64,
) -> ServiceResult<Withdrawal> {
    let mut wallet = txn
        .get::<Wallet>(&reserved.tenant_id)?
        .ok_or_else(|| AppError::new(ErrorCode::WalletNotFound))?;
    let mut withdrawal = txn
        .get::<Withdrawal>(&reserved.id)?
        .unwrap_or_else(|| reserved.clone());
    let mut transaction = txn.get::<Transaction>(&reserved.transaction_id)?;

    let (status, tx_status, action) = match outcome {
        Ok(transfer_id) => {
            wallet.balance.settle_blocked(reserved.amount);
            withdrawal.transfer_id = Some(transfer_id.to_string());
            withdrawal.completed_at = Some(now);
            (
                WithdrawalStatus::Completed,
                TransactionStatus::Completed,
                AuditAction::WithdrawalCompleted,
            )
        }
        Err(reason) => {
            wallet.balance.unblock(reserved.amount);
            withdrawal.failure_reason = Some(reason.to_string());
            (
                WithdrawalStatus::Failed,
                TransactionStatus::Failed,
                AuditAction::WithdrawalFailed,
            )
        }
    };
    wallet.updated_at = now;
    withdrawal.status = status;
    withdrawal.updated_at = now;
    if let Some(tx) = transaction.as_mut() {
        tx.status = tx_status;
        tx.updated_at = now;
        txn.put(tx)?;
    }
    txn.put(&wallet)?;
    txn.put(&withdrawal)?;
    audit::log(
        txn,
        &AuditEntry::new(&reserved.tenant_id, action, now)
            .actor(&caller.user_id)
            .detail(serde_json::json!({
                "withdrawal_id": withdrawal.id,
                "amount": reserved.amount,
                "transfer_id": withdrawal.transfer_id,
            })),
    )?;
    Ok(withdrawal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BankAccountRequest {
        BankAccountRequest {
            bank_code: "260".into(),
            bank_name: "Nu Pagamentos".into(),
            branch: "0001".into(),
            account_number: "1234567".into(),
            account_digit: "8".into(),
            account_type: None,
            holder_name: " Maria Souza ".into(),
            holder_document: "123.456.789-09".into(),
        }
    }

    #[test]
    fn test_bank_account_normalized() {
        let account = request().normalize().unwrap();
        assert_eq!(account.holder_document, "12345678909");
        assert_eq!(account.holder_name, "Maria Souza");
        assert_eq!(account.account_type, AccountType::Checking);
        assert_eq!(account.full_account_number(), "000112345678");
    }

    #[test]
    fn test_blank_fields_rejected() {
        let mut req = request();
        req.branch = "   ".into();
        assert_eq!(req.normalize().unwrap_err().code, ErrorCode::ValidationFailed);

        let mut req = request();
        req.holder_document = "abc".into();
        assert!(req.normalize().is_err());
    }
}
