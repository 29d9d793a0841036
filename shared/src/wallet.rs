//! Seller wallet, ledger transactions and withdrawals

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Three-bucket balance. `total == available + pending + blocked` and every
/// bucket is non-negative after each mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Balance {
    pub available: Decimal,
    pub pending: Decimal,
    pub blocked: Decimal,
    pub total: Decimal,
}

/// Which bucket currently holds a seller amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Pending,
    Available,
}

impl Balance {
    pub fn is_consistent(&self) -> bool {
        self.available >= Decimal::ZERO
            && self.pending >= Decimal::ZERO
            && self.blocked >= Decimal::ZERO
            && self.total == self.available + self.pending + self.blocked
    }

    /// Escrow a newly approved payment
    pub fn credit_pending(&mut self, amount: Decimal) {
        self.pending += amount;
        self.total += amount;
    }

    /// Move an escrowed amount to the withdrawable bucket.
    /// Returns `false` and leaves the balance untouched if pending is short.
    pub fn release(&mut self, amount: Decimal) -> bool {
        if self.pending < amount {
            return false;
        }
        self.pending -= amount;
        self.available += amount;
        true
    }

    /// Reverse a seller amount from `bucket`, clamped at zero.
    /// Returns the amount actually removed.
    pub fn reverse(&mut self, bucket: Bucket, amount: Decimal) -> Decimal {
        let slot = match bucket {
            Bucket::Pending => &mut self.pending,
            Bucket::Available => &mut self.available,
        };
        let removed = amount.min(*slot).max(Decimal::ZERO);
        *slot -= removed;
        self.total -= removed;
        removed
    }

    /// Reserve funds for a withdrawal
    pub fn block(&mut self, amount: Decimal) -> bool {
        if amount <= Decimal::ZERO || self.available < amount {
            return false;
        }
        self.available -= amount;
        self.blocked += amount;
        true
    }

    /// Transfer succeeded: the blocked funds leave the wallet
    pub fn settle_blocked(&mut self, amount: Decimal) {
        let settled = amount.min(self.blocked);
        self.blocked -= settled;
        self.total -= settled;
    }

    /// Transfer failed: blocked funds return to available
    pub fn unblock(&mut self, amount: Decimal) {
        let returned = amount.min(self.blocked);
        self.blocked -= returned;
        self.available += returned;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WalletStatus {
    #[default]
    Active,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    #[default]
    Checking,
    Savings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    pub bank_code: String,
    pub bank_name: String,
    pub branch: String,
    pub account_number: String,
    pub account_digit: String,
    #[serde(default)]
    pub account_type: AccountType,
    pub holder_name: String,
    /// Digits only
    pub holder_document: String,
}

impl BankAccount {
    /// Account number as the transfer API expects it
    pub fn full_account_number(&self) -> String {
        format!("{}{}{}", self.branch, self.account_number, self.account_digit)
    }
}

/// Wallet document, one per seller tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub tenant_id: String,
    pub balance: Balance,
    #[serde(default)]
    pub bank_account: Option<BankAccount>,
    pub status: WalletStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Wallet {
    pub fn empty(tenant_id: impl Into<String>, now: i64) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            balance: Balance::default(),
            bank_account: None,
            status: WalletStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Sale,
    Release,
    Withdrawal,
    Refund,
    Chargeback,
}

impl TransactionType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sale" => Some(Self::Sale),
            "release" => Some(Self::Release),
            "withdrawal" => Some(Self::Withdrawal),
            "refund" => Some(Self::Refund),
            "chargeback" => Some(Self::Chargeback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// Append-only ledger entry affecting a wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub tenant_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Signed: withdrawals are negative
    pub amount: Decimal,
    pub fee: Decimal,
    pub net: Decimal,
    pub status: TransactionStatus,
    pub description: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub withdrawal_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Processing,
    Completed,
    Failed,
}

impl WithdrawalStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: String,
    pub tenant_id: String,
    pub amount: Decimal,
    pub status: WithdrawalStatus,
    pub bank_account: BankAccount,
    pub transaction_id: String,
    #[serde(default)]
    pub transfer_id: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub requested_by: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub completed_at: Option<i64>,
}
