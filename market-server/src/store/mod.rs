//! redb-backed ledger store
//!
//! # Tables
//!
//! | Table | Key | Value |
//! |-------|-----|-------|
//! | `orders` | order id | `Order` |
//! | `products` | product id | `Product` (stock lives here) |
//! | `wallets` | tenant id | `Wallet` |
//! | `transactions` | transaction id | `Transaction` |
//! | `withdrawals` | withdrawal id | `Withdrawal` |
//! | `idempotency` | scoped key | `IdempotencyRecord` |
//! | `webhook_deliveries` | delivery request id | `WebhookDelivery` |
//! | `seller_accounts` | tenant id | `SellerAccount` |
//! | `seller_credentials` | tenant id | `SellerCredential` |
//! | `advisory_locks` | lock key | `AdvisoryLock` |
//! | `carts` | buyer id | `Cart` |
//! | `delivery_codes` | code id | `DeliveryCode` |
//! | `notifications` | notification id | `Notification` |
//! | `audit_log` | entry id | `AuditEntry` |
//! | `payment_index` | gateway payment id | `PaymentIndex` |
//!
//! # Transactions
//!
//! redb admits a single writer at a time, so every read-modify-write done
//! through [`LedgerStore::transact`] is serialized against all other writers.
//! Transaction bodies must only read and write through the [`Txn`] they are
//! given: a body may run more than once when a commit fails.

mod document;

pub use document::{Document, PaymentIndex};

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Commit attempts before a transient storage failure is surfaced
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Ledger store backed by redb
#[derive(Clone)]
pub struct LedgerStore {
    db: Arc<Database>,
}

impl LedgerStore {
    /// Open or create the database at the given path
    ///
    /// redb commits with `Durability::Immediate` by default: a commit is
    /// persistent as soon as `commit()` returns.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (tests and local tooling)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        // Create all tables so read transactions never see a missing table
        let write_txn = db.begin_write()?;
        for table in document::ALL_TABLES {
            let _ = write_txn.open_table(table)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Run `body` inside a write transaction.
    ///
    /// Commits iff `body` returns `Ok`. On `Err` the transaction is aborted
    /// and nothing it wrote is visible. A failed commit re-runs `body` on a
    /// fresh transaction, up to [`MAX_COMMIT_ATTEMPTS`] times.
    pub fn transact<T, E, F>(&self, body: F) -> Result<T, E>
    where
        F: Fn(&Txn<'_>) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let write_txn = self.db.begin_write().map_err(StorageError::from)?;

            let result = body(&Txn { inner: &write_txn });
            let value = match result {
                Ok(value) => value,
                Err(e) => {
                    if let Err(abort_err) = write_txn.abort() {
                        tracing::warn!(error = %abort_err, "Failed to abort transaction");
                    }
                    return Err(e);
                }
            };

            match write_txn.commit() {
                Ok(()) => return Ok(value),
                Err(e) if attempt < MAX_COMMIT_ATTEMPTS => {
                    tracing::warn!(attempt, error = %e, "Commit failed, retrying transaction");
                }
                Err(e) => return Err(StorageError::from(e).into()),
            }
        }
    }

    // ========== Read API ==========

    /// Read one document outside a transaction
    pub fn get<D: Document>(&self, key: &str) -> StorageResult<Option<D>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(D::TABLE)?;
        read_doc(&table, key)
    }

    /// Read every document of a kind that matches `filter`
    pub fn scan<D: Document>(&self, filter: impl FnMut(&D) -> bool) -> StorageResult<Vec<D>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(D::TABLE)?;
        collect_docs(&table, filter)
    }

    /// Write one document in its own transaction
    pub fn put<D: Document>(&self, doc: &D) -> StorageResult<()> {
        self.transact(|txn| txn.put(doc))
    }
}

/// Typed view over a write transaction
pub struct Txn<'a> {
    inner: &'a WriteTransaction,
}

impl Txn<'_> {
    pub fn get<D: Document>(&self, key: &str) -> StorageResult<Option<D>> {
        let table = self.inner.open_table(D::TABLE)?;
        read_doc(&table, key)
    }

    pub fn put<D: Document>(&self, doc: &D) -> StorageResult<()> {
        let bytes = serde_json::to_vec(doc)?;
        let mut table = self.inner.open_table(D::TABLE)?;
        table.insert(doc.key(), bytes.as_slice())?;
        Ok(())
    }

    /// Create `doc` unless its key is taken. Returns whether it was written.
    pub fn insert_new<D: Document>(&self, doc: &D) -> StorageResult<bool> {
        if self.exists::<D>(doc.key())? {
            return Ok(false);
        }
        self.put(doc)?;
        Ok(true)
    }

    pub fn exists<D: Document>(&self, key: &str) -> StorageResult<bool> {
        let table = self.inner.open_table(D::TABLE)?;
        Ok(table.get(key)?.is_some())
    }

    /// Delete by key. Returns whether a document was removed.
    pub fn delete<D: Document>(&self, key: &str) -> StorageResult<bool> {
        let mut table = self.inner.open_table(D::TABLE)?;
        let removed = table.remove(key)?.is_some();
        Ok(removed)
    }

    pub fn scan<D: Document>(&self, filter: impl FnMut(&D) -> bool) -> StorageResult<Vec<D>> {
        let table = self.inner.open_table(D::TABLE)?;
        collect_docs(&table, filter)
    }
}

fn read_doc<D, T>(table: &T, key: &str) -> StorageResult<Option<D>>
where
    D: Document,
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
        None => Ok(None),
    }
}

fn collect_docs<D, T>(table: &T, mut filter: impl FnMut(&D) -> bool) -> StorageResult<Vec<D>>
where
    D: Document,
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut docs = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        let doc: D = serde_json::from_slice(value.value())?;
        if filter(&doc) {
            docs.push(doc);
        }
    }
    Ok(docs)
}
