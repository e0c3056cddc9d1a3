//! Storage layer for the credit ledger.
//!
//! This crate provides persistent storage for accounts, credit transactions
//! and purchase intents behind the [`Store`] trait, with three backends:
//!
//! - [`MemoryStore`]: process-local maps, used in tests and local development
//! - [`RocksStore`]: `RocksDB` column families (feature `rocksdb-backend`)
//! - [`PgStore`]: `PostgreSQL` via `sqlx`
//!
//! # Atomic Units
//!
//! Balances are never written directly. Every balance change goes through a
//! compound operation (`create_account`, `add_credits`, `spend_credits`,
//! `confirm_purchase`) that updates the account and appends the matching
//! transaction as one all-or-nothing unit.
//!
//! # Example
//!
//! ```no_run
//! use credit_ledger_store::{MemoryStore, Store};
//! use credit_ledger_core::{Account, AccountId};
//!
//! # async fn run() -> credit_ledger_store::Result<()> {
//! let store = MemoryStore::new();
//!
//! let account_id = AccountId::new("user_123").unwrap();
//! store.create_account(&Account::new(account_id.clone()), None).await?;
//!
//! let account = store.get_account(&account_id).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;

#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::{FaultPoint, MemoryStore};
pub use postgres::PgStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use credit_ledger_core::{
    Account, AccountId, CreditTransaction, PaymentIntentId, PurchaseIntent, TransactionKind,
};

/// Everything the store needs to confirm a purchase in one atomic unit.
#[derive(Debug, Clone)]
pub struct PurchaseConfirmation {
    /// The purchase intent being confirmed.
    pub intent_id: PaymentIntentId,

    /// The account receiving the credits.
    pub account_id: AccountId,

    /// The `purchased` transaction to append; its amount is the credit grant.
    pub transaction: CreditTransaction,

    /// Live provider status to record on the intent.
    pub status: String,

    /// Currency for an account row materialised by this confirmation.
    pub currency: String,

    /// Confirmation timestamp.
    pub confirmed_at: DateTime<Utc>,
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (`RocksDB`, `PostgreSQL`, in-memory for testing).
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Insert a new account, optionally with an opening `earned` grant.
    ///
    /// The account and the grant are written together; the stored balance is
    /// the account's balance plus the grant. Returns the stored account.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the account exists.
    async fn create_account(
        &self,
        account: &Account,
        opening_grant: Option<&CreditTransaction>,
    ) -> Result<Account>;

    /// Get an account by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>>;

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    /// List transactions for an account, ordered by time (newest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_transactions(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>>;

    /// Count all transactions for an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn count_transactions(&self, account_id: &AccountId) -> Result<u64>;

    /// Sum the amounts of an account's transactions of one kind.
    ///
    /// Returns 0 when there are none.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn sum_transactions(&self, account_id: &AccountId, kind: TransactionKind)
        -> Result<i64>;

    // =========================================================================
    // Purchase Intent Operations
    // =========================================================================

    /// Insert a new purchase intent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if an intent with the same ID exists.
    async fn put_purchase_intent(&self, intent: &PurchaseIntent) -> Result<()>;

    /// Get a purchase intent by provider intent ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_purchase_intent(
        &self,
        intent_id: &PaymentIntentId,
    ) -> Result<Option<PurchaseIntent>>;

    /// List an account's purchase intents, newest first.
    ///
    /// With `confirmed_only`, intents whose credits were not granted yet are
    /// left out.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_purchase_intents(
        &self,
        account_id: &AccountId,
        confirmed_only: bool,
    ) -> Result<Vec<PurchaseIntent>>;

    /// Record the latest provider status on a purchase intent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the intent doesn't exist.
    async fn sync_purchase_status(&self, intent_id: &PaymentIntentId, status: &str) -> Result<()>;

    // =========================================================================
    // Compound Operations
    // =========================================================================

    /// Add credits to an account and record the transaction atomically.
    ///
    /// Returns the new balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InvalidTransaction` if the transaction is a debit.
    async fn add_credits(&self, transaction: &CreditTransaction) -> Result<i64>;

    /// Deduct credits from an account and record the transaction atomically.
    ///
    /// The sufficiency check and the debit are one unit, so the balance can
    /// never go negative. Returns the new balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientCredits` if the balance is too low.
    /// - `StoreError::InvalidTransaction` if the transaction is not a debit.
    async fn spend_credits(&self, transaction: &CreditTransaction) -> Result<i64>;

    /// Grant a purchase's credits and latch the intent confirmed, atomically.
    ///
    /// Sets `confirmed`/`confirmed_at` only if the intent was unconfirmed,
    /// increments the balance (creating the account row if it is missing) and
    /// appends the `purchased` transaction. Returns the new balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the intent doesn't exist for this account.
    /// - `StoreError::AlreadyConfirmed` if the latch was already set; nothing
    ///   is written in that case.
    async fn confirm_purchase(&self, confirmation: &PurchaseConfirmation) -> Result<i64>;
}

/// `balance + delta`, or `StoreError::Overflow` if it leaves the `i64` range.
pub(crate) fn checked_balance(account_id: &AccountId, balance: i64, delta: i64) -> Result<i64> {
    balance
        .checked_add(delta)
        .ok_or_else(|| StoreError::overflow(account_id))
}

/// Order purchase intents by creation time, newest first.
pub(crate) fn sort_newest_first(intents: &mut [PurchaseIntent]) {
    intents.sort_by(|a, b| (&b.created_at, &b.id).cmp(&(&a.created_at, &a.id)));
}

pub(crate) fn ensure_kind(transaction: &CreditTransaction, debit: bool) -> Result<()> {
    if transaction.kind.is_debit() != debit {
        return Err(StoreError::InvalidTransaction(format!(
            "{} transaction {} cannot be applied here",
            transaction.kind, transaction.id
        )));
    }
    if transaction.amount <= 0 {
        return Err(StoreError::InvalidTransaction(format!(
            "transaction {} has non-positive amount {}",
            transaction.id, transaction.amount
        )));
    }
    Ok(())
}
