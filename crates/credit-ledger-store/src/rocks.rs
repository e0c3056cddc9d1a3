//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.
//! Read-modify-write operations hold a process-wide write lock and commit
//! through a single `WriteBatch`.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use credit_ledger_core::{
    Account, AccountId, CreditTransaction, PaymentIntentId, PurchaseIntent, TransactionId,
    TransactionKind,
};

use crate::error::{entity, Result, StoreError};
use crate::schema::{all_column_families, cf};
use crate::{
    checked_balance, ensure_kind, keys, sort_newest_first, PurchaseConfirmation, Store,
};

fn db_err(err: rocksdb::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path.as_ref(), cf_descriptors)
            .map_err(db_err)?;

        tracing::debug!(path = %path.as_ref().display(), "Opened RocksDB ledger store");

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("write lock poisoned".into()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn read_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        let cf = self.cf(cf::ACCOUNTS)?;
        self.db
            .get_cf(&cf, keys::account_key(account_id))
            .map_err(db_err)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn read_intent(&self, intent_id: &PaymentIntentId) -> Result<Option<PurchaseIntent>> {
        let cf = self.cf(cf::PURCHASE_INTENTS)?;
        self.db
            .get_cf(&cf, keys::purchase_intent_key(intent_id))
            .map_err(db_err)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn read_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<CreditTransaction>> {
        let cf = self.cf(cf::TRANSACTIONS)?;
        self.db
            .get_cf(&cf, keys::transaction_key(transaction_id))
            .map_err(db_err)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Transaction ids for an account, oldest first.
    fn transaction_ids(&self, account_id: &AccountId) -> Result<Vec<TransactionId>> {
        let cf_by_account = self.cf(cf::TRANSACTIONS_BY_ACCOUNT)?;
        let prefix = keys::account_transactions_prefix(account_id);

        let iter = self
            .db
            .iterator_cf(&cf_by_account, IteratorMode::From(&prefix, Direction::Forward));

        let mut ids = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(db_err)?;
            if !key.starts_with(&prefix) {
                break;
            }
            let id = keys::extract_transaction_id(&key).ok_or_else(|| {
                StoreError::Serialization("malformed transaction index key".into())
            })?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Stage an account write plus an appended transaction onto `batch`.
    fn stage(
        &self,
        batch: &mut WriteBatch,
        account: &Account,
        transaction: &CreditTransaction,
    ) -> Result<()> {
        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_tx_by_account = self.cf(cf::TRANSACTIONS_BY_ACCOUNT)?;

        batch.put_cf(
            &cf_accounts,
            keys::account_key(&account.id),
            Self::serialize(account)?,
        );
        batch.put_cf(
            &cf_tx,
            keys::transaction_key(&transaction.id),
            Self::serialize(transaction)?,
        );
        // Index entry (empty value)
        batch.put_cf(
            &cf_tx_by_account,
            keys::account_transaction_key(&account.id, &transaction.id),
            [],
        );
        Ok(())
    }

    /// Apply a plain credit or debit to an existing account.
    fn apply(&self, transaction: &CreditTransaction) -> Result<i64> {
        let _guard = self.lock()?;

        let mut account = self
            .read_account(&transaction.account_id)?
            .ok_or_else(|| StoreError::account_not_found(&transaction.account_id))?;

        if transaction.kind.is_debit() && !account.has_sufficient_credits(transaction.amount) {
            return Err(StoreError::InsufficientCredits {
                balance: account.balance,
                required: transaction.amount,
            });
        }

        account.balance = checked_balance(
            &account.id,
            account.balance,
            transaction.balance_delta(),
        )?;
        account.updated_at = Utc::now();

        let mut batch = WriteBatch::default();
        self.stage(&mut batch, &account, transaction)?;
        self.db.write(batch).map_err(db_err)?;

        Ok(account.balance)
    }
}

#[async_trait]
impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    async fn create_account(
        &self,
        account: &Account,
        opening_grant: Option<&CreditTransaction>,
    ) -> Result<Account> {
        if let Some(grant) = opening_grant {
            ensure_kind(grant, false)?;
        }

        let _guard = self.lock()?;
        if self.read_account(&account.id)?.is_some() {
            return Err(StoreError::AlreadyExists {
                entity: entity::ACCOUNT,
                id: account.id.to_string(),
            });
        }

        let mut stored = account.clone();
        let mut batch = WriteBatch::default();
        if let Some(grant) = opening_grant {
            stored.balance = checked_balance(&stored.id, stored.balance, grant.amount)?;
            self.stage(&mut batch, &stored, grant)?;
        } else {
            let cf = self.cf(cf::ACCOUNTS)?;
            batch.put_cf(&cf, keys::account_key(&stored.id), Self::serialize(&stored)?);
        }
        self.db.write(batch).map_err(db_err)?;

        Ok(stored)
    }

    async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        self.read_account(account_id)
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    async fn list_transactions(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        // ULID keys sort oldest first; walk them backwards for newest first.
        let ids = self.transaction_ids(account_id)?;

        let mut transactions = Vec::with_capacity(limit.min(ids.len()));
        for id in ids.iter().rev().skip(offset).take(limit) {
            if let Some(tx) = self.read_transaction(id)? {
                transactions.push(tx);
            }
        }
        Ok(transactions)
    }

    async fn count_transactions(&self, account_id: &AccountId) -> Result<u64> {
        Ok(self.transaction_ids(account_id)?.len() as u64)
    }

    async fn sum_transactions(
        &self,
        account_id: &AccountId,
        kind: TransactionKind,
    ) -> Result<i64> {
        let mut total = 0;
        for id in self.transaction_ids(account_id)? {
            if let Some(tx) = self.read_transaction(&id)? {
                if tx.kind == kind {
                    total = checked_balance(account_id, total, tx.amount)?;
                }
            }
        }
        Ok(total)
    }

    // =========================================================================
    // Purchase Intent Operations
    // =========================================================================

    async fn put_purchase_intent(&self, intent: &PurchaseIntent) -> Result<()> {
        let _guard = self.lock()?;
        if self.read_intent(&intent.id)?.is_some() {
            return Err(StoreError::AlreadyExists {
                entity: entity::PURCHASE_INTENT,
                id: intent.id.to_string(),
            });
        }

        let cf_intents = self.cf(cf::PURCHASE_INTENTS)?;
        let cf_by_account = self.cf(cf::PURCHASE_INTENTS_BY_ACCOUNT)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_intents,
            keys::purchase_intent_key(&intent.id),
            Self::serialize(intent)?,
        );
        batch.put_cf(
            &cf_by_account,
            keys::account_purchase_intent_key(&intent.account_id, &intent.id),
            [],
        );
        self.db.write(batch).map_err(db_err)
    }

    async fn get_purchase_intent(
        &self,
        intent_id: &PaymentIntentId,
    ) -> Result<Option<PurchaseIntent>> {
        self.read_intent(intent_id)
    }

    async fn list_purchase_intents(
        &self,
        account_id: &AccountId,
        confirmed_only: bool,
    ) -> Result<Vec<PurchaseIntent>> {
        let cf_by_account = self.cf(cf::PURCHASE_INTENTS_BY_ACCOUNT)?;
        let prefix = keys::account_transactions_prefix(account_id);

        let iter = self
            .db
            .iterator_cf(&cf_by_account, IteratorMode::From(&prefix, Direction::Forward));

        let mut intents = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(db_err)?;
            if !key.starts_with(&prefix) {
                break;
            }
            let intent_id = keys::extract_purchase_intent_id(&key).ok_or_else(|| {
                StoreError::Serialization("malformed purchase intent index key".into())
            })?;
            if let Some(intent) = self.read_intent(&intent_id)? {
                if !confirmed_only || intent.confirmed {
                    intents.push(intent);
                }
            }
        }

        sort_newest_first(&mut intents);
        Ok(intents)
    }

    async fn sync_purchase_status(&self, intent_id: &PaymentIntentId, status: &str) -> Result<()> {
        let _guard = self.lock()?;
        let mut intent = self
            .read_intent(intent_id)?
            .ok_or_else(|| StoreError::intent_not_found(intent_id))?;
        intent.status = status.to_string();

        let cf = self.cf(cf::PURCHASE_INTENTS)?;
        self.db
            .put_cf(&cf, keys::purchase_intent_key(intent_id), Self::serialize(&intent)?)
            .map_err(db_err)
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    async fn add_credits(&self, transaction: &CreditTransaction) -> Result<i64> {
        ensure_kind(transaction, false)?;
        self.apply(transaction)
    }

    async fn spend_credits(&self, transaction: &CreditTransaction) -> Result<i64> {
        ensure_kind(transaction, true)?;
        self.apply(transaction)
    }

    async fn confirm_purchase(&self, confirmation: &PurchaseConfirmation) -> Result<i64> {
        ensure_kind(&confirmation.transaction, false)?;

        let _guard = self.lock()?;

        let mut intent = self
            .read_intent(&confirmation.intent_id)?
            .filter(|intent| intent.is_owned_by(&confirmation.account_id))
            .ok_or_else(|| StoreError::intent_not_found(&confirmation.intent_id))?;
        if intent.confirmed {
            return Err(StoreError::AlreadyConfirmed {
                intent_id: confirmation.intent_id.to_string(),
            });
        }

        let now = Utc::now();
        let mut account = self
            .read_account(&confirmation.account_id)?
            .unwrap_or_else(|| {
                Account::new(confirmation.account_id.clone())
                    .with_currency(confirmation.currency.as_str())
            });
        account.balance = checked_balance(
            &account.id,
            account.balance,
            confirmation.transaction.amount,
        )?;
        account.updated_at = now;

        intent.confirmed = true;
        intent.confirmed_at = Some(confirmation.confirmed_at);
        intent.status.clone_from(&confirmation.status);

        let cf_intents = self.cf(cf::PURCHASE_INTENTS)?;
        let mut batch = WriteBatch::default();
        self.stage(&mut batch, &account, &confirmation.transaction)?;
        batch.put_cf(
            &cf_intents,
            keys::purchase_intent_key(&intent.id),
            Self::serialize(&intent)?,
        );
        self.db.write(batch).map_err(db_err)?;

        Ok(account.balance)
    }
}
