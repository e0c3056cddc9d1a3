//! In-memory storage backend.
//!
//! All state lives behind one mutex. Compound operations stage their writes
//! on copies and commit them together at the end, so a failure at any step
//! leaves the store untouched. [`MemoryStore::inject_fault`] forces such a
//! failure between steps.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use credit_ledger_core::{
    Account, AccountId, CreditTransaction, PaymentIntentId, PurchaseIntent, TransactionKind,
};

use crate::error::{entity, Result, StoreError};
use crate::{checked_balance, ensure_kind, sort_newest_first, PurchaseConfirmation, Store};

/// A step inside a compound write where a fault can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// After the new balance is staged, before the transaction is appended.
    BalanceUpdated,
    /// After the transaction is staged, before anything is committed.
    TransactionAppended,
    /// After the purchase intent latch is staged, before commit.
    IntentLatched,
}

impl fmt::Display for FaultPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BalanceUpdated => "balance_updated",
            Self::TransactionAppended => "transaction_appended",
            Self::IntentLatched => "intent_latched",
        };
        f.write_str(name)
    }
}

#[derive(Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    // Per-account transactions in append order (oldest first).
    transactions: HashMap<AccountId, Vec<CreditTransaction>>,
    intents: HashMap<PaymentIntentId, PurchaseIntent>,
    fault: Option<FaultPoint>,
}

impl State {
    /// Fail if `point` is armed. The fault fires once.
    fn check_fault(&mut self, point: FaultPoint) -> Result<()> {
        if self.fault == Some(point) {
            self.fault = None;
            return Err(StoreError::Database(format!("injected fault at {point}")));
        }
        Ok(())
    }

    fn account(&self, account_id: &AccountId) -> Result<&Account> {
        self.accounts
            .get(account_id)
            .ok_or_else(|| StoreError::account_not_found(account_id))
    }

    fn history(&self, account_id: &AccountId) -> &[CreditTransaction] {
        self.transactions
            .get(account_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn commit(&mut self, account: Account, transaction: CreditTransaction) {
        self.transactions
            .entry(account.id.clone())
            .or_default()
            .push(transaction);
        self.accounts.insert(account.id.clone(), account);
    }
}

/// Process-local [`Store`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot fault: the next compound write reaching `point` fails
    /// with `StoreError::Database` and commits nothing.
    pub fn inject_fault(&self, point: FaultPoint) {
        if let Ok(mut state) = self.state.lock() {
            state.fault = Some(point);
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }

    /// Apply a plain credit or debit to an existing account.
    fn apply(&self, transaction: &CreditTransaction) -> Result<i64> {
        let mut state = self.lock()?;

        let mut account = state.account(&transaction.account_id)?.clone();
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
        state.check_fault(FaultPoint::BalanceUpdated)?;

        let staged = transaction.clone();
        state.check_fault(FaultPoint::TransactionAppended)?;

        let balance = account.balance;
        state.commit(account, staged);
        Ok(balance)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_account(
        &self,
        account: &Account,
        opening_grant: Option<&CreditTransaction>,
    ) -> Result<Account> {
        if let Some(grant) = opening_grant {
            ensure_kind(grant, false)?;
        }

        let mut state = self.lock()?;
        if state.accounts.contains_key(&account.id) {
            return Err(StoreError::AlreadyExists {
                entity: entity::ACCOUNT,
                id: account.id.to_string(),
            });
        }

        let mut stored = account.clone();
        let mut history = Vec::new();
        if let Some(grant) = opening_grant {
            stored.balance = checked_balance(&stored.id, stored.balance, grant.amount)?;
            state.check_fault(FaultPoint::BalanceUpdated)?;
            history.push(grant.clone());
            state.check_fault(FaultPoint::TransactionAppended)?;
        }

        state.transactions.insert(stored.id.clone(), history);
        state.accounts.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        Ok(self.lock()?.accounts.get(account_id).cloned())
    }

    async fn list_transactions(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let state = self.lock()?;
        let mut history = state.history(account_id).to_vec();
        history.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(history.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_transactions(&self, account_id: &AccountId) -> Result<u64> {
        let state = self.lock()?;
        Ok(state.history(account_id).len() as u64)
    }

    async fn sum_transactions(
        &self,
        account_id: &AccountId,
        kind: TransactionKind,
    ) -> Result<i64> {
        let state = self.lock()?;
        state
            .history(account_id)
            .iter()
            .filter(|tx| tx.kind == kind)
            .try_fold(0_i64, |total, tx| checked_balance(account_id, total, tx.amount))
    }

    async fn put_purchase_intent(&self, intent: &PurchaseIntent) -> Result<()> {
        let mut state = self.lock()?;
        if state.intents.contains_key(&intent.id) {
            return Err(StoreError::AlreadyExists {
                entity: entity::PURCHASE_INTENT,
                id: intent.id.to_string(),
            });
        }
        state.intents.insert(intent.id.clone(), intent.clone());
        Ok(())
    }

    async fn get_purchase_intent(
        &self,
        intent_id: &PaymentIntentId,
    ) -> Result<Option<PurchaseIntent>> {
        Ok(self.lock()?.intents.get(intent_id).cloned())
    }

    async fn list_purchase_intents(
        &self,
        account_id: &AccountId,
        confirmed_only: bool,
    ) -> Result<Vec<PurchaseIntent>> {
        let state = self.lock()?;
        let mut intents: Vec<_> = state
            .intents
            .values()
            .filter(|intent| intent.is_owned_by(account_id))
            .filter(|intent| !confirmed_only || intent.confirmed)
            .cloned()
            .collect();
        sort_newest_first(&mut intents);
        Ok(intents)
    }

    async fn sync_purchase_status(&self, intent_id: &PaymentIntentId, status: &str) -> Result<()> {
        let mut state = self.lock()?;
        let intent = state
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| StoreError::intent_not_found(intent_id))?;
        intent.status = status.to_string();
        Ok(())
    }

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

        let mut state = self.lock()?;

        let mut intent = match state.intents.get(&confirmation.intent_id) {
            Some(intent) if intent.is_owned_by(&confirmation.account_id) => intent.clone(),
            _ => return Err(StoreError::intent_not_found(&confirmation.intent_id)),
        };
        if intent.confirmed {
            return Err(StoreError::AlreadyConfirmed {
                intent_id: confirmation.intent_id.to_string(),
            });
        }

        let now = Utc::now();
        let mut account = state
            .accounts
            .get(&confirmation.account_id)
            .cloned()
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
        state.check_fault(FaultPoint::BalanceUpdated)?;

        let staged = confirmation.transaction.clone();
        state.check_fault(FaultPoint::TransactionAppended)?;

        intent.confirmed = true;
        intent.confirmed_at = Some(confirmation.confirmed_at);
        intent.status.clone_from(&confirmation.status);
        state.check_fault(FaultPoint::IntentLatched)?;

        let balance = account.balance;
        state.intents.insert(intent.id.clone(), intent);
        state.commit(account, staged);
        Ok(balance)
    }
}
