//! Common test utilities for credit ledger integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use credit_ledger::{
    CreateIntentRequest, CreditLedger, PaymentProvider, ProviderError, ProviderIntent,
};
use credit_ledger_core::{
    Account, AccountId, CreditTransaction, PaymentIntentId, PurchaseIntent, TransactionKind,
};
use credit_ledger_store::{
    MemoryStore, PurchaseConfirmation, Result as StoreResult, Store, StoreError,
};

/// Status Stripe gives a freshly created intent.
pub const INITIAL_STATUS: &str = "requires_payment_method";

#[derive(Default)]
struct ProviderState {
    created: Vec<CreateIntentRequest>,
    retrieved: Vec<String>,
    statuses: HashMap<String, String>,
    fail_create: bool,
    fail_retrieve: bool,
}

/// Scripted payment provider that records every call.
#[derive(Default)]
pub struct MockProvider {
    state: Mutex<ProviderState>,
}

impl MockProvider {
    /// Set the status the provider reports for an intent.
    pub fn set_status(&self, intent_id: &str, status: &str) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(intent_id.to_string(), status.to_string());
    }

    /// Make `create_intent` fail.
    pub fn fail_create(&self) {
        self.state.lock().unwrap().fail_create = true;
    }

    /// Make `retrieve_intent` fail.
    pub fn fail_retrieve(&self) {
        self.state.lock().unwrap().fail_retrieve = true;
    }

    /// Requests passed to `create_intent`.
    pub fn created(&self) -> Vec<CreateIntentRequest> {
        self.state.lock().unwrap().created.clone()
    }

    /// Intent ids passed to `retrieve_intent`.
    pub fn retrieved(&self) -> Vec<String> {
        self.state.lock().unwrap().retrieved.clone()
    }

    fn api_error(message: &str) -> ProviderError {
        ProviderError::Api {
            error_type: "api_error".into(),
            message: message.into(),
            code: None,
        }
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    async fn create_intent(
        &self,
        request: &CreateIntentRequest,
    ) -> Result<ProviderIntent, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.created.push(request.clone());
        if state.fail_create {
            return Err(Self::api_error("card network unavailable"));
        }

        let id = format!("pi_test_{}", state.created.len());
        state.statuses.insert(id.clone(), INITIAL_STATUS.into());

        Ok(ProviderIntent {
            client_secret: Some(format!("{id}_secret_test")),
            id,
            status: INITIAL_STATUS.into(),
            amount: request.amount_cents,
            currency: request.currency.clone(),
        })
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<ProviderIntent, ProviderError> {
        // Let other confirmations run between the local checks and the store.
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        state.retrieved.push(intent_id.to_string());
        if state.fail_retrieve {
            return Err(Self::api_error("timeout talking to provider"));
        }

        let status = state
            .statuses
            .get(intent_id)
            .cloned()
            .ok_or_else(|| Self::api_error("No such payment_intent"))?;

        Ok(ProviderIntent {
            id: intent_id.to_string(),
            status,
            client_secret: None,
            amount: 0,
            currency: "usd".into(),
        })
    }
}

/// Store wrapper that counts reads and writes the ledger issues.
pub struct CountingStore {
    inner: Arc<MemoryStore>,
    account_lookups: AtomicUsize,
    intent_writes: AtomicUsize,
    fail_intent_writes: AtomicBool,
}

impl CountingStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            account_lookups: AtomicUsize::new(0),
            intent_writes: AtomicUsize::new(0),
            fail_intent_writes: AtomicBool::new(false),
        }
    }

    /// Make every `put_purchase_intent` fail with a database error.
    pub fn fail_intent_writes(&self) {
        self.fail_intent_writes.store(true, Ordering::SeqCst);
    }

    pub fn account_lookups(&self) -> usize {
        self.account_lookups.load(Ordering::SeqCst)
    }

    pub fn intent_writes(&self) -> usize {
        self.intent_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for CountingStore {
    async fn create_account(
        &self,
        account: &Account,
        opening_grant: Option<&CreditTransaction>,
    ) -> StoreResult<Account> {
        self.inner.create_account(account, opening_grant).await
    }

    async fn get_account(&self, account_id: &AccountId) -> StoreResult<Option<Account>> {
        self.account_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.get_account(account_id).await
    }

    async fn list_transactions(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<CreditTransaction>> {
        self.inner.list_transactions(account_id, limit, offset).await
    }

    async fn count_transactions(&self, account_id: &AccountId) -> StoreResult<u64> {
        self.inner.count_transactions(account_id).await
    }

    async fn sum_transactions(
        &self,
        account_id: &AccountId,
        kind: TransactionKind,
    ) -> StoreResult<i64> {
        self.inner.sum_transactions(account_id, kind).await
    }

    async fn put_purchase_intent(&self, intent: &PurchaseIntent) -> StoreResult<()> {
        self.intent_writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_intent_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database("connection reset by peer".into()));
        }
        self.inner.put_purchase_intent(intent).await
    }

    async fn get_purchase_intent(
        &self,
        intent_id: &PaymentIntentId,
    ) -> StoreResult<Option<PurchaseIntent>> {
        self.inner.get_purchase_intent(intent_id).await
    }

    async fn list_purchase_intents(
        &self,
        account_id: &AccountId,
        confirmed_only: bool,
    ) -> StoreResult<Vec<PurchaseIntent>> {
        self.inner
            .list_purchase_intents(account_id, confirmed_only)
            .await
    }

    async fn sync_purchase_status(
        &self,
        intent_id: &PaymentIntentId,
        status: &str,
    ) -> StoreResult<()> {
        self.inner.sync_purchase_status(intent_id, status).await
    }

    async fn add_credits(&self, transaction: &CreditTransaction) -> StoreResult<i64> {
        self.inner.add_credits(transaction).await
    }

    async fn spend_credits(&self, transaction: &CreditTransaction) -> StoreResult<i64> {
        self.inner.spend_credits(transaction).await
    }

    async fn confirm_purchase(&self, confirmation: &PurchaseConfirmation) -> StoreResult<i64> {
        self.inner.confirm_purchase(confirmation).await
    }
}

/// Test harness: a ledger over an in-memory store and a scripted provider.
pub struct TestHarness {
    pub ledger: CreditLedger,
    pub memory: Arc<MemoryStore>,
    pub store: Arc<CountingStore>,
    pub provider: Arc<MockProvider>,
}

impl TestHarness {
    /// Create a harness whose accounts open with a zero balance.
    pub fn new() -> Self {
        Self::with_signup_bonus(0)
    }

    /// Create a harness with the given account opening bonus.
    pub fn with_signup_bonus(bonus: i64) -> Self {
        let memory = Arc::new(MemoryStore::new());
        let store = Arc::new(CountingStore::new(memory.clone()));
        let provider = Arc::new(MockProvider::default());
        let ledger = CreditLedger::new(store.clone(), provider.clone()).with_signup_bonus(bonus);

        Self {
            ledger,
            memory,
            store,
            provider,
        }
    }

    /// Open an account.
    pub async fn open(&self, account_id: &str) {
        self.ledger.open_account(account_id).await.unwrap();
    }

    /// Create a purchase intent and mark it paid at the provider.
    pub async fn paid_intent(&self, account_id: &str, credits: i64) -> String {
        let created = self
            .ledger
            .create_purchase_intent(account_id, credits)
            .await
            .unwrap();
        let intent_id = created.intent_id.to_string();
        self.provider.set_status(&intent_id, "succeeded");
        intent_id
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
