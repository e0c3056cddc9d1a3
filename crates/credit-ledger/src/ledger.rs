//! Credit ledger operations.
//!
//! [`CreditLedger`] owns the business rules: package validation, the
//! purchase flow against the payment provider, and the balance queries.
//! Every balance change is delegated to one atomic store operation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use credit_ledger_core::{
    is_succeeded, Account, AccountId, CreditTransaction, LedgerError, PackageCatalog,
    PaymentIntentId, PurchaseIntent, Result, TransactionId, TransactionKind, DEFAULT_CURRENCY,
    DEFAULT_SIGNUP_BONUS_CREDITS,
};
use credit_ledger_store::{MemoryStore, PgStore, PurchaseConfirmation, Store, StoreError};

use crate::config::{LedgerConfig, StoreBackend};
use crate::provider::{CreateIntentRequest, PaymentProvider, ProviderError};
use crate::stripe::StripeClient;

/// Largest page `get_history` returns; bigger limits are clamped.
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Description of the transaction granted when an account is opened.
pub const SIGNUP_BONUS_DESCRIPTION: &str = "Registration bonus";

/// Result of [`CreditLedger::create_purchase_intent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseIntentCreated {
    /// Provider intent ID; pass it back to `confirm_purchase`.
    pub intent_id: PaymentIntentId,
    /// Secret the client uses to complete the payment.
    pub client_secret: Option<String>,
    /// Price charged, in cents.
    pub price_cents: i64,
    /// Credits that will be granted.
    pub credits: i64,
}

/// Result of [`CreditLedger::confirm_purchase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PurchaseConfirmed {
    /// Balance after the grant.
    pub new_balance: i64,
    /// Credits granted.
    pub credits_added: i64,
}

/// Result of [`CreditLedger::spend_credits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpendReceipt {
    /// The recorded `spent` transaction.
    pub transaction_id: TransactionId,
    /// Balance after the deduction.
    pub new_balance: i64,
}

/// One page of an account's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryPage {
    /// Transactions, newest first.
    pub transactions: Vec<CreditTransaction>,
    /// Total number of transactions for the account.
    pub total: u64,
    /// Whether more transactions follow this page.
    pub has_more: bool,
}

/// Balance together with lifetime totals per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditSummary {
    /// Current balance.
    pub balance: i64,
    /// Lifetime `earned` credits.
    pub total_earned: i64,
    /// Lifetime `spent` credits.
    pub total_spent: i64,
    /// Lifetime `purchased` credits.
    pub total_purchased: i64,
}

/// The credit ledger.
#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn Store>,
    provider: Arc<dyn PaymentProvider>,
    catalog: PackageCatalog,
    default_currency: String,
    signup_bonus_credits: i64,
}

fn parse_account_id(raw: &str) -> Result<AccountId> {
    AccountId::new(raw).map_err(LedgerError::from)
}

fn parse_intent_id(raw: &str) -> Result<PaymentIntentId> {
    PaymentIntentId::new(raw).map_err(LedgerError::from)
}

fn provider_failure(err: &ProviderError) -> LedgerError {
    LedgerError::PaymentProvider(err.to_string())
}

fn require_positive(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(LedgerError::InvalidInput(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

impl CreditLedger {
    /// Create a ledger with the default package catalog and signup bonus.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, provider: Arc<dyn PaymentProvider>) -> Self {
        Self {
            store,
            provider,
            catalog: PackageCatalog::default(),
            default_currency: DEFAULT_CURRENCY.to_string(),
            signup_bonus_credits: DEFAULT_SIGNUP_BONUS_CREDITS,
        }
    }

    /// Replace the package catalog.
    #[must_use]
    pub fn with_catalog(mut self, catalog: PackageCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Set the currency for accounts opened by this ledger.
    #[must_use]
    pub fn with_default_currency(mut self, currency: impl Into<String>) -> Self {
        self.default_currency = currency.into().to_ascii_lowercase();
        self
    }

    /// Set the credits granted on account opening. Zero disables the bonus.
    #[must_use]
    pub fn with_signup_bonus(mut self, credits: i64) -> Self {
        self.signup_bonus_credits = credits.max(0);
        self
    }

    /// Build a ledger from configuration: open the store and the Stripe client.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Configuration` if a required setting is missing,
    /// or `LedgerError::Storage` if the store cannot be opened.
    pub async fn from_config(config: &LedgerConfig) -> Result<Self> {
        let store: Arc<dyn Store> = match config.store {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            #[cfg(feature = "rocksdb-backend")]
            StoreBackend::RocksDb => Arc::new(
                credit_ledger_store::RocksStore::open(&config.data_dir).map_err(LedgerError::from)?,
            ),
            #[cfg(not(feature = "rocksdb-backend"))]
            StoreBackend::RocksDb => {
                return Err(LedgerError::Configuration(
                    "rocksdb backend not compiled in; enable the rocksdb-backend feature".into(),
                ))
            }
            StoreBackend::Postgres => {
                let url = config.database_url.as_deref().ok_or_else(|| {
                    LedgerError::Configuration("DATABASE_URL is required for postgres".into())
                })?;
                let store = PgStore::connect(url).await?;
                store.migrate().await?;
                Arc::new(store)
            }
        };

        let api_key = config
            .stripe_api_key
            .as_deref()
            .ok_or_else(|| LedgerError::Configuration("Stripe API key not configured".into()))?;
        let timeout = Duration::from_secs(config.stripe_timeout_seconds);
        let provider = StripeClient::new(api_key, timeout)
            .map_err(|e| LedgerError::Configuration(e.to_string()))?
            .with_base_url(config.stripe_api_base.as_str());

        tracing::info!(
            store = %config.store,
            packages = %config.packages,
            "Credit ledger configured"
        );

        Ok(Self::new(store, Arc::new(provider))
            .with_catalog(config.packages.clone())
            .with_default_currency(config.default_currency.as_str())
            .with_signup_bonus(config.signup_bonus_credits))
    }

    /// The packages on offer.
    #[must_use]
    pub const fn catalog(&self) -> &PackageCatalog {
        &self.catalog
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Open an account, granting the signup bonus if one is configured.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::AccountAlreadyExists` if the account exists.
    pub async fn open_account(&self, account_id: &str) -> Result<Account> {
        let account_id = parse_account_id(account_id)?;
        let account =
            Account::new(account_id.clone()).with_currency(self.default_currency.as_str());

        let bonus = (self.signup_bonus_credits > 0).then(|| {
            CreditTransaction::earned(
                account_id.clone(),
                self.signup_bonus_credits,
                SIGNUP_BONUS_DESCRIPTION.to_string(),
            )
        });

        let account = self.store.create_account(&account, bonus.as_ref()).await?;

        tracing::info!(
            account_id = %account_id,
            balance = account.balance,
            "Account opened"
        );

        Ok(account)
    }

    // =========================================================================
    // Purchases
    // =========================================================================

    /// Start a credit purchase.
    ///
    /// The account is always looked up before the package is validated, and
    /// the provider is contacted only once both checks pass.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidPackage` if `credits` is not on offer.
    /// - `LedgerError::AccountNotFound` if the account doesn't exist.
    /// - `LedgerError::PaymentProvider` if Stripe fails; nothing is stored.
    /// - `LedgerError::Storage` if the intent cannot be recorded.
    pub async fn create_purchase_intent(
        &self,
        account_id: &str,
        credits: i64,
    ) -> Result<PurchaseIntentCreated> {
        let account_id = parse_account_id(account_id)?;
        let account = self.store.get_account(&account_id).await?;

        let Some(package) = self.catalog.lookup(credits) else {
            tracing::warn!(account_id = %account_id, credits, "Rejected unknown credit package");
            return Err(LedgerError::InvalidPackage {
                requested: credits,
                valid: self.catalog.valid_amounts(),
            });
        };

        let account = account.ok_or_else(|| LedgerError::AccountNotFound {
            account_id: account_id.to_string(),
        })?;

        let request = CreateIntentRequest {
            amount_cents: package.price_cents,
            currency: account.currency.clone(),
            metadata: BTreeMap::from([
                ("account_id".to_string(), account_id.to_string()),
                ("credits".to_string(), credits.to_string()),
            ]),
        };

        let provider_intent = self.provider.create_intent(&request).await.map_err(|e| {
            tracing::error!(
                account_id = %account_id,
                error = %e,
                "Failed to create payment intent"
            );
            provider_failure(&e)
        })?;

        let intent_id = PaymentIntentId::new(provider_intent.id.as_str()).map_err(|e| {
            LedgerError::PaymentProvider(format!("provider returned an unusable intent id: {e}"))
        })?;

        let record = PurchaseIntent::pending(
            intent_id.clone(),
            account_id.clone(),
            package.credits,
            package.price_cents,
            account.currency,
            provider_intent.status,
        );

        self.store.put_purchase_intent(&record).await.map_err(|e| {
            tracing::error!(
                account_id = %account_id,
                intent_id = %intent_id,
                error = %e,
                "Failed to record purchase intent; provider intent is orphaned"
            );
            LedgerError::from(e)
        })?;

        tracing::info!(
            account_id = %account_id,
            intent_id = %intent_id,
            credits = package.credits,
            price_cents = package.price_cents,
            "Purchase intent created"
        );

        Ok(PurchaseIntentCreated {
            intent_id,
            client_secret: provider_intent.client_secret,
            price_cents: package.price_cents,
            credits: package.credits,
        })
    }

    /// Grant the credits for a paid purchase intent. Credits are granted at
    /// most once per intent.
    ///
    /// # Errors
    ///
    /// - `LedgerError::PurchaseNotFound` if the account has no such intent.
    /// - `LedgerError::AlreadyConfirmed` if credits were already granted.
    /// - `LedgerError::PaymentProvider` if Stripe cannot be queried.
    /// - `LedgerError::PaymentNotSucceeded` if Stripe has not reported success.
    pub async fn confirm_purchase(
        &self,
        intent_id: &str,
        account_id: &str,
    ) -> Result<PurchaseConfirmed> {
        let intent_id = parse_intent_id(intent_id)?;
        let account_id = parse_account_id(account_id)?;

        let intent = self
            .store
            .get_purchase_intent(&intent_id)
            .await?
            .filter(|intent| intent.is_owned_by(&account_id))
            .ok_or_else(|| LedgerError::PurchaseNotFound {
                intent_id: intent_id.to_string(),
            })?;

        if intent.confirmed {
            tracing::warn!(intent_id = %intent_id, "Purchase already confirmed");
            return Err(LedgerError::AlreadyConfirmed {
                intent_id: intent_id.to_string(),
            });
        }

        let live = self
            .provider
            .retrieve_intent(intent_id.as_str())
            .await
            .map_err(|e| {
                tracing::error!(
                    intent_id = %intent_id,
                    error = %e,
                    "Failed to retrieve payment intent"
                );
                provider_failure(&e)
            })?;

        self.store
            .sync_purchase_status(&intent_id, &live.status)
            .await?;

        if !is_succeeded(&live.status) {
            tracing::warn!(
                intent_id = %intent_id,
                status = %live.status,
                "Payment not successful"
            );
            return Err(LedgerError::PaymentNotSucceeded {
                status: live.status,
            });
        }

        let prior_balance = self
            .store
            .get_account(&account_id)
            .await?
            .map_or(0, |account| account.balance);

        let confirmation = PurchaseConfirmation {
            intent_id: intent_id.clone(),
            account_id: account_id.clone(),
            transaction: CreditTransaction::purchase(
                account_id.clone(),
                intent.credits,
                intent.amount_cents,
            ),
            status: live.status,
            currency: intent.currency.clone(),
            confirmed_at: Utc::now(),
        };

        let new_balance = self.store.confirm_purchase(&confirmation).await?;

        tracing::info!(
            account_id = %account_id,
            intent_id = %intent_id,
            credits = intent.credits,
            prior_balance,
            new_balance,
            "Purchase confirmed"
        );

        Ok(PurchaseConfirmed {
            new_balance,
            credits_added: intent.credits,
        })
    }

    /// Look up a purchase intent owned by an account.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::PurchaseNotFound` if the account has no such intent.
    pub async fn get_purchase_intent(
        &self,
        intent_id: &str,
        account_id: &str,
    ) -> Result<PurchaseIntent> {
        let intent_id = parse_intent_id(intent_id)?;
        let account_id = parse_account_id(account_id)?;

        self.store
            .get_purchase_intent(&intent_id)
            .await?
            .filter(|intent| intent.is_owned_by(&account_id))
            .ok_or_else(|| LedgerError::PurchaseNotFound {
                intent_id: intent_id.to_string(),
            })
    }

    /// The account's confirmed purchases, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn get_purchase_history(&self, account_id: &str) -> Result<Vec<PurchaseIntent>> {
        let account_id = parse_account_id(account_id)?;
        Ok(self.store.list_purchase_intents(&account_id, true).await?)
    }

    // =========================================================================
    // Spending and grants
    // =========================================================================

    /// Deduct credits for an AI operation.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidInput` if `amount` is not positive.
    /// - `LedgerError::AccountNotFound` if the account doesn't exist.
    /// - `LedgerError::InsufficientCredits` if the balance is too low.
    pub async fn spend_credits(
        &self,
        account_id: &str,
        amount: i64,
        description: &str,
        related_model: Option<&str>,
    ) -> Result<SpendReceipt> {
        let account_id = parse_account_id(account_id)?;
        require_positive(amount)?;

        let transaction = CreditTransaction::spend(
            account_id.clone(),
            amount,
            description.to_string(),
            related_model.map(str::to_string),
        );

        let new_balance = self
            .store
            .spend_credits(&transaction)
            .await
            .map_err(|e| {
                if let StoreError::InsufficientCredits { balance, required } = &e {
                    tracing::warn!(
                        account_id = %account_id,
                        balance,
                        required,
                        "Insufficient credits"
                    );
                }
                LedgerError::from(e)
            })?;

        tracing::info!(
            account_id = %account_id,
            amount,
            related_model = ?related_model,
            new_balance,
            "Credits spent"
        );

        Ok(SpendReceipt {
            transaction_id: transaction.id,
            new_balance,
        })
    }

    /// Grant free credits (promotions, support adjustments).
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidInput` if `amount` is not positive.
    /// - `LedgerError::AccountNotFound` if the account doesn't exist.
    pub async fn grant_credits(
        &self,
        account_id: &str,
        amount: i64,
        description: &str,
    ) -> Result<i64> {
        let account_id = parse_account_id(account_id)?;
        require_positive(amount)?;

        let transaction =
            CreditTransaction::earned(account_id.clone(), amount, description.to_string());
        let new_balance = self.store.add_credits(&transaction).await?;

        tracing::info!(account_id = %account_id, amount, new_balance, "Credits granted");
        Ok(new_balance)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current balance.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::AccountNotFound` if the account doesn't exist.
    pub async fn get_balance(&self, account_id: &str) -> Result<i64> {
        let account_id = parse_account_id(account_id)?;
        self.store
            .get_account(&account_id)
            .await?
            .map(|account| account.balance)
            .ok_or_else(|| LedgerError::AccountNotFound {
                account_id: account_id.to_string(),
            })
    }

    /// Transactions, newest first.
    ///
    /// `limit` must be at least 1; values above [`MAX_HISTORY_LIMIT`] are clamped.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidInput` if `limit` is zero.
    pub async fn get_history(
        &self,
        account_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let account_id = parse_account_id(account_id)?;
        let limit = clamp_limit(limit)?;
        Ok(self
            .store
            .list_transactions(&account_id, limit, offset)
            .await?)
    }

    /// A page of transactions with the account's total count.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidInput` if `limit` is zero.
    pub async fn get_history_page(
        &self,
        account_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<HistoryPage> {
        let account_id = parse_account_id(account_id)?;
        let limit = clamp_limit(limit)?;

        let transactions = self
            .store
            .list_transactions(&account_id, limit, offset)
            .await?;
        let total = self.store.count_transactions(&account_id).await?;
        let seen = (offset as u64).saturating_add(transactions.len() as u64);

        Ok(HistoryPage {
            transactions,
            total,
            has_more: seen < total,
        })
    }

    /// Lifetime sum of one transaction kind; 0 if there are none.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn get_total_by_kind(&self, account_id: &str, kind: TransactionKind) -> Result<i64> {
        let account_id = parse_account_id(account_id)?;
        Ok(self.store.sum_transactions(&account_id, kind).await?)
    }

    /// Balance and lifetime totals.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::AccountNotFound` if the account doesn't exist.
    pub async fn get_summary(&self, account_id: &str) -> Result<CreditSummary> {
        let balance = self.get_balance(account_id).await?;
        Ok(CreditSummary {
            balance,
            total_earned: self
                .get_total_by_kind(account_id, TransactionKind::Earned)
                .await?,
            total_spent: self
                .get_total_by_kind(account_id, TransactionKind::Spent)
                .await?,
            total_purchased: self
                .get_total_by_kind(account_id, TransactionKind::Purchased)
                .await?,
        })
    }
}

fn clamp_limit(limit: usize) -> Result<usize> {
    if limit == 0 {
        return Err(LedgerError::InvalidInput(
            "limit must be at least 1".into(),
        ));
    }
    Ok(limit.min(MAX_HISTORY_LIMIT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(clamp_limit(10).unwrap(), 10);
        assert_eq!(clamp_limit(500).unwrap(), MAX_HISTORY_LIMIT);
        assert!(matches!(clamp_limit(0), Err(LedgerError::InvalidInput(_))));
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        assert!(require_positive(1).is_ok());
        assert!(require_positive(0).is_err());
        assert!(require_positive(-10).is_err());
    }
}
