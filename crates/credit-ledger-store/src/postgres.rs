//! `PostgreSQL` storage implementation.
//!
//! Compound operations run inside one database transaction. The purchase
//! latch is a conditional `UPDATE ... WHERE confirmed = FALSE`, so two
//! concurrent confirmations cannot both grant credits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};

use credit_ledger_core::{
    Account, AccountId, CreditTransaction, PaymentIntentId, PurchaseIntent, TransactionKind,
};

use crate::error::{entity, Result, StoreError};
use crate::{checked_balance, ensure_kind, PurchaseConfirmation, Store};

const UNIQUE_VIOLATION: &str = "23505";
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    has_code(err, UNIQUE_VIOLATION)
}

fn has_code(err: &sqlx::Error, wanted: &str) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == wanted)
}

/// Map a failed balance or sum query, reporting `bigint` overflow per account.
fn arithmetic_err(account_id: &AccountId) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |err| {
        if has_code(&err, NUMERIC_VALUE_OUT_OF_RANGE) {
            StoreError::overflow(account_id)
        } else {
            db_err(err)
        }
    }
}

fn decode_err(what: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Serialization(format!("invalid stored {what}: {err}"))
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(FromRow)]
struct AccountRow {
    id: String,
    balance: i64,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self> {
        Ok(Self {
            id: AccountId::new(row.id).map_err(|e| decode_err("account id", e))?,
            balance: row.balance,
            currency: row.currency,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct TransactionRow {
    id: String,
    account_id: String,
    kind: String,
    amount: i64,
    description: String,
    related_model: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for CreditTransaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self> {
        Ok(Self {
            id: row.id.parse().map_err(|e| decode_err("transaction id", e))?,
            account_id: AccountId::new(row.account_id).map_err(|e| decode_err("account id", e))?,
            kind: row.kind.parse().map_err(|e| decode_err("kind", e))?,
            amount: row.amount,
            description: row.description,
            related_model: row.related_model,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct IntentRow {
    id: String,
    account_id: String,
    credits: i64,
    amount_cents: i64,
    currency: String,
    status: String,
    confirmed: bool,
    confirmed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<IntentRow> for PurchaseIntent {
    type Error = StoreError;

    fn try_from(row: IntentRow) -> Result<Self> {
        Ok(Self {
            id: PaymentIntentId::new(row.id).map_err(|e| decode_err("intent id", e))?,
            account_id: AccountId::new(row.account_id).map_err(|e| decode_err("account id", e))?,
            credits: row.credits,
            amount_cents: row.amount_cents,
            currency: row.currency,
            status: row.status,
            confirmed: row.confirmed,
            confirmed_at: row.confirmed_at,
            created_at: row.created_at,
        })
    }
}

/// PostgreSQL-backed storage implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(db_err)?;
        Ok(Self::new(pool))
    }

    /// Apply the bundled schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tracing::info!("Ledger schema migrations applied");
        Ok(())
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_transaction(
        tx: &mut Transaction<'_, Postgres>,
        transaction: &CreditTransaction,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO credit_transactions \
             (id, account_id, kind, amount, description, related_model, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(transaction.id.to_string())
        .bind(transaction.account_id.as_str())
        .bind(transaction.kind.as_str())
        .bind(transaction.amount)
        .bind(&transaction.description)
        .bind(transaction.related_model.as_deref())
        .bind(transaction.created_at)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
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

        let mut stored = account.clone();
        stored.balance = checked_balance(
            &stored.id,
            stored.balance,
            opening_grant.map_or(0, |grant| grant.amount),
        )?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let inserted = sqlx::query(
            "INSERT INTO accounts (id, balance, currency, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5) ON CONFLICT (id) DO NOTHING",
        )
        .bind(stored.id.as_str())
        .bind(stored.balance)
        .bind(&stored.currency)
        .bind(stored.created_at)
        .bind(stored.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if inserted.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists {
                entity: entity::ACCOUNT,
                id: stored.id.to_string(),
            });
        }

        if let Some(grant) = opening_grant {
            Self::insert_transaction(&mut tx, grant).await?;
        }
        tx.commit().await.map_err(db_err)?;

        Ok(stored)
    }

    async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        sqlx::query_as::<_, AccountRow>(
            "SELECT id, balance, currency, created_at, updated_at FROM accounts WHERE id = $1",
        )
        .bind(account_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(Account::try_from)
        .transpose()
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
        sqlx::query_as::<_, TransactionRow>(
            "SELECT id, account_id, kind, amount, description, related_model, created_at \
             FROM credit_transactions WHERE account_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
        )
        .bind(account_id.as_str())
        .bind(to_i64(limit))
        .bind(to_i64(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(CreditTransaction::try_from)
        .collect()
    }

    async fn count_transactions(&self, account_id: &AccountId) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM credit_transactions WHERE account_id = $1")
                .bind(account_id.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn sum_transactions(
        &self,
        account_id: &AccountId,
        kind: TransactionKind,
    ) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM credit_transactions \
             WHERE account_id = $1 AND kind = $2",
        )
        .bind(account_id.as_str())
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(arithmetic_err(account_id))
    }

    // =========================================================================
    // Purchase Intent Operations
    // =========================================================================

    async fn put_purchase_intent(&self, intent: &PurchaseIntent) -> Result<()> {
        sqlx::query(
            "INSERT INTO purchase_intents \
             (id, account_id, credits, amount_cents, currency, status, confirmed, \
             confirmed_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(intent.id.as_str())
        .bind(intent.account_id.as_str())
        .bind(intent.credits)
        .bind(intent.amount_cents)
        .bind(&intent.currency)
        .bind(&intent.status)
        .bind(intent.confirmed)
        .bind(intent.confirmed_at)
        .bind(intent.created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::AlreadyExists {
                    entity: entity::PURCHASE_INTENT,
                    id: intent.id.to_string(),
                }
            } else {
                db_err(err)
            }
        })?;
        Ok(())
    }

    async fn get_purchase_intent(
        &self,
        intent_id: &PaymentIntentId,
    ) -> Result<Option<PurchaseIntent>> {
        sqlx::query_as::<_, IntentRow>(
            "SELECT id, account_id, credits, amount_cents, currency, status, confirmed, \
             confirmed_at, created_at FROM purchase_intents WHERE id = $1",
        )
        .bind(intent_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(PurchaseIntent::try_from)
        .transpose()
    }

    async fn list_purchase_intents(
        &self,
        account_id: &AccountId,
        confirmed_only: bool,
    ) -> Result<Vec<PurchaseIntent>> {
        // Served by purchase_intents_account_idx.
        sqlx::query_as::<_, IntentRow>(
            "SELECT id, account_id, credits, amount_cents, currency, status, confirmed, \
             confirmed_at, created_at FROM purchase_intents \
             WHERE account_id = $1 AND (confirmed OR NOT $2) \
             ORDER BY created_at DESC, id DESC",
        )
        .bind(account_id.as_str())
        .bind(confirmed_only)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(PurchaseIntent::try_from)
        .collect()
    }

    async fn sync_purchase_status(&self, intent_id: &PaymentIntentId, status: &str) -> Result<()> {
        let updated = sqlx::query("UPDATE purchase_intents SET status = $2 WHERE id = $1")
            .bind(intent_id.as_str())
            .bind(status)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::intent_not_found(intent_id));
        }
        Ok(())
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    async fn add_credits(&self, transaction: &CreditTransaction) -> Result<i64> {
        ensure_kind(transaction, false)?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let balance: i64 = sqlx::query_scalar(
            "UPDATE accounts SET balance = balance + $2, updated_at = NOW() \
             WHERE id = $1 RETURNING balance",
        )
        .bind(transaction.account_id.as_str())
        .bind(transaction.amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(arithmetic_err(&transaction.account_id))?
        .ok_or_else(|| StoreError::account_not_found(&transaction.account_id))?;

        Self::insert_transaction(&mut tx, transaction).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(balance)
    }

    async fn spend_credits(&self, transaction: &CreditTransaction) -> Result<i64> {
        ensure_kind(transaction, true)?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let current: i64 =
            sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1 FOR UPDATE")
                .bind(transaction.account_id.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?
                .ok_or_else(|| StoreError::account_not_found(&transaction.account_id))?;

        if current < transaction.amount {
            return Err(StoreError::InsufficientCredits {
                balance: current,
                required: transaction.amount,
            });
        }

        let balance: i64 = sqlx::query_scalar(
            "UPDATE accounts SET balance = balance - $2, updated_at = NOW() \
             WHERE id = $1 RETURNING balance",
        )
        .bind(transaction.account_id.as_str())
        .bind(transaction.amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        Self::insert_transaction(&mut tx, transaction).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(balance)
    }

    async fn confirm_purchase(&self, confirmation: &PurchaseConfirmation) -> Result<i64> {
        ensure_kind(&confirmation.transaction, false)?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let latched = sqlx::query(
            "UPDATE purchase_intents SET confirmed = TRUE, confirmed_at = $3, status = $4 \
             WHERE id = $1 AND account_id = $2 AND confirmed = FALSE",
        )
        .bind(confirmation.intent_id.as_str())
        .bind(confirmation.account_id.as_str())
        .bind(confirmation.confirmed_at)
        .bind(&confirmation.status)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if latched.rows_affected() == 0 {
            let confirmed: Option<bool> = sqlx::query_scalar(
                "SELECT confirmed FROM purchase_intents WHERE id = $1 AND account_id = $2",
            )
            .bind(confirmation.intent_id.as_str())
            .bind(confirmation.account_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;

            return Err(match confirmed {
                Some(true) => StoreError::AlreadyConfirmed {
                    intent_id: confirmation.intent_id.to_string(),
                },
                _ => StoreError::intent_not_found(&confirmation.intent_id),
            });
        }

        let balance: i64 = sqlx::query_scalar(
            "INSERT INTO accounts (id, balance, currency, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $4) \
             ON CONFLICT (id) DO UPDATE \
             SET balance = accounts.balance + EXCLUDED.balance, updated_at = EXCLUDED.updated_at \
             RETURNING balance",
        )
        .bind(confirmation.account_id.as_str())
        .bind(confirmation.transaction.amount)
        .bind(confirmation.currency.to_ascii_lowercase())
        .bind(confirmation.confirmed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(arithmetic_err(&confirmation.account_id))?;

        Self::insert_transaction(&mut tx, &confirmation.transaction).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(balance)
    }
}
