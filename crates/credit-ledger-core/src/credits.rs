//! Credit transaction types for the credit ledger.
//!
//! This module defines credit transactions that record every balance change.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, TransactionId};

/// A credit transaction representing a balance change.
///
/// Transactions are append-only. `amount` is always a positive magnitude;
/// whether it was added or removed is given by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The account whose balance was affected.
    pub account_id: AccountId,

    /// Type of transaction.
    pub kind: TransactionKind,

    /// Magnitude of the change in credits.
    pub amount: i64,

    /// Human-readable description.
    pub description: String,

    /// AI model that consumed or produced the credits, if any.
    pub related_model: Option<String>,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    fn new(
        account_id: AccountId,
        kind: TransactionKind,
        amount: i64,
        description: String,
        related_model: Option<String>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            account_id,
            kind,
            amount: amount.abs(),
            description,
            related_model,
            created_at: Utc::now(),
        }
    }

    /// Create a new purchase transaction.
    ///
    /// The description names the credit count and the price in dollars.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn purchase(account_id: AccountId, credits: i64, amount_cents: i64) -> Self {
        let description = format!(
            "Credit purchase: {credits} credits (${:.2})",
            amount_cents as f64 / 100.0
        );
        Self::new(
            account_id,
            TransactionKind::Purchased,
            credits,
            description,
            None,
        )
    }

    /// Create a new spend transaction (deduction).
    #[must_use]
    pub fn spend(
        account_id: AccountId,
        amount: i64,
        description: String,
        related_model: Option<String>,
    ) -> Self {
        Self::new(
            account_id,
            TransactionKind::Spent,
            amount,
            description,
            related_model,
        )
    }

    /// Create a new earned transaction (bonus, grant).
    #[must_use]
    pub fn earned(account_id: AccountId, amount: i64, description: String) -> Self {
        Self::new(account_id, TransactionKind::Earned, amount, description, None)
    }

    /// Signed effect of this transaction on the balance.
    #[must_use]
    pub const fn balance_delta(&self) -> i64 {
        if self.kind.is_debit() {
            -self.amount
        } else {
            self.amount
        }
    }
}

/// Type of credit transaction.
///
/// Closed set. New kinds may be added; existing ones are never repurposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Credits granted for free (registration bonus, promotions).
    Earned,

    /// Credits consumed by an AI operation.
    Spent,

    /// Credits bought through the payment provider.
    Purchased,
}

impl TransactionKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 3] = [Self::Earned, Self::Spent, Self::Purchased];

    /// Get the kind name as stored.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Earned => "earned",
            Self::Spent => "spent",
            Self::Purchased => "purchased",
        }
    }

    /// Check if this transaction kind adds credits.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Earned | Self::Purchased)
    }

    /// Check if this transaction kind removes credits.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::Spent)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// A stored kind string that does not name a [`TransactionKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transaction kind: {0}")]
pub struct UnknownKind(pub String);
