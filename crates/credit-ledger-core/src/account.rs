//! Account types for the credit ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AccountId;

/// Currency used when an account does not specify one.
pub const DEFAULT_CURRENCY: &str = "usd";

/// Credits granted to a freshly opened account.
pub const DEFAULT_SIGNUP_BONUS_CREDITS: i64 = 100;

/// A billing account holding a credit balance.
///
/// The balance is only ever changed through the store's compound operations,
/// each of which appends a matching [`crate::CreditTransaction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The account (user) ID.
    pub id: AccountId,

    /// Current credit balance. Never negative.
    pub balance: i64,

    /// Lowercase ISO currency code used for purchases.
    pub currency: String,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with zero balance in the default currency.
    #[must_use]
    pub fn new(id: AccountId) -> Self {
        let now = Utc::now();
        Self {
            id,
            balance: 0,
            currency: DEFAULT_CURRENCY.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the purchase currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into().to_ascii_lowercase();
        self
    }

    /// Check if the account has sufficient credits for a deduction.
    #[must_use]
    pub fn has_sufficient_credits(&self, amount: i64) -> bool {
        self.balance >= amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account_id() -> AccountId {
        AccountId::new("user_123456789").unwrap()
    }

    #[test]
    fn new_account_has_zero_balance() {
        let account = Account::new(account_id());
        assert_eq!(account.balance, 0);
        assert_eq!(account.currency, "usd");
        assert_eq!(account.created_at, account.updated_at);
    }

    #[test]
    fn account_sufficient_credits() {
        let mut account = Account::new(account_id());
        account.balance = 1000;

        assert!(account.has_sufficient_credits(500));
        assert!(account.has_sufficient_credits(1000));
        assert!(!account.has_sufficient_credits(1001));
    }

    #[test]
    fn currency_is_lowercased() {
        let account = Account::new(account_id()).with_currency("EUR");
        assert_eq!(account.currency, "eur");
    }
}
