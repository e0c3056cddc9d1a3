//! Error types for ledger storage.

use credit_ledger_core::LedgerError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Entity names carried by [`StoreError::NotFound`] and [`StoreError::AlreadyExists`].
pub mod entity {
    /// An account row.
    pub const ACCOUNT: &str = "account";
    /// A purchase intent row.
    pub const PURCHASE_INTENT: &str = "purchase_intent";
}

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Record key.
        id: String,
    },

    /// Record already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Kind of record.
        entity: &'static str,
        /// Record key.
        id: String,
    },

    /// Insufficient credits for deduction.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// The purchase intent's confirmation latch was already set.
    #[error("purchase already confirmed: {intent_id}")]
    AlreadyConfirmed {
        /// The payment intent ID.
        intent_id: String,
    },

    /// A transaction was handed to an operation that cannot apply it.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// A balance or total would exceed the 64-bit credit range.
    #[error("credit amount out of range for account {account_id}")]
    Overflow {
        /// The account whose balance or total overflowed.
        account_id: String,
    },
}

impl StoreError {
    pub(crate) fn account_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity::ACCOUNT,
            id: id.to_string(),
        }
    }

    pub(crate) fn intent_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity::PURCHASE_INTENT,
            id: id.to_string(),
        }
    }

    pub(crate) fn overflow(account_id: impl ToString) -> Self {
        Self::Overflow {
            account_id: account_id.to_string(),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } if entity == entity::ACCOUNT => {
                Self::AccountNotFound { account_id: id }
            }
            StoreError::NotFound { entity, id } if entity == entity::PURCHASE_INTENT => {
                Self::PurchaseNotFound { intent_id: id }
            }
            StoreError::AlreadyExists { entity, id } if entity == entity::ACCOUNT => {
                Self::AccountAlreadyExists { account_id: id }
            }
            StoreError::InsufficientCredits { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            StoreError::AlreadyConfirmed { intent_id } => Self::AlreadyConfirmed { intent_id },
            err @ (StoreError::Overflow { .. } | StoreError::InvalidTransaction(_)) => {
                Self::InvalidInput(err.to_string())
            }
            other => Self::Storage(other.to_string()),
        }
    }
}
