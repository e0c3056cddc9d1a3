//! Error types for the credit ledger.
//!
//! Every public ledger operation returns [`Result`]. Failures carry a stable
//! [`code`](LedgerError::code) and a human-readable message that callers can
//! show directly; [`Failure`] is the serialisable form of both.

use serde::Serialize;

use crate::ids::IdError;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur in ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed input (empty ids, non-positive amounts, bad paging).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// The requested credit amount is not an offered package.
    #[error("invalid credit amount {requested}; valid amounts: {}", join_amounts(.valid))]
    InvalidPackage {
        /// The amount that was asked for.
        requested: i64,
        /// Amounts that are on offer.
        valid: Vec<i64>,
    },

    /// Account not found.
    #[error("account not found: {account_id}")]
    AccountNotFound {
        /// The account ID that was not found.
        account_id: String,
    },

    /// Account already exists.
    #[error("account already exists: {account_id}")]
    AccountAlreadyExists {
        /// The account ID that already exists.
        account_id: String,
    },

    /// No purchase record exists for the payment intent.
    #[error("purchase record not found for payment intent {intent_id}")]
    PurchaseNotFound {
        /// The payment intent ID.
        intent_id: String,
    },

    /// The provider has not reported the payment as succeeded.
    #[error("payment not successful; status: {status}")]
    PaymentNotSucceeded {
        /// Provider status, verbatim.
        status: String,
    },

    /// Credits for this intent were already granted.
    #[error("purchase already confirmed for payment intent {intent_id}")]
    AlreadyConfirmed {
        /// The payment intent ID.
        intent_id: String,
    },

    /// Insufficient credits for the operation.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// The payment provider call failed.
    #[error("payment provider error: {0}")]
    PaymentProvider(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

fn join_amounts(amounts: &[i64]) -> String {
    amounts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Broad category of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected before any I/O.
    Validation,
    /// A referenced record does not exist.
    NotFound,
    /// The payment provider failed.
    Upstream,
    /// Persistence failed.
    Storage,
    /// A business rule refused the operation.
    BusinessRule,
    /// The ledger is misconfigured.
    Configuration,
}

impl LedgerError {
    /// Category of the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::InvalidId(_) | Self::InvalidPackage { .. } => {
                ErrorKind::Validation
            }
            Self::AccountNotFound { .. } | Self::PurchaseNotFound { .. } => ErrorKind::NotFound,
            Self::AccountAlreadyExists { .. }
            | Self::PaymentNotSucceeded { .. }
            | Self::AlreadyConfirmed { .. }
            | Self::InsufficientCredits { .. } => ErrorKind::BusinessRule,
            Self::PaymentProvider(_) => ErrorKind::Upstream,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidId(_) => "invalid_id",
            Self::InvalidPackage { .. } => "invalid_package",
            Self::AccountNotFound { .. } => "account_not_found",
            Self::AccountAlreadyExists { .. } => "account_already_exists",
            Self::PurchaseNotFound { .. } => "purchase_not_found",
            Self::PaymentNotSucceeded { .. } => "payment_not_succeeded",
            Self::AlreadyConfirmed { .. } => "already_confirmed",
            Self::InsufficientCredits { .. } => "insufficient_credits",
            Self::PaymentProvider(_) => "payment_provider_error",
            Self::Storage(_) => "storage_error",
            Self::Configuration(_) => "configuration_error",
        }
    }
}

/// Serialisable failure body for callers that map results onto responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// Stable error code.
    pub code: &'static str,
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable reason.
    pub message: String,
}

impl From<&LedgerError> for Failure {
    fn from(err: &LedgerError) -> Self {
        Self {
            code: err.code(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
