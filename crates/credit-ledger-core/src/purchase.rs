//! Purchase intent types.
//!
//! A purchase intent links a payment provider's intent object to the credits
//! it will grant once the payment succeeds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, PaymentIntentId};

/// Provider status that allows a purchase to be confirmed.
pub const STATUS_SUCCEEDED: &str = "succeeded";

/// A recorded attempt to buy credits.
///
/// `confirmed` is an idempotency latch: it flips to `true` exactly once, in
/// the same atomic unit that grants the credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseIntent {
    /// Provider intent ID.
    pub id: PaymentIntentId,

    /// Account that will receive the credits.
    pub account_id: AccountId,

    /// Credits granted on confirmation.
    pub credits: i64,

    /// Price charged, in cents.
    pub amount_cents: i64,

    /// Currency of the charge.
    pub currency: String,

    /// Last status reported by the provider (e.g. `requires_payment_method`).
    pub status: String,

    /// Whether credits have been granted for this intent.
    pub confirmed: bool,

    /// When the credits were granted.
    pub confirmed_at: Option<DateTime<Utc>>,

    /// When the intent was recorded.
    pub created_at: DateTime<Utc>,
}

impl PurchaseIntent {
    /// Create a pending (unconfirmed) purchase intent.
    #[must_use]
    pub fn pending(
        id: PaymentIntentId,
        account_id: AccountId,
        credits: i64,
        amount_cents: i64,
        currency: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            id,
            account_id,
            credits,
            amount_cents,
            currency: currency.into(),
            status: status.into(),
            confirmed: false,
            confirmed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Check if the intent belongs to an account.
    #[must_use]
    pub fn is_owned_by(&self, account_id: &AccountId) -> bool {
        &self.account_id == account_id
    }
}

/// Check whether a provider status means the payment went through.
#[must_use]
pub fn is_succeeded(status: &str) -> bool {
    status == STATUS_SUCCEEDED
}
