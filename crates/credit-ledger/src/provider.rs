//! Payment provider abstraction.
//!
//! The ledger talks to its payment processor only through [`PaymentProvider`],
//! so tests can substitute a scripted provider for Stripe.

use std::collections::BTreeMap;

use async_trait::async_trait;

/// Error type for payment provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider API returned an error.
    #[error("API error: {error_type} - {message}")]
    Api {
        /// Error type.
        error_type: String,
        /// Error message.
        message: String,
        /// Error code.
        code: Option<String>,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Parameters for a new payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIntentRequest {
    /// Amount to charge, in the currency's minor unit.
    pub amount_cents: i64,
    /// Lowercase ISO currency code.
    pub currency: String,
    /// Key/value pairs attached to the intent.
    pub metadata: BTreeMap<String, String>,
}

/// A payment intent as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIntent {
    /// Provider intent ID.
    pub id: String,
    /// Lifecycle status (e.g. `requires_payment_method`, `succeeded`).
    pub status: String,
    /// Secret the client uses to complete the payment.
    pub client_secret: Option<String>,
    /// Amount in the currency's minor unit.
    pub amount: i64,
    /// Currency code.
    pub currency: String,
}

/// An external payment processor.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a payment intent.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the request or is unreachable.
    async fn create_intent(
        &self,
        request: &CreateIntentRequest,
    ) -> Result<ProviderIntent, ProviderError>;

    /// Fetch the live state of a payment intent.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the request or is unreachable.
    async fn retrieve_intent(&self, intent_id: &str) -> Result<ProviderIntent, ProviderError>;
}
