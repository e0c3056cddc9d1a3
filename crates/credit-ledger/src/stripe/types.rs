//! Stripe API types.

use std::collections::HashMap;

use serde::Deserialize;

use crate::provider::ProviderIntent;

/// Stripe `PaymentIntent` object.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    /// Payment intent ID.
    pub id: String,
    /// Amount in cents.
    #[serde(default)]
    pub amount: i64,
    /// Currency (e.g., "usd").
    #[serde(default)]
    pub currency: String,
    /// Status (succeeded, processing, `requires_payment_method`, etc.).
    #[serde(default)]
    pub status: String,
    /// Secret handed to the client to complete payment.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Created timestamp (Unix).
    #[serde(default)]
    pub created: i64,
    /// Metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl From<PaymentIntent> for ProviderIntent {
    fn from(pi: PaymentIntent) -> Self {
        Self {
            id: pi.id,
            status: pi.status,
            client_secret: pi.client_secret,
            amount: pi.amount,
            currency: pi.currency,
        }
    }
}

/// Stripe API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    /// Error details.
    pub error: StripeErrorDetail,
}

/// Stripe error detail.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorDetail {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Error code.
    #[serde(default)]
    pub code: Option<String>,
    /// Parameter that caused the error.
    #[serde(default)]
    pub param: Option<String>,
}
