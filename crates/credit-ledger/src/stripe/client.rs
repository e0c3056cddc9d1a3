//! Stripe API client implementation.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::types::{PaymentIntent, StripeErrorResponse};
use crate::provider::{CreateIntentRequest, PaymentProvider, ProviderError, ProviderIntent};

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    /// Stripe API base URL.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.stripe.com";

    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a new Stripe client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Stripe secret API key (`sk_test_...` or `sk_live_...`)
    /// * `timeout` - Per-request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ProviderError::Configuration(
                "Stripe API key must not be empty".into(),
            ));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different API host (e.g. a local mock).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Create a payment intent.
    ///
    /// Metadata keys are sent as `metadata[key]` form fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Stripe rejects it.
    pub async fn create_payment_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: impl IntoIterator<Item = (&str, &str)>,
    ) -> Result<PaymentIntent, ProviderError> {
        let mut params = vec![
            ("amount".to_string(), amount_cents.to_string()),
            ("currency".to_string(), currency.to_string()),
        ];
        params.extend(
            metadata
                .into_iter()
                .map(|(key, value)| (format!("metadata[{key}]"), value.to_string())),
        );

        tracing::debug!(
            amount_cents = %amount_cents,
            currency = %currency,
            "Creating Stripe payment intent"
        );

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Get a single payment intent by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Stripe rejects it.
    pub async fn get_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, ProviderError> {
        tracing::debug!(payment_intent_id = %payment_intent_id, "Retrieving Stripe payment intent");

        let response = self
            .client
            .get(format!(
                "{}/v1/payment_intents/{}",
                self.base_url, payment_intent_id
            ))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<StripeErrorResponse, _> = response.json().await;

        match error_body {
            Ok(stripe_error) => Err(ProviderError::Api {
                error_type: stripe_error.error.error_type,
                message: stripe_error.error.message,
                code: stripe_error.error.code,
            }),
            Err(_) => Err(ProviderError::Api {
                error_type: "unknown".to_string(),
                message: format!("HTTP {status}"),
                code: None,
            }),
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_intent(
        &self,
        request: &CreateIntentRequest,
    ) -> Result<ProviderIntent, ProviderError> {
        let metadata = request
            .metadata
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()));

        self.create_payment_intent(request.amount_cents, &request.currency, metadata)
            .await
            .map(ProviderIntent::from)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<ProviderIntent, ProviderError> {
        self.get_payment_intent(intent_id)
            .await
            .map(ProviderIntent::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let client = StripeClient::new("sk_test_xxx", StripeClient::DEFAULT_TIMEOUT).unwrap();
        assert_eq!(client.base_url, "https://api.stripe.com");
    }

    #[test]
    fn empty_key_is_rejected() {
        let result = StripeClient::new("  ", StripeClient::DEFAULT_TIMEOUT);
        assert!(matches!(result, Err(ProviderError::Configuration(_))));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = StripeClient::new("sk_test_xxx", StripeClient::DEFAULT_TIMEOUT)
            .unwrap()
            .with_base_url("http://127.0.0.1:9999/");
        assert_eq!(client.base_url, "http://127.0.0.1:9999");
    }

    #[test]
    fn debug_hides_api_key() {
        let client = StripeClient::new("sk_test_secret", StripeClient::DEFAULT_TIMEOUT).unwrap();
        assert!(!format!("{client:?}").contains("sk_test_secret"));
    }
}
