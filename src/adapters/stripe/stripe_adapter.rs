//! Stripe billing provider adapter.
//!
//! Implements the `BillingProvider` port against the Stripe REST API.
//! Reads use `GET`, metadata writes use form-encoded `POST` as Stripe
//! requires. A 404 is answered as `Ok(None)` so callers can tell a missing
//! object from an outage.
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(api_key);
//! let adapter = StripeBillingAdapter::new(config);
//! ```

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::billing::SubscriptionSnapshot;
use crate::domain::foundation::{CustomerId, SubscriptionId};
use crate::ports::{
    BillingProvider, ChargeRef, CheckoutSessionRef, CustomerRef, InvoiceRef, ProviderError,
    ProviderErrorCode,
};

use super::webhook_types::{
    decode_subscription, StripeCharge, StripeCheckoutSession, StripeCustomer, StripeInvoice,
    StripeList, StripeSubscription,
};

const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";

/// Page size for subscription listing (Stripe's maximum).
const LIST_PAGE_SIZE: &str = "100";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Base URL for Stripe API (default: https://api.stripe.com).
    api_base_url: String,

    /// Per-request timeout.
    request_timeout: Duration,
}

impl StripeConfig {
    /// Create a new Stripe configuration.
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }
}

/// Stripe error body: `{"error": {"type": ..., "code": ..., "message": ...}}`.
#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Stripe billing provider adapter.
pub struct StripeBillingAdapter {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripeBillingAdapter {
    /// Create a new Stripe adapter with the given configuration.
    pub fn new(config: StripeConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            http_client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    /// GET a single object. 404 is `Ok(None)`.
    async fn get_object<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, ProviderError> {
        let response = self
            .http_client
            .get(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = Self::check_status(response, path).await?;

        response.json::<T>().await.map(Some).map_err(|e| {
            ProviderError::invalid_response(format!("Failed to parse Stripe response: {}", e))
        })
    }

    async fn post_form(&self, path: &str, params: &[(String, String)]) -> Result<(), ProviderError> {
        let response = self
            .http_client
            .post(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(params)
            .send()
            .await
            .map_err(|e| ProviderError::network(e.to_string()))?;

        Self::check_status(response, path).await?;
        Ok(())
    }

    /// Maps a non-success response onto a `ProviderError`.
    async fn check_status(
        response: reqwest::Response,
        path: &str,
    ) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<StripeErrorBody>(&body)
            .ok()
            .map(|b| b.error);
        let message = detail
            .as_ref()
            .and_then(|d| d.message.clone())
            .unwrap_or_else(|| format!("Stripe API error ({})", status));

        let code = match status {
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                ProviderErrorCode::AuthenticationError
            }
            reqwest::StatusCode::TOO_MANY_REQUESTS => ProviderErrorCode::RateLimited,
            s if s.is_server_error() => ProviderErrorCode::ProviderError,
            _ => ProviderErrorCode::InvalidRequest,
        };

        tracing::error!(
            path = %path,
            status = status.as_u16(),
            error = %message,
            "Stripe API request failed"
        );

        let mut error = ProviderError::new(code, message);
        if let Some(provider_code) = detail.and_then(|d| d.code) {
            error = error.with_provider_code(provider_code);
        }
        Err(error)
    }

    fn metadata_params(key: &str, value: &str) -> Vec<(String, String)> {
        vec![(format!("metadata[{}]", key), value.to_string())]
    }
}

#[async_trait]
impl BillingProvider for StripeBillingAdapter {
    fn decode_subscription(&self, object: &Value) -> Option<SubscriptionSnapshot> {
        decode_subscription(object)
    }

    async fn get_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<SubscriptionSnapshot>, ProviderError> {
        let path = format!("/v1/subscriptions/{}", subscription_id);
        let subscription: Option<StripeSubscription> = self.get_object(&path, &[]).await?;
        Ok(subscription.and_then(StripeSubscription::into_snapshot))
    }

    async fn get_invoice(&self, invoice_id: &str) -> Result<Option<InvoiceRef>, ProviderError> {
        let path = format!("/v1/invoices/{}", invoice_id);
        let invoice: Option<StripeInvoice> = self.get_object(&path, &[]).await?;
        Ok(invoice.map(InvoiceRef::from))
    }

    async fn get_charge(&self, charge_id: &str) -> Result<Option<ChargeRef>, ProviderError> {
        let path = format!("/v1/charges/{}", charge_id);
        let charge: Option<StripeCharge> = self.get_object(&path, &[]).await?;
        Ok(charge.map(ChargeRef::from))
    }

    async fn get_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSessionRef>, ProviderError> {
        let path = format!("/v1/checkout/sessions/{}", session_id);
        let session: Option<StripeCheckoutSession> = self.get_object(&path, &[]).await?;
        Ok(session.map(CheckoutSessionRef::from))
    }

    async fn get_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerRef>, ProviderError> {
        let path = format!("/v1/customers/{}", customer_id);
        let customer: Option<StripeCustomer> = self.get_object(&path, &[]).await?;
        Ok(customer.and_then(StripeCustomer::into_ref))
    }

    async fn list_customer_subscriptions(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<SubscriptionSnapshot>, ProviderError> {
        let mut snapshots = Vec::new();
        let mut starting_after: Option<String> = None;

        loop {
            let page: StripeList<StripeSubscription> = {
                let mut query = vec![
                    ("customer", customer_id.as_str()),
                    ("status", "all"),
                    ("limit", LIST_PAGE_SIZE),
                ];
                if let Some(after) = starting_after.as_deref() {
                    query.push(("starting_after", after));
                }
                self.get_object("/v1/subscriptions", &query)
                    .await?
                    .unwrap_or_default()
            };

            let last_id = page.data.last().map(|s| s.id.clone());
            snapshots.extend(
                page.data
                    .into_iter()
                    .filter_map(StripeSubscription::into_snapshot),
            );

            match (page.has_more, last_id) {
                (true, Some(id)) => starting_after = Some(id),
                _ => break,
            }
        }

        tracing::debug!(
            customer_id = %customer_id,
            count = snapshots.len(),
            "Listed customer subscriptions"
        );
        Ok(snapshots)
    }

    async fn set_subscription_metadata(
        &self,
        subscription_id: &SubscriptionId,
        key: &str,
        value: &str,
    ) -> Result<(), ProviderError> {
        let path = format!("/v1/subscriptions/{}", subscription_id);
        self.post_form(&path, &Self::metadata_params(key, value)).await
    }

    async fn set_customer_metadata(
        &self,
        customer_id: &CustomerId,
        key: &str,
        value: &str,
    ) -> Result<(), ProviderError> {
        let path = format!("/v1/customers/{}", customer_id);
        self.post_form(&path, &Self::metadata_params(key, value)).await
    }
}
