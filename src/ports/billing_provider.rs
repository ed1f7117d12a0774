//! Billing provider port - read access to the system of record.
//!
//! The engine never trusts inline event copies; every decision is made on
//! objects fetched through this port. Lookups return `Ok(None)` when the
//! provider answers "no such object" so callers can tell a data gap from an
//! outage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::billing::SubscriptionSnapshot;
use crate::domain::foundation::{CustomerId, SubscriptionId};

/// Port for the subscription-billing provider.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Decode a subscription object in the provider's wire format, as carried
    /// inline by subscription events. `None` if it is not one.
    fn decode_subscription(&self, object: &Value) -> Option<SubscriptionSnapshot>;

    /// Fetch a subscription by id.
    async fn get_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<SubscriptionSnapshot>, ProviderError>;

    /// Fetch an invoice by id.
    async fn get_invoice(&self, invoice_id: &str) -> Result<Option<InvoiceRef>, ProviderError>;

    /// Fetch a charge by id.
    async fn get_charge(&self, charge_id: &str) -> Result<Option<ChargeRef>, ProviderError>;

    /// Fetch a checkout session by id.
    async fn get_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSessionRef>, ProviderError>;

    /// Fetch a customer by id.
    async fn get_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerRef>, ProviderError>;

    /// List every subscription of a customer, in any status.
    async fn list_customer_subscriptions(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<SubscriptionSnapshot>, ProviderError>;

    /// Set one metadata key on a subscription.
    async fn set_subscription_metadata(
        &self,
        subscription_id: &SubscriptionId,
        key: &str,
        value: &str,
    ) -> Result<(), ProviderError>;

    /// Set one metadata key on a customer.
    async fn set_customer_metadata(
        &self,
        customer_id: &CustomerId,
        key: &str,
        value: &str,
    ) -> Result<(), ProviderError>;
}

/// The parts of an invoice the router needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRef {
    pub id: String,
    pub subscription_id: Option<SubscriptionId>,
    pub customer_id: Option<CustomerId>,
    pub metadata_uid: Option<String>,
}

/// The parts of a charge the router needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRef {
    pub id: String,
    pub invoice_id: Option<String>,
    pub customer_id: Option<CustomerId>,
    pub metadata_uid: Option<String>,
}

/// The parts of a checkout session the router needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSessionRef {
    pub id: String,
    pub subscription_id: Option<SubscriptionId>,
    pub customer_id: Option<CustomerId>,
    pub client_reference_id: Option<String>,
    pub metadata_uid: Option<String>,
}

/// The parts of a customer the resolver needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRef {
    pub id: CustomerId,
    pub metadata_uid: Option<String>,
}

/// Errors from billing provider operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderError {
    /// Error code for categorization.
    pub code: ProviderErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Provider's error code (if available).
    pub provider_code: Option<String>,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl ProviderError {
    /// Create a new provider error.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    /// Attach the provider's own error code.
    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationError, message)
    }

    /// Create a rate limit error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimited, message)
    }

    /// Create an error for a response that could not be decoded.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    /// Create a provider-side error.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ProviderError, message)
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Provider error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorCode {
    NetworkError,
    AuthenticationError,
    RateLimited,
    InvalidRequest,
    InvalidResponse,
    ProviderError,
}

impl ProviderErrorCode {
    /// Whether a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderErrorCode::NetworkError
                | ProviderErrorCode::RateLimited
                | ProviderErrorCode::ProviderError
        )
    }
}

impl std::fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderErrorCode::NetworkError => "network_error",
            ProviderErrorCode::AuthenticationError => "authentication_error",
            ProviderErrorCode::RateLimited => "rate_limited",
            ProviderErrorCode::InvalidRequest => "invalid_request",
            ProviderErrorCode::InvalidResponse => "invalid_response",
            ProviderErrorCode::ProviderError => "provider_error",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_provider_is_object_safe() {
        fn _accepts_dyn(_provider: &dyn BillingProvider) {}
    }

    #[test]
    fn network_errors_are_retryable() {
        let err = ProviderError::network("connection reset");
        assert!(err.retryable);
        assert_eq!(err.code, ProviderErrorCode::NetworkError);
    }

    #[test]
    fn authentication_errors_are_not_retryable() {
        assert!(!ProviderError::authentication("bad key").retryable);
        assert!(!ProviderErrorCode::InvalidRequest.is_retryable());
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = ProviderError::rate_limited("slow down").with_provider_code("rate_limit");
        assert_eq!(format!("{}", err), "rate_limited: slow down");
        assert_eq!(err.provider_code.as_deref(), Some("rate_limit"));
    }
}
