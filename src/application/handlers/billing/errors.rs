//! Errors surfaced by the billing handlers.
//!
//! Only infrastructure failures are errors. Missing identity, missing
//! subscriptions and unknown plans are ordinary outcomes.

use thiserror::Error;

use crate::domain::billing::WebhookError;
use crate::domain::foundation::DomainError;
use crate::ports::ProviderError;

#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error("Storage failure: {0}")]
    Storage(#[from] DomainError),

    #[error("Billing provider failure: {0}")]
    Provider(#[from] ProviderError),
}

impl From<EntitlementError> for WebhookError {
    fn from(err: EntitlementError) -> Self {
        match err {
            EntitlementError::Storage(e) => WebhookError::Database(e.to_string()),
            EntitlementError::Provider(e) => WebhookError::Provider(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ErrorCode;

    #[test]
    fn storage_failure_maps_to_retryable_webhook_error() {
        let err: WebhookError =
            EntitlementError::from(DomainError::new(ErrorCode::DatabaseError, "down")).into();
        assert!(matches!(err, WebhookError::Database(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn provider_failure_maps_to_retryable_webhook_error() {
        let err: WebhookError = EntitlementError::from(ProviderError::network("reset")).into();
        assert!(matches!(err, WebhookError::Provider(_)));
        assert!(err.is_retryable());
    }
}
