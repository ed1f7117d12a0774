//! Webhook error types.
//!
//! Every rejection before the ledger claim maps to 400 so the provider stops
//! redelivering garbage. Infrastructure failures map to 500 so it redelivers.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that occur during webhook processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// No signature header on the request.
    #[error("Missing signature header")]
    MissingSignature,

    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Webhook timestamp is older than the tolerance window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Event timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Failed to parse webhook payload or signature header.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The idempotency ledger could not be reached.
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// A provider fetch failed transiently.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// The pipeline did not finish inside the configured budget.
    #[error("Processing timed out after {0}s")]
    Timeout(u64),
}

impl WebhookError {
    /// Returns true if the provider should redeliver this webhook.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Ledger(_)
                | WebhookError::Provider(_)
                | WebhookError::Database(_)
                | WebhookError::Timeout(_)
        )
    }

    /// Maps the error to an HTTP status code.
    ///
    /// - 4xx: rejected before processing, no redelivery expected
    /// - 5xx: transient failure, provider will redeliver
    pub fn status_code(&self) -> StatusCode {
        if self.is_retryable() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::BAD_REQUEST
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ══════════════════════════════════════════════════════════════
    // Error Display Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn parse_error_displays_message() {
        let err = WebhookError::ParseError("invalid JSON".to_string());
        assert_eq!(format!("{}", err), "Parse error: invalid JSON");
    }

    #[test]
    fn timeout_displays_budget() {
        let err = WebhookError::Timeout(20);
        assert_eq!(format!("{}", err), "Processing timed out after 20s");
    }

    // ══════════════════════════════════════════════════════════════
    // Status Code Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn verification_failures_return_bad_request() {
        for err in [
            WebhookError::MissingSignature,
            WebhookError::InvalidSignature,
            WebhookError::TimestampOutOfRange,
            WebhookError::InvalidTimestamp,
            WebhookError::ParseError("x".to_string()),
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn infrastructure_failures_return_internal_error() {
        for err in [
            WebhookError::Ledger("down".to_string()),
            WebhookError::Provider("503".to_string()),
            WebhookError::Database("pool timeout".to_string()),
            WebhookError::Timeout(20),
        ] {
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
            assert!(err.is_retryable());
        }
    }
}
