//! JSON bodies for the billing endpoints.

use serde::{Deserialize, Serialize};

use crate::application::handlers::billing::{
    ReconcileOutcome, RelinkCustomerResult, WebhookOutcome,
};
use crate::domain::billing::EntitlementRecord;
use crate::domain::foundation::{CustomerId, UserId};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct RelinkCustomerRequest {
    pub uid: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Acknowledgement for a webhook delivery the provider should not retry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAckResponse {
    pub received: bool,
    /// `applied`, `duplicate` or `ignored`.
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_pro: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<WebhookOutcome> for WebhookAckResponse {
    fn from(outcome: WebhookOutcome) -> Self {
        let ack = Self {
            received: true,
            outcome: "ignored",
            uid: None,
            is_pro: None,
            reason: None,
        };
        match outcome {
            WebhookOutcome::Duplicate => Self {
                outcome: "duplicate",
                ..ack
            },
            WebhookOutcome::Applied { uid, is_pro, .. } => Self {
                outcome: "applied",
                uid: Some(uid.to_string()),
                is_pro: Some(is_pro),
                ..ack
            },
            WebhookOutcome::Ignored { reason } => Self {
                reason: Some(reason),
                ..ack
            },
        }
    }
}

/// Result of a callable reconcile.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub uid: String,
    /// False when no billing customer is linked to the uid.
    pub linked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entitlement: Option<EntitlementRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims_synced: Option<bool>,
}

impl ReconcileResponse {
    pub fn new(uid: &UserId, outcome: ReconcileOutcome) -> Self {
        match outcome {
            ReconcileOutcome::Reconciled {
                record,
                claims_synced,
            } => Self {
                uid: uid.to_string(),
                linked: true,
                entitlement: Some(record),
                claims_synced: Some(claims_synced),
            },
            ReconcileOutcome::NotLinked => Self {
                uid: uid.to_string(),
                linked: false,
                entitlement: None,
                claims_synced: None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelinkCustomerResponse {
    pub customer_id: String,
    pub uid: String,
    pub previous_uid: Option<String>,
    pub is_pro: bool,
    pub previous_is_pro: Option<bool>,
}

impl RelinkCustomerResponse {
    pub fn new(customer_id: &CustomerId, uid: &UserId, result: RelinkCustomerResult) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            uid: uid.to_string(),
            previous_uid: result.previous_uid.map(|u| u.to_string()),
            is_pro: result.is_pro,
            previous_is_pro: result.previous_is_pro,
        }
    }
}

/// Error body shared by the billing endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}
