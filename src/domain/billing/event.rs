//! Billing provider events.
//!
//! `WebhookEnvelope` is the wire shape of a delivered notification. It is
//! converted into a `BillingEvent` whose `kind` is a closed enum so that the
//! router's dispatch is checked exhaustively at compile time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::webhook_errors::WebhookError;
use crate::domain::foundation::Timestamp;

/// Metadata key under which the internal uid is stored on provider objects.
pub const UID_METADATA_KEY: &str = "uid";

/// Raw event envelope as delivered by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    /// Unique event identifier (evt_xxx).
    pub id: String,

    /// Event type string (e.g., "customer.subscription.updated").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp when the event was created.
    pub created: i64,

    /// Event data containing the affected object.
    pub data: EnvelopeData,

    /// Whether this is a live mode event (vs test mode).
    #[serde(default)]
    pub livemode: bool,

    /// API version used to render the event.
    #[serde(default)]
    pub api_version: Option<String>,
}

/// Container for the object carried by an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeData {
    /// The provider object (subscription, invoice, session, charge, dispute).
    pub object: Value,

    /// Previous values for changed attributes (update events only).
    #[serde(default)]
    pub previous_attributes: Option<Value>,
}

/// Event kinds the engine distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BillingEventKind {
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    CheckoutSessionCompleted,
    InvoicePaid,
    InvoicePaymentSucceeded,
    InvoicePaymentFailed,
    ChargeRefunded,
    ChargeDisputeCreated,
    /// Any type the engine does not act on. Acknowledged as a no-op.
    Unhandled(String),
}

impl BillingEventKind {
    /// Maps a provider type string to a kind. Never fails.
    pub fn parse(event_type: &str) -> Self {
        match event_type {
            "customer.subscription.created" => Self::SubscriptionCreated,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "invoice.paid" => Self::InvoicePaid,
            "invoice.payment_succeeded" => Self::InvoicePaymentSucceeded,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            "charge.refunded" => Self::ChargeRefunded,
            "charge.dispute.created" => Self::ChargeDisputeCreated,
            other => Self::Unhandled(other.to_string()),
        }
    }

    /// Returns the provider type string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::SubscriptionCreated => "customer.subscription.created",
            Self::SubscriptionUpdated => "customer.subscription.updated",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::CheckoutSessionCompleted => "checkout.session.completed",
            Self::InvoicePaid => "invoice.paid",
            Self::InvoicePaymentSucceeded => "invoice.payment_succeeded",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::ChargeRefunded => "charge.refunded",
            Self::ChargeDisputeCreated => "charge.dispute.created",
            Self::Unhandled(other) => other,
        }
    }

    /// Refunds and disputes revoke access whatever the subscription says.
    pub fn is_force_inactive(&self) -> bool {
        matches!(self, Self::ChargeRefunded | Self::ChargeDisputeCreated)
    }
}

impl std::fmt::Display for BillingEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verified, immutable event received from the billing provider.
#[derive(Debug, Clone)]
pub struct BillingEvent {
    pub id: String,
    pub kind: BillingEventKind,
    pub occurred_at: Timestamp,
    pub livemode: bool,
    /// The raw `data.object`. May be a partial or stale copy.
    pub payload: Value,
}

impl BillingEvent {
    /// Builds an event from a parsed envelope.
    ///
    /// # Errors
    ///
    /// `ParseError` when the id is blank or the timestamp is unrepresentable.
    pub fn from_envelope(envelope: WebhookEnvelope) -> Result<Self, WebhookError> {
        if envelope.id.trim().is_empty() {
            return Err(WebhookError::ParseError("event id is empty".to_string()));
        }
        let occurred_at = Timestamp::from_unix_secs(envelope.created)
            .ok_or_else(|| WebhookError::ParseError("invalid created timestamp".to_string()))?;

        Ok(Self {
            id: envelope.id,
            kind: BillingEventKind::parse(&envelope.event_type),
            occurred_at,
            livemode: envelope.livemode,
            payload: envelope.data.object,
        })
    }

    /// Returns the `id` of the carried object.
    pub fn object_id(&self) -> Option<&str> {
        self.object_str("id")
    }

    /// Returns a string field of the carried object.
    ///
    /// Expanded objects (`{"id": ...}`) are collapsed to their id.
    pub fn object_str(&self, field: &str) -> Option<&str> {
        match self.payload.get(field)? {
            Value::String(s) if !s.is_empty() => Some(s.as_str()),
            Value::Object(obj) => obj.get("id").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Returns the `uid` metadata of the carried object, if present.
    pub fn metadata_uid(&self) -> Option<&str> {
        self.payload
            .get("metadata")?
            .get(UID_METADATA_KEY)?
            .as_str()
            .filter(|s| !s.trim().is_empty())
    }
}
