//! Stripe API objects as they arrive over the wire.
//!
//! These types parse the subset of Stripe JSON the entitlement engine reads
//! and convert it into provider-neutral snapshots and refs. Related objects
//! may be a bare id or an expanded object; both shapes are accepted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::billing::{SubscriptionSnapshot, SubscriptionStatus, UID_METADATA_KEY};
use crate::domain::foundation::{CustomerId, SubscriptionId, Timestamp};
use crate::ports::{ChargeRef, CheckoutSessionRef, CustomerRef, InvoiceRef};

// ════════════════════════════════════════════════════════════════════════════════
// Expandable References
// ════════════════════════════════════════════════════════════════════════════════

/// A related object: either `"cus_123"` or `{"id": "cus_123", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expandable {
    Id(String),
    Object(ExpandedObject),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandedObject {
    pub id: String,
}

impl Expandable {
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Object(obj) => &obj.id,
        }
    }
}

fn expandable_id(value: Option<&Expandable>) -> Option<&str> {
    value.map(Expandable::id).filter(|id| !id.trim().is_empty())
}

fn uid_from(metadata: &HashMap<String, String>) -> Option<String> {
    metadata
        .get(UID_METADATA_KEY)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Stripe list envelope (`{"object": "list", "data": [...]}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

impl<T> Default for StripeList<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            has_more: false,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Subscription
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: Expandable,
    pub status: String,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    /// Older API versions carry the period on the subscription itself.
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: StripeList<StripeSubscriptionItem>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeSubscriptionItem {
    #[serde(default)]
    pub price: Option<StripePrice>,
    /// Newer API versions move the period onto each item.
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripePrice {
    pub id: String,
}

impl StripeSubscription {
    /// Converts to a snapshot. `None` when an id is blank.
    pub fn into_snapshot(self) -> Option<SubscriptionSnapshot> {
        let customer_id = CustomerId::new(self.customer.id()).ok()?;
        let subscription_id = SubscriptionId::new(self.id).ok()?;

        let first_item = self.items.data.first();
        let plan_id = first_item
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.clone());
        let period_end = self.current_period_end.or_else(|| {
            self.items
                .data
                .iter()
                .filter_map(|item| item.current_period_end)
                .max()
        });

        Some(SubscriptionSnapshot {
            subscription_id,
            customer_id,
            status: SubscriptionStatus::parse(&self.status),
            plan_id,
            current_period_end: period_end.and_then(Timestamp::from_unix_secs),
            cancel_at_period_end: self.cancel_at_period_end,
            metadata_uid: uid_from(&self.metadata),
        })
    }
}

/// Decodes an inline subscription object from a webhook payload.
pub fn decode_subscription(object: &Value) -> Option<SubscriptionSnapshot> {
    serde_json::from_value::<StripeSubscription>(object.clone())
        .ok()?
        .into_snapshot()
}

// ════════════════════════════════════════════════════════════════════════════════
// Invoice, Charge, Checkout Session, Customer
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    #[serde(default)]
    pub customer: Option<Expandable>,
    #[serde(default)]
    pub subscription: Option<Expandable>,
    /// Newer API versions nest the subscription under `parent`.
    #[serde(default)]
    pub parent: Option<StripeInvoiceParent>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeInvoiceParent {
    #[serde(default)]
    pub subscription_details: Option<StripeSubscriptionDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeSubscriptionDetails {
    #[serde(default)]
    pub subscription: Option<Expandable>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl From<StripeInvoice> for InvoiceRef {
    fn from(invoice: StripeInvoice) -> Self {
        let details = invoice
            .parent
            .as_ref()
            .and_then(|p| p.subscription_details.as_ref());
        let subscription = expandable_id(invoice.subscription.as_ref())
            .or_else(|| details.and_then(|d| expandable_id(d.subscription.as_ref())));
        let metadata_uid =
            uid_from(&invoice.metadata).or_else(|| details.and_then(|d| uid_from(&d.metadata)));

        InvoiceRef {
            subscription_id: subscription.and_then(|id| SubscriptionId::new(id).ok()),
            customer_id: expandable_id(invoice.customer.as_ref())
                .and_then(|id| CustomerId::new(id).ok()),
            metadata_uid,
            id: invoice.id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeCharge {
    pub id: String,
    #[serde(default)]
    pub customer: Option<Expandable>,
    #[serde(default)]
    pub invoice: Option<Expandable>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl From<StripeCharge> for ChargeRef {
    fn from(charge: StripeCharge) -> Self {
        ChargeRef {
            invoice_id: expandable_id(charge.invoice.as_ref()).map(str::to_string),
            customer_id: expandable_id(charge.customer.as_ref())
                .and_then(|id| CustomerId::new(id).ok()),
            metadata_uid: uid_from(&charge.metadata),
            id: charge.id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    #[serde(default)]
    pub customer: Option<Expandable>,
    #[serde(default)]
    pub subscription: Option<Expandable>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl From<StripeCheckoutSession> for CheckoutSessionRef {
    fn from(session: StripeCheckoutSession) -> Self {
        CheckoutSessionRef {
            subscription_id: expandable_id(session.subscription.as_ref())
                .and_then(|id| SubscriptionId::new(id).ok()),
            customer_id: expandable_id(session.customer.as_ref())
                .and_then(|id| CustomerId::new(id).ok()),
            client_reference_id: session
                .client_reference_id
                .filter(|v| !v.trim().is_empty()),
            metadata_uid: uid_from(&session.metadata),
            id: session.id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl StripeCustomer {
    /// `None` for deleted customers.
    pub fn into_ref(self) -> Option<CustomerRef> {
        if self.deleted {
            return None;
        }
        Some(CustomerRef {
            metadata_uid: uid_from(&self.metadata),
            id: CustomerId::new(self.id).ok()?,
        })
    }
}
