//! Billing domain - events, subscriptions and entitlement rules.
//!
//! Everything here is free of I/O. Fetching, persistence and claims sync
//! happen behind ports driven by the application handlers.

mod entitlement;
mod event;
mod identity;
mod plan_catalog;
mod subscription;
mod webhook_errors;
mod webhook_verifier;

pub use entitlement::{
    compute, revoked_for_absence, EntitlementRecord, EntitlementTrigger, STATUS_NONE,
};
pub use event::{BillingEvent, BillingEventKind, EnvelopeData, WebhookEnvelope, UID_METADATA_KEY};
pub use identity::{candidate_uid, resolve_local, IdentityHints, IdentitySource};
pub use plan_catalog::{PlanCatalog, PlanId};
pub use subscription::{SubscriptionSnapshot, SubscriptionStatus};
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{sign_payload, SignatureHeader, WebhookVerifier};
