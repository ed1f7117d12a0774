//! Entitlement calculation.
//!
//! `compute` is the only place that decides whether a user is entitled. It is
//! pure and total: every input produces a record, and anything missing or
//! unrecognized produces a not-entitled one.

use serde::{Deserialize, Serialize};

use super::event::BillingEventKind;
use super::plan_catalog::{PlanCatalog, PlanId};
use super::subscription::SubscriptionSnapshot;
use crate::domain::foundation::{SubscriptionId, SweepRunId, Timestamp, UserId};

/// Status written when the provider reports no subscription at all.
pub const STATUS_NONE: &str = "none";

/// What caused an entitlement computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitlementTrigger {
    /// A verified webhook event.
    Event {
        event_id: String,
        kind: BillingEventKind,
    },
    /// A scheduled sweep or a manual reconcile.
    Sweep { run_id: SweepRunId },
}

impl EntitlementTrigger {
    /// Whether the trigger revokes access regardless of subscription status.
    pub fn is_force_inactive(&self) -> bool {
        match self {
            EntitlementTrigger::Event { kind, .. } => kind.is_force_inactive(),
            EntitlementTrigger::Sweep { .. } => false,
        }
    }

    /// Identifier recorded as `last_processed_event_id`.
    pub fn source_id(&self) -> String {
        match self {
            EntitlementTrigger::Event { event_id, .. } => event_id.clone(),
            EntitlementTrigger::Sweep { run_id } => format!("sweep:{}", run_id),
        }
    }
}

/// Current-state entitlement projection for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementRecord {
    pub uid: UserId,
    pub is_pro: bool,
    pub status: String,
    pub plan_id: Option<PlanId>,
    pub subscription_id: Option<SubscriptionId>,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    pub last_processed_event_id: String,
    pub last_processed_at: Timestamp,
}

impl EntitlementRecord {
    /// True when both records carry the same entitlement fact.
    ///
    /// Ignores the processing timestamp and trigger id.
    pub fn same_fact(&self, other: &EntitlementRecord) -> bool {
        self.uid == other.uid
            && self.is_pro == other.is_pro
            && self.status == other.status
            && self.plan_id == other.plan_id
            && self.subscription_id == other.subscription_id
            && self.current_period_end == other.current_period_end
            && self.cancel_at_period_end == other.cancel_at_period_end
    }
}

/// Derives the entitlement for `uid` from a subscription snapshot.
///
/// Entitled iff the status permits access, the plan is allow-listed, and the
/// trigger is not a refund or dispute. `status` always echoes the snapshot.
pub fn compute(
    uid: &UserId,
    snapshot: &SubscriptionSnapshot,
    trigger: &EntitlementTrigger,
    catalog: &PlanCatalog,
    processed_at: Timestamp,
) -> EntitlementRecord {
    let plan_id = snapshot
        .plan_id
        .as_deref()
        .and_then(|raw| catalog.recognize(raw));

    let is_pro =
        snapshot.status.permits_access() && plan_id.is_some() && !trigger.is_force_inactive();

    EntitlementRecord {
        uid: uid.clone(),
        is_pro,
        status: snapshot.status.as_str().to_string(),
        plan_id,
        subscription_id: Some(snapshot.subscription_id.clone()),
        current_period_end: snapshot.current_period_end,
        cancel_at_period_end: snapshot.cancel_at_period_end,
        last_processed_event_id: trigger.source_id(),
        last_processed_at: processed_at,
    }
}

/// Record for a user whose customers have no subscriptions left.
pub fn revoked_for_absence(
    uid: &UserId,
    trigger: &EntitlementTrigger,
    processed_at: Timestamp,
) -> EntitlementRecord {
    EntitlementRecord {
        uid: uid.clone(),
        is_pro: false,
        status: STATUS_NONE.to_string(),
        plan_id: None,
        subscription_id: None,
        current_period_end: None,
        cancel_at_period_end: false,
        last_processed_event_id: trigger.source_id(),
        last_processed_at: processed_at,
    }
}
