//! Idempotency ledger port - the exactly-once gate for webhook events.
//!
//! A marker's existence means "this event was claimed". Creation is atomic
//! and exclusive: of any number of concurrent claims for one event id,
//! exactly one observes `Acquired`.

use async_trait::async_trait;

use crate::domain::billing::BillingEvent;
use crate::domain::foundation::{DomainError, Timestamp};

/// Marker written when an event is claimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyMarker {
    pub event_id: String,
    pub event_type: String,
    pub occurred_at: Timestamp,
    pub claimed_at: Timestamp,
}

impl IdempotencyMarker {
    /// Builds the marker for an event claimed now.
    pub fn for_event(event: &BillingEvent) -> Self {
        Self {
            event_id: event.id.clone(),
            event_type: event.kind.as_str().to_string(),
            occurred_at: event.occurred_at,
            claimed_at: Timestamp::now(),
        }
    }
}

/// Result of an atomic claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimResult {
    /// The caller owns processing this event.
    Acquired,
    /// Another delivery already claimed it. Skip and acknowledge.
    AlreadyProcessed,
}

/// Audit outcome attached to a claimed marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    Applied,
    Ignored { reason: String },
    Failed { reason: String },
}

impl ProcessingOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingOutcome::Applied => "applied",
            ProcessingOutcome::Ignored { .. } => "ignored",
            ProcessingOutcome::Failed { .. } => "failed",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ProcessingOutcome::Applied => None,
            ProcessingOutcome::Ignored { reason } | ProcessingOutcome::Failed { reason } => {
                Some(reason)
            }
        }
    }
}

/// Durable, shared idempotency ledger keyed by event id.
///
/// # Contract
///
/// - `claim` must be a single atomic create-if-absent. A storage failure
///   returns `Err` and leaves no marker behind.
/// - `record_outcome` is an audit annotation; callers treat failure as
///   non-fatal.
/// - Markers are never deleted except by `prune_before`.
#[async_trait]
pub trait IdempotencyLedger: Send + Sync {
    /// Atomically claims an event id.
    async fn claim(&self, marker: &IdempotencyMarker) -> Result<ClaimResult, DomainError>;

    /// Annotates a claimed marker with its processing outcome.
    async fn record_outcome(
        &self,
        event_id: &str,
        outcome: &ProcessingOutcome,
    ) -> Result<(), DomainError>;

    /// Deletes markers claimed before `cutoff`. Returns how many were removed.
    async fn prune_before(&self, cutoff: Timestamp) -> Result<u64, DomainError>;
}
