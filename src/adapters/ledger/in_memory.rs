//! In-memory idempotency ledger for testing.
//!
//! # Security Note
//!
//! This adapter is for **testing only**. Markers live in process memory, so
//! two instances never see each other's claims. It uses `.expect()` on lock
//! operations which will panic if locks are poisoned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::{ClaimResult, IdempotencyLedger, IdempotencyMarker, ProcessingOutcome};

#[derive(Debug, Clone)]
struct Entry {
    marker: IdempotencyMarker,
    outcome: Option<ProcessingOutcome>,
}

/// In-memory ledger with a switch to simulate a storage outage.
pub struct InMemoryIdempotencyLedger {
    entries: RwLock<HashMap<String, Entry>>,
    unavailable: AtomicBool,
}

impl InMemoryIdempotencyLedger {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    // === Test Helpers ===

    /// Makes every call fail with a database error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn marker_count(&self) -> usize {
        self.entries
            .read()
            .expect("InMemoryIdempotencyLedger: lock poisoned")
            .len()
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.entries
            .read()
            .expect("InMemoryIdempotencyLedger: lock poisoned")
            .contains_key(event_id)
    }

    /// The recorded outcome label (`applied`, `ignored`, `failed`).
    pub fn outcome(&self, event_id: &str) -> Option<String> {
        self.entries
            .read()
            .expect("InMemoryIdempotencyLedger: lock poisoned")
            .get(event_id)
            .and_then(|e| e.outcome.as_ref())
            .map(|o| o.as_str().to_string())
    }

    fn check_available(&self) -> Result<(), DomainError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                "Idempotency ledger unavailable",
            ));
        }
        Ok(())
    }
}

impl Default for InMemoryIdempotencyLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdempotencyLedger for InMemoryIdempotencyLedger {
    async fn claim(&self, marker: &IdempotencyMarker) -> Result<ClaimResult, DomainError> {
        self.check_available()?;
        let mut entries = self
            .entries
            .write()
            .expect("InMemoryIdempotencyLedger: lock poisoned");

        if entries.contains_key(&marker.event_id) {
            return Ok(ClaimResult::AlreadyProcessed);
        }
        entries.insert(
            marker.event_id.clone(),
            Entry {
                marker: marker.clone(),
                outcome: None,
            },
        );
        Ok(ClaimResult::Acquired)
    }

    async fn record_outcome(
        &self,
        event_id: &str,
        outcome: &ProcessingOutcome,
    ) -> Result<(), DomainError> {
        self.check_available()?;
        let mut entries = self
            .entries
            .write()
            .expect("InMemoryIdempotencyLedger: lock poisoned");

        if let Some(entry) = entries.get_mut(event_id) {
            entry.outcome = Some(outcome.clone());
        }
        Ok(())
    }

    async fn prune_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        self.check_available()?;
        let mut entries = self
            .entries
            .write()
            .expect("InMemoryIdempotencyLedger: lock poisoned");

        let before = entries.len();
        entries.retain(|_, e| !e.marker.claimed_at.is_before(&cutoff));
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn marker(id: &str) -> IdempotencyMarker {
        IdempotencyMarker {
            event_id: id.to_string(),
            event_type: "invoice.paid".to_string(),
            occurred_at: Timestamp::now(),
            claimed_at: Timestamp::now(),
        }
    }

    #[tokio::test]
    async fn second_claim_is_already_processed() {
        let ledger = InMemoryIdempotencyLedger::new();

        assert_eq!(ledger.claim(&marker("evt_1")).await.unwrap(), ClaimResult::Acquired);
        assert_eq!(
            ledger.claim(&marker("evt_1")).await.unwrap(),
            ClaimResult::AlreadyProcessed
        );
    }

    #[tokio::test]
    async fn concurrent_claims_acquire_exactly_once() {
        let ledger = Arc::new(InMemoryIdempotencyLedger::new());

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.claim(&marker("evt_race")).await.unwrap() })
            })
            .collect();

        let mut acquired = 0;
        for task in tasks {
            if task.await.unwrap() == ClaimResult::Acquired {
                acquired += 1;
            }
        }
        assert_eq!(acquired, 1);
    }

    #[tokio::test]
    async fn unavailable_ledger_leaves_no_marker() {
        let ledger = InMemoryIdempotencyLedger::new();
        ledger.set_unavailable(true);

        assert!(ledger.claim(&marker("evt_1")).await.is_err());

        ledger.set_unavailable(false);
        assert_eq!(ledger.marker_count(), 0);
    }

    #[tokio::test]
    async fn prune_removes_only_old_markers() {
        let ledger = InMemoryIdempotencyLedger::new();
        let mut old = marker("evt_old");
        old.claimed_at = Timestamp::now().minus_days(120);
        ledger.claim(&old).await.unwrap();
        ledger.claim(&marker("evt_new")).await.unwrap();

        let pruned = ledger
            .prune_before(Timestamp::now().minus_days(90))
            .await
            .unwrap();

        assert_eq!(pruned, 1);
        assert!(ledger.contains("evt_new"));
        assert!(!ledger.contains("evt_old"));
    }

    #[tokio::test]
    async fn outcome_is_recorded_on_claimed_marker() {
        let ledger = InMemoryIdempotencyLedger::new();
        ledger.claim(&marker("evt_1")).await.unwrap();

        ledger
            .record_outcome(
                "evt_1",
                &ProcessingOutcome::Ignored {
                    reason: "no subscription".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(ledger.outcome("evt_1").as_deref(), Some("ignored"));
    }
}
