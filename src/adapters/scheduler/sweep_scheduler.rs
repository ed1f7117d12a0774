//! SweepScheduler - periodic reconciliation in the background.
//!
//! Each tick reconciles one batch of the customer-link index, starting where
//! the previous tick stopped. When a tick exhausts the index the cursor wraps
//! to the start and ledger markers past retention are pruned.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `interval` | 15min | Time between sweep batches |
//! | `ledger_retention_days` | 90 | Age at which ledger markers are pruned |
//!
//! ## Graceful Shutdown
//!
//! The loop stops on the shutdown signal. A batch in progress is finished
//! first; no final batch is started.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::{self, MissedTickBehavior};

use crate::application::handlers::billing::{
    EntitlementError, ReconcileEntitlementsHandler, SweepReport,
};
use crate::domain::foundation::{CustomerId, Timestamp};
use crate::ports::IdempotencyLedger;

#[derive(Debug, Clone)]
pub struct SweepSchedulerConfig {
    pub interval: Duration,
    pub ledger_retention_days: u32,
}

impl Default for SweepSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            ledger_retention_days: 90,
        }
    }
}

pub struct SweepScheduler {
    reconciler: Arc<ReconcileEntitlementsHandler>,
    ledger: Arc<dyn IdempotencyLedger>,
    config: SweepSchedulerConfig,
    cursor: Mutex<Option<CustomerId>>,
}

impl SweepScheduler {
    pub fn new(
        reconciler: Arc<ReconcileEntitlementsHandler>,
        ledger: Arc<dyn IdempotencyLedger>,
        config: SweepSchedulerConfig,
    ) -> Self {
        Self {
            reconciler,
            ledger,
            config,
            cursor: Mutex::new(None),
        }
    }

    /// Runs until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            retention_days = self.config.ledger_retention_days,
            "Sweep scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Sweep scheduler stopping");
                        return;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "Reconciliation sweep failed");
                    }
                }
            }
        }
    }

    /// Runs one batch and advances the cursor.
    ///
    /// A failed batch leaves the cursor where it was.
    pub async fn tick(&self) -> Result<SweepReport, EntitlementError> {
        let mut cursor = self.cursor.lock().await;
        let report = self.reconciler.run_sweep(cursor.as_ref()).await?;
        *cursor = report.next_cursor.clone();

        if cursor.is_none() {
            self.prune_ledger().await;
        }
        Ok(report)
    }

    /// The cursor the next tick starts after.
    pub async fn cursor(&self) -> Option<CustomerId> {
        self.cursor.lock().await.clone()
    }

    async fn prune_ledger(&self) {
        let cutoff = Timestamp::now().minus_days(i64::from(self.config.ledger_retention_days));
        match self.ledger.prune_before(cutoff).await {
            Ok(0) => {}
            Ok(pruned) => tracing::info!(pruned, "Pruned expired ledger markers"),
            Err(e) => tracing::warn!(error = %e, "Ledger prune failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::claims::RecordingClaimsSync;
    use crate::adapters::ledger::InMemoryIdempotencyLedger;
    use crate::adapters::memory::{InMemoryCustomerLinkRepository, InMemoryEntitlementStore};
    use crate::adapters::stripe::MockBillingProvider;
    use crate::application::handlers::billing::{StatePersister, SweepConfig};
    use crate::domain::billing::PlanCatalog;
    use crate::domain::foundation::UserId;
    use crate::ports::{ClaimResult, CustomerLink, CustomerLinkRepository, IdempotencyMarker};

    struct Fixture {
        links: Arc<InMemoryCustomerLinkRepository>,
        ledger: Arc<InMemoryIdempotencyLedger>,
        scheduler: SweepScheduler,
    }

    fn fixture(batch_size: usize) -> Fixture {
        let links = Arc::new(InMemoryCustomerLinkRepository::new());
        let ledger = Arc::new(InMemoryIdempotencyLedger::new());
        let reconciler = ReconcileEntitlementsHandler::new(
            Arc::new(MockBillingProvider::new()),
            links.clone(),
            StatePersister::new(
                Arc::new(InMemoryEntitlementStore::new()),
                Arc::new(RecordingClaimsSync::new()),
            ),
            Arc::new(PlanCatalog::new(["pro_monthly"])),
            SweepConfig {
                batch_size,
                concurrency: 2,
            },
        );
        let scheduler = SweepScheduler::new(
            Arc::new(reconciler),
            ledger.clone(),
            SweepSchedulerConfig {
                interval: Duration::from_millis(10),
                ledger_retention_days: 30,
            },
        );
        Fixture {
            links,
            ledger,
            scheduler,
        }
    }

    async fn link(f: &Fixture, customer: &str, uid: &str) {
        f.links
            .link_if_absent(&CustomerLink::new(
                CustomerId::new(customer).unwrap(),
                UserId::new(uid).unwrap(),
            ))
            .await
            .unwrap();
    }

    fn marker(event_id: &str, age_days: i64) -> IdempotencyMarker {
        let at = Timestamp::now().minus_days(age_days);
        IdempotencyMarker {
            event_id: event_id.to_string(),
            event_type: "customer.subscription.updated".to_string(),
            occurred_at: at,
            claimed_at: at,
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Cursor rotation
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn cursor_advances_then_wraps() {
        let f = fixture(2);
        link(&f, "cus_a", "user-a").await;
        link(&f, "cus_b", "user-b").await;
        link(&f, "cus_c", "user-c").await;

        let first = f.scheduler.tick().await.unwrap();
        assert_eq!(first.reconciled, 2);
        assert_eq!(f.scheduler.cursor().await.unwrap().as_str(), "cus_b");

        let second = f.scheduler.tick().await.unwrap();
        assert_eq!(second.reconciled, 1);
        assert!(f.scheduler.cursor().await.is_none());
    }

    // ══════════════════════════════════════════════════════════════
    // Ledger retention
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn wrap_prunes_expired_markers_only() {
        let f = fixture(10);
        assert_eq!(
            f.ledger.claim(&marker("evt_old", 45)).await.unwrap(),
            ClaimResult::Acquired
        );
        assert_eq!(
            f.ledger.claim(&marker("evt_new", 1)).await.unwrap(),
            ClaimResult::Acquired
        );

        f.scheduler.tick().await.unwrap();

        assert!(!f.ledger.contains("evt_old"));
        assert!(f.ledger.contains("evt_new"));
    }

    #[tokio::test]
    async fn mid_index_tick_does_not_prune() {
        let f = fixture(1);
        link(&f, "cus_a", "user-a").await;
        link(&f, "cus_b", "user-b").await;
        f.ledger.claim(&marker("evt_old", 45)).await.unwrap();

        f.scheduler.tick().await.unwrap();

        assert!(f.ledger.contains("evt_old"));
    }

    // ══════════════════════════════════════════════════════════════
    // Run loop
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let f = fixture(10);
        let (tx, rx) = watch::channel(false);
        let scheduler = Arc::new(f.scheduler);

        let handle = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run(rx).await }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler should stop")
            .unwrap();
    }
}
