//! ReconcileEntitlementsHandler - re-derives entitlement from provider state.
//!
//! The sweep walks the customer-link index in batches and recomputes each
//! linked user straight from the provider's subscriptions, bypassing the
//! event router. `reconcile_user` runs the same logic for one user.
//!
//! A user is reconciled across all of their linked customers at once, so a
//! user with one lapsed and one active customer is never revoked. A user
//! still marked entitled with no link left is revoked.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::domain::billing::{
    compute, revoked_for_absence, EntitlementRecord, EntitlementTrigger, PlanCatalog,
    SubscriptionSnapshot,
};
use crate::domain::foundation::{CustomerId, SweepRunId, Timestamp, UserId};
use crate::ports::{BillingProvider, CustomerLink, CustomerLinkRepository};

use super::errors::EntitlementError;
use super::state_persister::StatePersister;

/// Sweep settings.
#[derive(Debug, Clone, Copy)]
pub struct SweepConfig {
    /// Links read per run.
    pub batch_size: usize,
    /// Users reconciled concurrently.
    pub concurrency: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            concurrency: 4,
        }
    }
}

/// One user that could not be reconciled.
#[derive(Debug, Clone)]
pub struct SweepFailure {
    pub uid: UserId,
    pub customer_id: CustomerId,
    pub error: String,
}

/// Summary of one sweep run.
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub run_id: SweepRunId,
    /// Users reconciled successfully.
    pub reconciled: usize,
    pub entitled: usize,
    pub not_entitled: usize,
    /// Users with no subscription anywhere, revoked by absence.
    pub revoked_for_absence: usize,
    /// Successful writes whose claims mirror failed.
    pub claims_lagging: usize,
    pub failures: Vec<SweepFailure>,
    /// Where the next run should start. `None` when the index was exhausted.
    pub next_cursor: Option<CustomerId>,
}

impl SweepReport {
    fn new(run_id: SweepRunId) -> Self {
        Self {
            run_id,
            reconciled: 0,
            entitled: 0,
            not_entitled: 0,
            revoked_for_absence: 0,
            claims_lagging: 0,
            failures: Vec::new(),
            next_cursor: None,
        }
    }
}

/// Result of reconciling one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Reconciled {
        record: EntitlementRecord,
        claims_synced: bool,
    },
    /// No billing customer is linked to the user and no entitlement was
    /// held. Nothing was written.
    NotLinked,
}

pub struct ReconcileEntitlementsHandler {
    provider: Arc<dyn BillingProvider>,
    links: Arc<dyn CustomerLinkRepository>,
    persister: StatePersister,
    catalog: Arc<PlanCatalog>,
    config: SweepConfig,
}

impl ReconcileEntitlementsHandler {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        links: Arc<dyn CustomerLinkRepository>,
        persister: StatePersister,
        catalog: Arc<PlanCatalog>,
        config: SweepConfig,
    ) -> Self {
        Self {
            provider,
            links,
            persister,
            catalog,
            config,
        }
    }

    /// Reconciles one batch of linked users after `cursor`.
    ///
    /// Only a failure to read the link index is an error. Per-user failures
    /// are collected in the report and left for the next run.
    pub async fn run_sweep(
        &self,
        cursor: Option<&CustomerId>,
    ) -> Result<SweepReport, EntitlementError> {
        let run_id = SweepRunId::new();
        let batch = self.links.list_batch(cursor, self.config.batch_size).await?;
        let mut report = SweepReport::new(run_id);

        if batch.len() == self.config.batch_size {
            report.next_cursor = batch.last().map(|l| l.customer_id.clone());
        }

        // A uid with several customers in one batch is reconciled once.
        let mut seen = HashSet::new();
        let users: Vec<CustomerLink> = batch
            .into_iter()
            .filter(|link| seen.insert(link.uid.clone()))
            .collect();

        tracing::info!(run_id = %run_id, users = users.len(), cursor = ?cursor.map(CustomerId::as_str), "Reconciliation sweep started");

        let trigger = EntitlementTrigger::Sweep { run_id };
        let results: Vec<(CustomerLink, Result<ReconcileOutcome, EntitlementError>)> =
            stream::iter(users)
                .map(|link| {
                    let trigger = &trigger;
                    async move {
                        let result = self.reconcile_uid(&link.uid, trigger).await;
                        (link, result)
                    }
                })
                .buffer_unordered(self.config.concurrency.max(1))
                .collect()
                .await;

        for (link, result) in results {
            match result {
                Ok(ReconcileOutcome::Reconciled {
                    record,
                    claims_synced,
                }) => {
                    report.reconciled += 1;
                    if record.is_pro {
                        report.entitled += 1;
                    } else {
                        report.not_entitled += 1;
                    }
                    if record.subscription_id.is_none() {
                        report.revoked_for_absence += 1;
                    }
                    if !claims_synced {
                        report.claims_lagging += 1;
                    }
                }
                // The link was removed or relinked between list and lookup.
                Ok(ReconcileOutcome::NotLinked) => {}
                Err(e) => {
                    tracing::warn!(
                        run_id = %run_id,
                        uid = %link.uid,
                        customer_id = %link.customer_id,
                        error = %e,
                        "Reconciliation failed for user"
                    );
                    report.failures.push(SweepFailure {
                        uid: link.uid,
                        customer_id: link.customer_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            run_id = %run_id,
            reconciled = report.reconciled,
            entitled = report.entitled,
            not_entitled = report.not_entitled,
            revoked_for_absence = report.revoked_for_absence,
            failures = report.failures.len(),
            "Reconciliation sweep finished"
        );

        Ok(report)
    }

    /// Reconciles a single user on demand.
    pub async fn reconcile_user(&self, uid: &UserId) -> Result<ReconcileOutcome, EntitlementError> {
        let trigger = EntitlementTrigger::Sweep {
            run_id: SweepRunId::new(),
        };
        let outcome = self.reconcile_uid(uid, &trigger).await?;

        if let ReconcileOutcome::Reconciled { record, .. } = &outcome {
            tracing::info!(uid = %uid, is_pro = record.is_pro, status = %record.status, "User reconciled on demand");
        }
        Ok(outcome)
    }

    async fn reconcile_uid(
        &self,
        uid: &UserId,
        trigger: &EntitlementTrigger,
    ) -> Result<ReconcileOutcome, EntitlementError> {
        let links = self.links.find_by_uid(uid).await?;
        if links.is_empty() {
            return self.revoke_unlinked(uid, trigger).await;
        }

        let mut subscriptions = Vec::new();
        for link in &links {
            subscriptions.extend(
                self.provider
                    .list_customer_subscriptions(&link.customer_id)
                    .await?,
            );
        }

        let record = match SubscriptionSnapshot::latest(subscriptions) {
            Some(snapshot) => compute(uid, &snapshot, trigger, &self.catalog, Timestamp::now()),
            None => revoked_for_absence(uid, trigger, Timestamp::now()),
        };

        let report = self.persister.persist(&record).await?;
        Ok(ReconcileOutcome::Reconciled {
            record,
            claims_synced: report.claims_synced,
        })
    }

    /// A user who lost their last link keeps no entitlement.
    async fn revoke_unlinked(
        &self,
        uid: &UserId,
        trigger: &EntitlementTrigger,
    ) -> Result<ReconcileOutcome, EntitlementError> {
        match self.persister.current(uid).await? {
            Some(stored) if stored.is_pro => {
                tracing::warn!(uid = %uid, "Entitled user has no customer link, revoking");
                let record = revoked_for_absence(uid, trigger, Timestamp::now());
                let report = self.persister.persist(&record).await?;
                Ok(ReconcileOutcome::Reconciled {
                    record,
                    claims_synced: report.claims_synced,
                })
            }
            _ => Ok(ReconcileOutcome::NotLinked),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::claims::RecordingClaimsSync;
    use crate::adapters::memory::{InMemoryCustomerLinkRepository, InMemoryEntitlementStore};
    use crate::adapters::stripe::MockBillingProvider;
    use crate::domain::billing::{SubscriptionStatus, STATUS_NONE};
    use crate::domain::foundation::SubscriptionId;
    use crate::ports::{EntitlementStore, ProviderError};

    struct Fixture {
        provider: Arc<MockBillingProvider>,
        links: Arc<InMemoryCustomerLinkRepository>,
        store: Arc<InMemoryEntitlementStore>,
        handler: ReconcileEntitlementsHandler,
    }

    fn fixture(config: SweepConfig) -> Fixture {
        let provider = Arc::new(MockBillingProvider::new());
        let links = Arc::new(InMemoryCustomerLinkRepository::new());
        let store = Arc::new(InMemoryEntitlementStore::new());
        let handler = ReconcileEntitlementsHandler::new(
            provider.clone(),
            links.clone(),
            StatePersister::new(store.clone(), Arc::new(RecordingClaimsSync::new())),
            Arc::new(PlanCatalog::new(["pro_monthly"])),
            config,
        );
        Fixture {
            provider,
            links,
            store,
            handler,
        }
    }

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn cus(s: &str) -> CustomerId {
        CustomerId::new(s).unwrap()
    }

    async fn link(f: &Fixture, customer: &str, user: &str) {
        f.links
            .link_if_absent(&CustomerLink::new(cus(customer), uid(user)))
            .await
            .unwrap();
    }

    fn sub(id: &str, customer: &str, status: SubscriptionStatus, period_end: i64) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            subscription_id: SubscriptionId::new(id).unwrap(),
            customer_id: cus(customer),
            status,
            plan_id: Some("pro_monthly".to_string()),
            current_period_end: Timestamp::from_unix_secs(period_end),
            cancel_at_period_end: false,
            metadata_uid: None,
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Sweep
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn zero_subscriptions_revokes_prior_entitlement() {
        let f = fixture(SweepConfig::default());
        link(&f, "cus_1", "user-1").await;
        f.provider
            .add_subscription(sub("sub_1", "cus_1", SubscriptionStatus::Active, 2_000));
        f.handler.reconcile_user(&uid("user-1")).await.unwrap();
        assert!(f.store.get(&uid("user-1")).await.unwrap().unwrap().is_pro);

        f.provider.remove_subscription("sub_1");
        let report = f.handler.run_sweep(None).await.unwrap();

        let stored = f.store.get(&uid("user-1")).await.unwrap().unwrap();
        assert!(!stored.is_pro);
        assert_eq!(stored.status, STATUS_NONE);
        assert_eq!(report.revoked_for_absence, 1);
    }

    #[tokio::test]
    async fn sweep_picks_latest_period_end() {
        let f = fixture(SweepConfig::default());
        link(&f, "cus_1", "user-1").await;
        f.provider
            .add_subscription(sub("sub_old", "cus_1", SubscriptionStatus::Canceled, 1_000));
        f.provider
            .add_subscription(sub("sub_new", "cus_1", SubscriptionStatus::Active, 9_000));

        let report = f.handler.run_sweep(None).await.unwrap();

        let stored = f.store.get(&uid("user-1")).await.unwrap().unwrap();
        assert!(stored.is_pro);
        assert_eq!(
            stored.subscription_id.as_ref().map(SubscriptionId::as_str),
            Some("sub_new")
        );
        assert_eq!(report.entitled, 1);
    }

    #[tokio::test]
    async fn one_failing_customer_does_not_abort_the_batch() {
        let f = fixture(SweepConfig::default());
        link(&f, "cus_bad", "user-bad").await;
        link(&f, "cus_good", "user-good").await;
        f.provider
            .add_subscription(sub("sub_g", "cus_good", SubscriptionStatus::Active, 5_000));
        f.provider.fail_customer("cus_bad", ProviderError::network("reset"));

        let report = f.handler.run_sweep(None).await.unwrap();

        assert_eq!(report.reconciled, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].customer_id.as_str(), "cus_bad");
        assert!(f.store.get(&uid("user-good")).await.unwrap().unwrap().is_pro);
    }

    #[tokio::test]
    async fn full_batch_returns_cursor_and_short_batch_wraps() {
        let f = fixture(SweepConfig {
            batch_size: 2,
            concurrency: 2,
        });
        link(&f, "cus_a", "user-a").await;
        link(&f, "cus_b", "user-b").await;
        link(&f, "cus_c", "user-c").await;

        let first = f.handler.run_sweep(None).await.unwrap();
        assert_eq!(first.next_cursor.as_ref().map(CustomerId::as_str), Some("cus_b"));
        assert_eq!(first.reconciled, 2);

        let second = f.handler.run_sweep(first.next_cursor.as_ref()).await.unwrap();
        assert_eq!(second.reconciled, 1);
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn active_subscription_on_second_customer_keeps_user_entitled() {
        let f = fixture(SweepConfig::default());
        link(&f, "cus_1", "user-1").await;
        link(&f, "cus_2", "user-1").await;
        f.provider
            .add_subscription(sub("sub_2", "cus_2", SubscriptionStatus::Active, 7_000));

        let report = f.handler.run_sweep(None).await.unwrap();

        assert_eq!(report.reconciled, 1);
        assert!(f.store.get(&uid("user-1")).await.unwrap().unwrap().is_pro);
    }

    // ══════════════════════════════════════════════════════════════
    // Reconcile User
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn unlinked_user_is_not_linked() {
        let f = fixture(SweepConfig::default());

        let outcome = f.handler.reconcile_user(&uid("stranger")).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::NotLinked);
        assert_eq!(f.store.write_count(), 0);
    }

    #[tokio::test]
    async fn entitled_user_who_lost_their_link_is_revoked() {
        let f = fixture(SweepConfig::default());
        link(&f, "cus_1", "user-1").await;
        f.provider
            .add_subscription(sub("sub_1", "cus_1", SubscriptionStatus::Active, 2_000));
        f.handler.reconcile_user(&uid("user-1")).await.unwrap();
        f.links
            .relink(&CustomerLink::new(cus("cus_1"), uid("user-2")))
            .await
            .unwrap();

        let outcome = f.handler.reconcile_user(&uid("user-1")).await.unwrap();

        assert!(matches!(
            outcome,
            ReconcileOutcome::Reconciled { ref record, .. } if !record.is_pro
        ));
        let stored = f.store.get(&uid("user-1")).await.unwrap().unwrap();
        assert!(!stored.is_pro);
        assert_eq!(stored.status, STATUS_NONE);
        assert!(stored.subscription_id.is_none());
    }

    #[tokio::test]
    async fn unlinked_user_already_revoked_is_left_alone() {
        let f = fixture(SweepConfig::default());
        link(&f, "cus_1", "user-1").await;
        f.handler.reconcile_user(&uid("user-1")).await.unwrap();
        f.links
            .relink(&CustomerLink::new(cus("cus_1"), uid("user-2")))
            .await
            .unwrap();
        let writes = f.store.write_count();

        let outcome = f.handler.reconcile_user(&uid("user-1")).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::NotLinked);
        assert_eq!(f.store.write_count(), writes);
    }

    #[tokio::test]
    async fn reconcile_user_surfaces_provider_errors() {
        let f = fixture(SweepConfig::default());
        link(&f, "cus_1", "user-1").await;
        f.provider.fail_customer("cus_1", ProviderError::network("reset"));

        let result = f.handler.reconcile_user(&uid("user-1")).await;

        assert!(matches!(result, Err(EntitlementError::Provider(_))));
    }
}
