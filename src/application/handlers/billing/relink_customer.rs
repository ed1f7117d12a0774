//! RelinkCustomerHandler - administrative overwrite of a customer link.
//!
//! This is the only path that may point an existing customer at a
//! different user. Both the previous and the new owner are reconciled
//! afterwards, so the entitlement follows the link.

use std::sync::Arc;

use crate::domain::foundation::{Caller, CustomerId, UserId};
use crate::ports::{CustomerLink, CustomerLinkRepository};

use super::errors::EntitlementError;
use super::reconcile_entitlements::{ReconcileEntitlementsHandler, ReconcileOutcome};

#[derive(Debug, Clone)]
pub struct RelinkCustomerCommand {
    pub customer_id: CustomerId,
    pub uid: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelinkCustomerResult {
    pub previous_uid: Option<UserId>,
    /// Entitlement of the new owner after reconciliation.
    pub is_pro: bool,
    /// Entitlement of the previous owner after reconciliation, when there
    /// was a different one.
    pub previous_is_pro: Option<bool>,
}

pub struct RelinkCustomerHandler {
    links: Arc<dyn CustomerLinkRepository>,
    reconciler: Arc<ReconcileEntitlementsHandler>,
}

impl RelinkCustomerHandler {
    pub fn new(
        links: Arc<dyn CustomerLinkRepository>,
        reconciler: Arc<ReconcileEntitlementsHandler>,
    ) -> Self {
        Self { links, reconciler }
    }

    /// Callers must have checked the admin role.
    ///
    /// The link is moved first. A reconcile failure is returned as an error
    /// with the link already in place; the sweep or a retry repairs it.
    pub async fn handle(
        &self,
        cmd: RelinkCustomerCommand,
        admin: &Caller,
    ) -> Result<RelinkCustomerResult, EntitlementError> {
        let link = CustomerLink::new(cmd.customer_id, cmd.uid);
        let previous_uid = self.links.relink(&link).await?;

        tracing::warn!(
            customer_id = %link.customer_id,
            uid = %link.uid,
            previous_uid = ?previous_uid.as_ref().map(UserId::as_str),
            admin_uid = %admin.uid,
            "Customer link overwritten by admin"
        );

        let previous_is_pro = match previous_uid.as_ref().filter(|p| **p != link.uid) {
            Some(previous) => Some(entitled(self.reconciler.reconcile_user(previous).await?)),
            None => None,
        };
        let is_pro = entitled(self.reconciler.reconcile_user(&link.uid).await?);

        Ok(RelinkCustomerResult {
            previous_uid,
            is_pro,
            previous_is_pro,
        })
    }
}

fn entitled(outcome: ReconcileOutcome) -> bool {
    match outcome {
        ReconcileOutcome::Reconciled { record, .. } => record.is_pro,
        ReconcileOutcome::NotLinked => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::claims::RecordingClaimsSync;
    use crate::adapters::memory::{InMemoryCustomerLinkRepository, InMemoryEntitlementStore};
    use crate::adapters::stripe::MockBillingProvider;
    use crate::application::handlers::billing::{StatePersister, SweepConfig};
    use crate::domain::billing::{PlanCatalog, SubscriptionSnapshot, SubscriptionStatus, STATUS_NONE};
    use crate::domain::foundation::{SubscriptionId, Timestamp};
    use crate::ports::EntitlementStore;

    struct Fixture {
        provider: Arc<MockBillingProvider>,
        links: Arc<InMemoryCustomerLinkRepository>,
        store: Arc<InMemoryEntitlementStore>,
        reconciler: Arc<ReconcileEntitlementsHandler>,
        handler: RelinkCustomerHandler,
    }

    fn fixture() -> Fixture {
        let provider = Arc::new(MockBillingProvider::new());
        let links = Arc::new(InMemoryCustomerLinkRepository::new());
        let store = Arc::new(InMemoryEntitlementStore::new());
        let reconciler = Arc::new(ReconcileEntitlementsHandler::new(
            provider.clone(),
            links.clone(),
            StatePersister::new(store.clone(), Arc::new(RecordingClaimsSync::new())),
            Arc::new(PlanCatalog::new(["pro_monthly"])),
            SweepConfig::default(),
        ));
        let handler = RelinkCustomerHandler::new(links.clone(), reconciler.clone());
        Fixture {
            provider,
            links,
            store,
            reconciler,
            handler,
        }
    }

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn cus(s: &str) -> CustomerId {
        CustomerId::new(s).unwrap()
    }

    fn active_sub(customer: &str) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            subscription_id: SubscriptionId::new("sub_1").unwrap(),
            customer_id: cus(customer),
            status: SubscriptionStatus::Active,
            plan_id: Some("pro_monthly".to_string()),
            current_period_end: Timestamp::from_unix_secs(2_000),
            cancel_at_period_end: false,
            metadata_uid: None,
        }
    }

    fn relink(customer: &str, user: &str) -> RelinkCustomerCommand {
        RelinkCustomerCommand {
            customer_id: cus(customer),
            uid: uid(user),
        }
    }

    fn ops() -> Caller {
        Caller::admin(uid("ops"))
    }

    #[tokio::test]
    async fn relink_replaces_existing_link() {
        let f = fixture();
        f.links
            .link_if_absent(&CustomerLink::new(cus("cus_1"), uid("old")))
            .await
            .unwrap();

        let result = f.handler.handle(relink("cus_1", "new"), &ops()).await.unwrap();

        assert_eq!(result.previous_uid.map(|u| u.as_str().to_string()), Some("old".to_string()));
        let link = f.links.find_by_customer(&cus("cus_1")).await.unwrap().unwrap();
        assert_eq!(link.uid.as_str(), "new");
    }

    #[tokio::test]
    async fn relink_moves_entitlement_to_the_new_owner() {
        let f = fixture();
        f.links
            .link_if_absent(&CustomerLink::new(cus("cus_1"), uid("old")))
            .await
            .unwrap();
        f.provider.add_subscription(active_sub("cus_1"));
        f.reconciler.reconcile_user(&uid("old")).await.unwrap();
        assert!(f.store.get(&uid("old")).await.unwrap().unwrap().is_pro);

        let result = f.handler.handle(relink("cus_1", "new"), &ops()).await.unwrap();

        assert!(result.is_pro);
        assert_eq!(result.previous_is_pro, Some(false));
        let previous = f.store.get(&uid("old")).await.unwrap().unwrap();
        assert!(!previous.is_pro);
        assert_eq!(previous.status, STATUS_NONE);
        assert!(f.store.get(&uid("new")).await.unwrap().unwrap().is_pro);
    }

    #[tokio::test]
    async fn relink_to_the_same_user_reconciles_once() {
        let f = fixture();
        f.links
            .link_if_absent(&CustomerLink::new(cus("cus_1"), uid("user-1")))
            .await
            .unwrap();
        f.provider.add_subscription(active_sub("cus_1"));

        let result = f.handler.handle(relink("cus_1", "user-1"), &ops()).await.unwrap();

        assert!(result.is_pro);
        assert!(result.previous_is_pro.is_none());
        assert_eq!(f.store.write_count(), 1);
    }

    #[tokio::test]
    async fn relink_of_unlinked_customer_creates_link() {
        let f = fixture();

        let result = f.handler.handle(relink("cus_9", "user-9"), &ops()).await.unwrap();

        assert!(result.previous_uid.is_none());
        assert!(result.previous_is_pro.is_none());
        assert!(!result.is_pro);
        assert!(f.links.find_by_customer(&cus("cus_9")).await.unwrap().is_some());
    }
}
