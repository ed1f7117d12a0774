//! IdentityResolver - maps a subscription to the internal user it belongs to.
//!
//! Order: trigger hints, subscription metadata, stored customer link, then
//! the customer object's metadata (a provider round-trip, so last). Once a
//! uid is found the customer link is recorded and the uid is back-filled
//! onto the provider objects so later events resolve without lookups.
//!
//! A customer already linked to someone else stays with its linked user:
//! the event is attributed to that user, never to the conflicting uid.

use std::sync::Arc;

use crate::domain::billing::{
    candidate_uid, resolve_local, IdentityHints, IdentitySource, SubscriptionSnapshot,
    UID_METADATA_KEY,
};
use crate::domain::foundation::UserId;
use crate::ports::{BillingProvider, CustomerLink, CustomerLinkRepository, LinkOutcome};

use super::errors::EntitlementError;

/// A resolved identity and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub uid: UserId,
    pub source: IdentitySource,
}

pub struct IdentityResolver {
    provider: Arc<dyn BillingProvider>,
    links: Arc<dyn CustomerLinkRepository>,
}

impl IdentityResolver {
    pub fn new(provider: Arc<dyn BillingProvider>, links: Arc<dyn CustomerLinkRepository>) -> Self {
        Self { provider, links }
    }

    /// Resolves the uid for a snapshot. `Ok(None)` is a data-quality gap.
    pub async fn resolve(
        &self,
        snapshot: &SubscriptionSnapshot,
        hints: &IdentityHints,
    ) -> Result<Option<ResolvedIdentity>, EntitlementError> {
        let Some(resolved) = self.find(snapshot, hints).await? else {
            return Ok(None);
        };

        let link_outcome = self.record_link(snapshot, &resolved).await?;
        if let LinkOutcome::Conflict { existing_uid } = &link_outcome {
            return Ok(Some(ResolvedIdentity {
                uid: existing_uid.clone(),
                source: IdentitySource::CustomerLink,
            }));
        }
        self.backfill(snapshot, &resolved, &link_outcome).await;

        Ok(Some(resolved))
    }

    async fn find(
        &self,
        snapshot: &SubscriptionSnapshot,
        hints: &IdentityHints,
    ) -> Result<Option<ResolvedIdentity>, EntitlementError> {
        if let Some((uid, source)) = resolve_local(hints, snapshot) {
            return Ok(Some(ResolvedIdentity { uid, source }));
        }

        if let Some(link) = self.links.find_by_customer(&snapshot.customer_id).await? {
            return Ok(Some(ResolvedIdentity {
                uid: link.uid,
                source: IdentitySource::CustomerLink,
            }));
        }

        let customer = self.provider.get_customer(&snapshot.customer_id).await?;
        Ok(customer
            .and_then(|c| candidate_uid(c.metadata_uid.as_deref()))
            .map(|uid| ResolvedIdentity {
                uid,
                source: IdentitySource::CustomerMetadata,
            }))
    }

    async fn record_link(
        &self,
        snapshot: &SubscriptionSnapshot,
        resolved: &ResolvedIdentity,
    ) -> Result<LinkOutcome, EntitlementError> {
        if resolved.source == IdentitySource::CustomerLink {
            return Ok(LinkOutcome::AlreadyLinked);
        }

        let link = CustomerLink::new(snapshot.customer_id.clone(), resolved.uid.clone());
        let outcome = self.links.link_if_absent(&link).await?;

        match &outcome {
            LinkOutcome::Created => tracing::info!(
                customer_id = %snapshot.customer_id,
                uid = %resolved.uid,
                source = resolved.source.as_str(),
                "Linked billing customer to user"
            ),
            LinkOutcome::Conflict { existing_uid } => tracing::warn!(
                customer_id = %snapshot.customer_id,
                uid = %resolved.uid,
                existing_uid = %existing_uid,
                source = resolved.source.as_str(),
                "Customer already linked to a different user, attributing to linked user"
            ),
            LinkOutcome::AlreadyLinked => {}
        }

        Ok(outcome)
    }

    /// Best-effort: failures are logged and never fail the event.
    async fn backfill(
        &self,
        snapshot: &SubscriptionSnapshot,
        resolved: &ResolvedIdentity,
        link_outcome: &LinkOutcome,
    ) {
        let uid = resolved.uid.as_str();

        if candidate_uid(snapshot.metadata_uid.as_deref()).is_none() {
            if let Err(e) = self
                .provider
                .set_subscription_metadata(&snapshot.subscription_id, UID_METADATA_KEY, uid)
                .await
            {
                tracing::warn!(
                    subscription_id = %snapshot.subscription_id,
                    error = %e,
                    "Failed to back-fill uid onto subscription"
                );
            }
        }

        if resolved.source != IdentitySource::CustomerMetadata
            && *link_outcome == LinkOutcome::Created
        {
            if let Err(e) = self
                .provider
                .set_customer_metadata(&snapshot.customer_id, UID_METADATA_KEY, uid)
                .await
            {
                tracing::warn!(
                    customer_id = %snapshot.customer_id,
                    error = %e,
                    "Failed to back-fill uid onto customer"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryCustomerLinkRepository;
    use crate::adapters::stripe::MockBillingProvider;
    use crate::domain::billing::SubscriptionStatus;
    use crate::domain::foundation::{CustomerId, SubscriptionId};
    use crate::ports::{CustomerRef, ProviderError};

    struct Fixture {
        provider: Arc<MockBillingProvider>,
        links: Arc<InMemoryCustomerLinkRepository>,
        resolver: IdentityResolver,
    }

    fn fixture() -> Fixture {
        let provider = Arc::new(MockBillingProvider::new());
        let links = Arc::new(InMemoryCustomerLinkRepository::new());
        let resolver = IdentityResolver::new(provider.clone(), links.clone());
        Fixture {
            provider,
            links,
            resolver,
        }
    }

    fn snapshot(metadata_uid: Option<&str>) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            subscription_id: SubscriptionId::new("sub_1").unwrap(),
            customer_id: CustomerId::new("cus_1").unwrap(),
            status: SubscriptionStatus::Active,
            plan_id: Some("pro_monthly".to_string()),
            current_period_end: None,
            cancel_at_period_end: false,
            metadata_uid: metadata_uid.map(str::to_string),
        }
    }

    fn customer_id() -> CustomerId {
        CustomerId::new("cus_1").unwrap()
    }

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    // ══════════════════════════════════════════════════════════════
    // Priority Tests
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn session_hint_wins_over_subscription_metadata() {
        let f = fixture();
        let hints = IdentityHints::none().with_client_reference(Some("from-session"));

        let resolved = f
            .resolver
            .resolve(&snapshot(Some("from-subscription")), &hints)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(resolved.uid.as_str(), "from-session");
        assert_eq!(resolved.source, IdentitySource::ClientReference);
    }

    #[tokio::test]
    async fn stored_link_is_used_before_customer_lookup() {
        let f = fixture();
        f.links
            .link_if_absent(&CustomerLink::new(customer_id(), uid("linked-user")))
            .await
            .unwrap();

        let resolved = f
            .resolver
            .resolve(&snapshot(None), &IdentityHints::none())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(resolved.uid.as_str(), "linked-user");
        assert_eq!(resolved.source, IdentitySource::CustomerLink);
        assert!(!f.provider.was_called("get_customer"));
    }

    #[tokio::test]
    async fn customer_metadata_is_the_last_resort() {
        let f = fixture();
        f.provider.add_customer(CustomerRef {
            id: customer_id(),
            metadata_uid: Some("from-customer".to_string()),
        });

        let resolved = f
            .resolver
            .resolve(&snapshot(None), &IdentityHints::none())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(resolved.uid.as_str(), "from-customer");
        assert_eq!(resolved.source, IdentitySource::CustomerMetadata);
    }

    #[tokio::test]
    async fn nothing_anywhere_resolves_to_none() {
        let f = fixture();

        let resolved = f
            .resolver
            .resolve(&snapshot(None), &IdentityHints::none())
            .await
            .unwrap();

        assert!(resolved.is_none());
        assert!(f.links.find_by_customer(&customer_id()).await.unwrap().is_none());
    }

    // ══════════════════════════════════════════════════════════════
    // Link and Back-fill Tests
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn resolution_records_link_and_backfills_metadata() {
        let f = fixture();
        let hints = IdentityHints::none().with_client_reference(Some("user-1"));

        f.resolver.resolve(&snapshot(None), &hints).await.unwrap();

        let link = f.links.find_by_customer(&customer_id()).await.unwrap().unwrap();
        assert_eq!(link.uid.as_str(), "user-1");
        assert_eq!(
            f.provider.subscription_metadata("sub_1", "uid").as_deref(),
            Some("user-1")
        );
        assert_eq!(
            f.provider.customer_metadata("cus_1", "uid").as_deref(),
            Some("user-1")
        );
    }

    #[tokio::test]
    async fn conflicting_link_keeps_the_linked_user() {
        let f = fixture();
        f.links
            .link_if_absent(&CustomerLink::new(customer_id(), uid("original")))
            .await
            .unwrap();

        let resolved = f
            .resolver
            .resolve(&snapshot(Some("newcomer")), &IdentityHints::none())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(resolved.uid.as_str(), "original");
        assert_eq!(resolved.source, IdentitySource::CustomerLink);
        let link = f.links.find_by_customer(&customer_id()).await.unwrap().unwrap();
        assert_eq!(link.uid.as_str(), "original");
        assert!(!f.provider.was_called("set_customer_metadata"));
    }

    #[tokio::test]
    async fn backfill_failure_does_not_fail_resolution() {
        let f = fixture();
        f.provider
            .set_method_error("set_subscription_metadata", ProviderError::network("reset"));
        let hints = IdentityHints::none().with_metadata_uid(Some("user-2"));

        let resolved = f.resolver.resolve(&snapshot(None), &hints).await.unwrap();

        assert_eq!(resolved.unwrap().uid.as_str(), "user-2");
    }

    #[tokio::test]
    async fn customer_lookup_outage_is_an_error() {
        let f = fixture();
        f.provider
            .set_method_error("get_customer", ProviderError::network("timeout"));

        let result = f
            .resolver
            .resolve(&snapshot(None), &IdentityHints::none())
            .await;

        assert!(matches!(result, Err(EntitlementError::Provider(_))));
    }
}
