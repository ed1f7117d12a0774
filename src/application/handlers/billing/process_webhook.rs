//! ProcessWebhookHandler - the webhook pipeline behind the endpoint.
//!
//! verify → claim → route → resolve → compute → persist.
//!
//! Nothing runs before the signature verifies. Nothing with side effects
//! runs before the ledger claim succeeds. Once claimed, the marker stands
//! whatever happens next: a redelivery is acknowledged as a duplicate and
//! any write lost to a failure or timeout is repaired by the sweep.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::billing::{
    compute, BillingEvent, EntitlementTrigger, PlanCatalog, WebhookError, WebhookVerifier,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{ClaimResult, IdempotencyLedger, IdempotencyMarker, ProcessingOutcome};

use super::errors::EntitlementError;
use super::event_router::{EventRouter, RoutedEvent};
use super::identity_resolver::IdentityResolver;
use super::state_persister::StatePersister;

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct WebhookPipelineConfig {
    /// Budget for everything after signature verification.
    pub timeout: Duration,
    /// Drop test-mode events.
    pub require_livemode: bool,
}

impl Default for WebhookPipelineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            require_livemode: false,
        }
    }
}

/// What happened to a verified delivery. Every variant is acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The event id was already claimed.
    Duplicate,
    /// An entitlement was computed and stored.
    Applied {
        uid: UserId,
        is_pro: bool,
        claims_synced: bool,
    },
    /// Processed without a write (unhandled kind or a data gap).
    Ignored { reason: String },
}

pub struct ProcessWebhookHandler {
    verifier: WebhookVerifier,
    ledger: Arc<dyn IdempotencyLedger>,
    router: EventRouter,
    resolver: IdentityResolver,
    persister: StatePersister,
    catalog: Arc<PlanCatalog>,
    config: WebhookPipelineConfig,
}

impl ProcessWebhookHandler {
    pub fn new(
        verifier: WebhookVerifier,
        ledger: Arc<dyn IdempotencyLedger>,
        router: EventRouter,
        resolver: IdentityResolver,
        persister: StatePersister,
        catalog: Arc<PlanCatalog>,
        config: WebhookPipelineConfig,
    ) -> Self {
        Self {
            verifier,
            ledger,
            router,
            resolver,
            persister,
            catalog,
            config,
        }
    }

    /// Handles one delivery.
    ///
    /// # Errors
    ///
    /// 4xx-class `WebhookError`s for anything rejected before the claim,
    /// retryable ones for storage or provider failures and timeouts.
    pub async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let signature = signature.ok_or(WebhookError::MissingSignature)?;
        let event = self.verifier.verify_and_parse(payload, signature)?;

        if self.config.require_livemode && !event.livemode {
            tracing::warn!(event_id = %event.id, "Dropping test-mode event");
            return Ok(WebhookOutcome::Ignored {
                reason: "test-mode event".to_string(),
            });
        }

        let budget = self.config.timeout;
        match tokio::time::timeout(budget, self.claim_and_process(&event)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.kind,
                    timeout_secs = budget.as_secs(),
                    "Webhook pipeline timed out"
                );
                self.record_outcome(
                    &event,
                    ProcessingOutcome::Failed {
                        reason: "timeout".to_string(),
                    },
                )
                .await;
                Err(WebhookError::Timeout(budget.as_secs()))
            }
        }
    }

    async fn claim_and_process(&self, event: &BillingEvent) -> Result<WebhookOutcome, WebhookError> {
        let claim = self
            .ledger
            .claim(&IdempotencyMarker::for_event(event))
            .await
            .map_err(|e| {
                tracing::error!(event_id = %event.id, error = %e, "Idempotency claim failed");
                WebhookError::Ledger(e.to_string())
            })?;

        if claim == ClaimResult::AlreadyProcessed {
            tracing::info!(event_id = %event.id, event_type = %event.kind, "Duplicate delivery skipped");
            return Ok(WebhookOutcome::Duplicate);
        }

        match self.process(event).await {
            Ok(outcome) => {
                let audit = match &outcome {
                    WebhookOutcome::Ignored { reason } => ProcessingOutcome::Ignored {
                        reason: reason.clone(),
                    },
                    _ => ProcessingOutcome::Applied,
                };
                self.record_outcome(event, audit).await;
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.kind,
                    error = %e,
                    "Webhook processing failed after claim"
                );
                self.record_outcome(
                    event,
                    ProcessingOutcome::Failed {
                        reason: e.to_string(),
                    },
                )
                .await;
                Err(e.into())
            }
        }
    }

    async fn process(&self, event: &BillingEvent) -> Result<WebhookOutcome, EntitlementError> {
        let (snapshot, hints, force_inactive) = match self.router.route(event).await? {
            RoutedEvent::Resolved {
                snapshot,
                hints,
                force_inactive,
            } => (snapshot, hints, force_inactive),
            RoutedEvent::NoSubscription { reason } => {
                tracing::warn!(event_id = %event.id, event_type = %event.kind, reason = %reason, "No subscription for event, dropping");
                return Ok(WebhookOutcome::Ignored { reason });
            }
            RoutedEvent::Unhandled => {
                return Ok(WebhookOutcome::Ignored {
                    reason: format!("unhandled event type {}", event.kind),
                });
            }
        };

        let Some(identity) = self.resolver.resolve(&snapshot, &hints).await? else {
            tracing::warn!(
                event_id = %event.id,
                customer_id = %snapshot.customer_id,
                subscription_id = %snapshot.subscription_id,
                "No user resolvable for subscription, dropping"
            );
            return Ok(WebhookOutcome::Ignored {
                reason: format!("no uid for customer {}", snapshot.customer_id),
            });
        };

        let trigger = EntitlementTrigger::Event {
            event_id: event.id.clone(),
            kind: event.kind.clone(),
        };
        let record = compute(
            &identity.uid,
            &snapshot,
            &trigger,
            &self.catalog,
            Timestamp::now(),
        );

        if let (Some(plan), None) = (&snapshot.plan_id, &record.plan_id) {
            tracing::warn!(
                event_id = %event.id,
                subscription_id = %snapshot.subscription_id,
                plan_id = %plan,
                "Subscription plan is not allow-listed, not entitling"
            );
        }

        let report = self.persister.persist(&record).await?;

        tracing::info!(
            event_id = %event.id,
            event_type = %event.kind,
            uid = %record.uid,
            subscription_id = %snapshot.subscription_id,
            status = %record.status,
            is_pro = record.is_pro,
            force_inactive,
            identity_source = identity.source.as_str(),
            claims_synced = report.claims_synced,
            "Entitlement applied"
        );

        Ok(WebhookOutcome::Applied {
            uid: record.uid,
            is_pro: record.is_pro,
            claims_synced: report.claims_synced,
        })
    }

    async fn record_outcome(&self, event: &BillingEvent, outcome: ProcessingOutcome) {
        if let Err(e) = self.ledger.record_outcome(&event.id, &outcome).await {
            tracing::warn!(
                event_id = %event.id,
                outcome = outcome.as_str(),
                error = %e,
                "Failed to record webhook outcome"
            );
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
    use crate::domain::billing::{sign_payload, SubscriptionSnapshot, SubscriptionStatus};
    use crate::domain::foundation::{CustomerId, SubscriptionId};
    use crate::ports::{EntitlementStore, ProviderError};
    use secrecy::SecretString;
    use serde_json::json;

    const SECRET: &str = "whsec_pipeline";

    struct Fixture {
        provider: Arc<MockBillingProvider>,
        ledger: Arc<InMemoryIdempotencyLedger>,
        store: Arc<InMemoryEntitlementStore>,
        handler: ProcessWebhookHandler,
    }

    fn fixture_with(config: WebhookPipelineConfig) -> Fixture {
        let provider = Arc::new(MockBillingProvider::new());
        let ledger = Arc::new(InMemoryIdempotencyLedger::new());
        let store = Arc::new(InMemoryEntitlementStore::new());
        let links = Arc::new(InMemoryCustomerLinkRepository::new());
        let claims = Arc::new(RecordingClaimsSync::new());

        let handler = ProcessWebhookHandler::new(
            WebhookVerifier::new(SecretString::new(SECRET.to_string())),
            ledger.clone(),
            EventRouter::new(provider.clone()),
            IdentityResolver::new(provider.clone(), links),
            StatePersister::new(store.clone(), claims),
            Arc::new(PlanCatalog::new(["pro_monthly"])),
            config,
        );

        Fixture {
            provider,
            ledger,
            store,
            handler,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(WebhookPipelineConfig::default())
    }

    fn subscription(status: SubscriptionStatus, uid: Option<&str>) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            subscription_id: SubscriptionId::new("sub_1").unwrap(),
            customer_id: CustomerId::new("cus_1").unwrap(),
            status,
            plan_id: Some("pro_monthly".to_string()),
            current_period_end: Timestamp::from_unix_secs(1_706_745_600),
            cancel_at_period_end: false,
            metadata_uid: uid.map(str::to_string),
        }
    }

    fn delivery(id: &str, event_type: &str, object: serde_json::Value) -> (Vec<u8>, String) {
        let body = serde_json::to_vec(&json!({
            "id": id,
            "type": event_type,
            "created": 1_704_067_200,
            "data": {"object": object},
            "livemode": false
        }))
        .unwrap();
        let header = sign_payload(SECRET, chrono::Utc::now().timestamp(), &body).unwrap();
        (body, header)
    }

    fn uid() -> UserId {
        UserId::new("user-1").unwrap()
    }

    // ══════════════════════════════════════════════════════════════
    // Verification Gate
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn missing_signature_is_rejected_before_claim() {
        let f = fixture();
        let (body, _) = delivery("evt_1", "invoice.paid", json!({"id": "in_1"}));

        let result = f.handler.handle(&body, None).await;

        assert!(matches!(result, Err(WebhookError::MissingSignature)));
        assert_eq!(f.ledger.marker_count(), 0);
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_before_claim() {
        let f = fixture();
        let (body, _) = delivery("evt_1", "invoice.paid", json!({"id": "in_1"}));
        let forged = sign_payload("whsec_other", chrono::Utc::now().timestamp(), &body).unwrap();

        let result = f.handler.handle(&body, Some(&forged)).await;

        assert!(matches!(result, Err(WebhookError::InvalidSignature)));
        assert_eq!(f.ledger.marker_count(), 0);
    }

    #[tokio::test]
    async fn test_mode_event_is_dropped_when_livemode_required() {
        let f = fixture_with(WebhookPipelineConfig {
            require_livemode: true,
            ..WebhookPipelineConfig::default()
        });
        let (body, header) = delivery("evt_1", "invoice.paid", json!({"id": "in_1"}));

        let outcome = f.handler.handle(&body, Some(&header)).await.unwrap();

        assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));
        assert_eq!(f.ledger.marker_count(), 0);
    }

    // ══════════════════════════════════════════════════════════════
    // Idempotency
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn redelivery_writes_once() {
        let f = fixture();
        f.provider
            .add_subscription(subscription(SubscriptionStatus::Active, Some("user-1")));
        let (body, header) = delivery(
            "evt_1",
            "customer.subscription.updated",
            json!({"id": "sub_1", "customer": "cus_1"}),
        );

        let first = f.handler.handle(&body, Some(&header)).await.unwrap();
        let second = f.handler.handle(&body, Some(&header)).await.unwrap();

        assert!(matches!(first, WebhookOutcome::Applied { is_pro: true, .. }));
        assert_eq!(second, WebhookOutcome::Duplicate);
        assert_eq!(f.store.write_count(), 1);
        assert_eq!(f.ledger.outcome("evt_1").as_deref(), Some("applied"));
    }

    #[tokio::test]
    async fn concurrent_deliveries_of_one_event_write_once() {
        let f = fixture();
        f.provider
            .add_subscription(subscription(SubscriptionStatus::Active, Some("user-1")));
        f.provider.set_latency(Duration::from_millis(20));
        let (body, header) = delivery(
            "evt_race",
            "customer.subscription.updated",
            json!({"id": "sub_1", "customer": "cus_1"}),
        );

        let (a, b) = tokio::join!(
            f.handler.handle(&body, Some(&header)),
            f.handler.handle(&body, Some(&header))
        );
        let outcomes = [a.unwrap(), b.unwrap()];

        let applied = outcomes
            .iter()
            .filter(|o| matches!(o, WebhookOutcome::Applied { .. }))
            .count();
        let duplicates = outcomes
            .iter()
            .filter(|o| **o == WebhookOutcome::Duplicate)
            .count();
        assert_eq!((applied, duplicates), (1, 1));
        assert_eq!(f.store.write_count(), 1);
        assert_eq!(f.ledger.marker_count(), 1);
    }

    #[tokio::test]
    async fn ledger_outage_is_retryable_and_writes_nothing() {
        let f = fixture();
        f.ledger.set_unavailable(true);
        f.provider
            .add_subscription(subscription(SubscriptionStatus::Active, Some("user-1")));
        let (body, header) = delivery("evt_1", "customer.subscription.updated", json!({"id": "sub_1"}));

        let result = f.handler.handle(&body, Some(&header)).await;

        assert!(matches!(result, Err(WebhookError::Ledger(_))));
        assert_eq!(f.store.write_count(), 0);
    }

    // ══════════════════════════════════════════════════════════════
    // Entitlement Outcomes
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn payment_failure_revokes_with_past_due_status() {
        let f = fixture();
        f.provider.add_invoice(crate::ports::InvoiceRef {
            id: "in_1".to_string(),
            subscription_id: Some(SubscriptionId::new("sub_1").unwrap()),
            customer_id: Some(CustomerId::new("cus_1").unwrap()),
            metadata_uid: None,
        });
        f.provider
            .add_subscription(subscription(SubscriptionStatus::PastDue, Some("user-1")));
        let (body, header) = delivery("evt_2", "invoice.payment_failed", json!({"id": "in_1"}));

        f.handler.handle(&body, Some(&header)).await.unwrap();

        let stored = f.store.get(&uid()).await.unwrap().unwrap();
        assert!(!stored.is_pro);
        assert_eq!(stored.status, "past_due");
    }

    #[tokio::test]
    async fn unresolvable_identity_is_acknowledged_and_marked_ignored() {
        let f = fixture();
        f.provider
            .add_subscription(subscription(SubscriptionStatus::Active, None));
        let (body, header) = delivery("evt_9", "customer.subscription.updated", json!({"id": "sub_1"}));

        let outcome = f.handler.handle(&body, Some(&header)).await.unwrap();

        assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));
        assert_eq!(f.store.write_count(), 0);
        assert_eq!(f.ledger.outcome("evt_9").as_deref(), Some("ignored"));
    }

    #[tokio::test]
    async fn unhandled_event_is_acknowledged_and_claimed() {
        let f = fixture();
        let (body, header) = delivery("evt_u", "customer.created", json!({"id": "cus_1"}));

        let outcome = f.handler.handle(&body, Some(&header)).await.unwrap();

        assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));
        assert_eq!(f.ledger.marker_count(), 1);
    }

    #[tokio::test]
    async fn provider_failure_after_claim_fails_and_redelivery_is_duplicate() {
        let f = fixture();
        f.provider
            .set_method_error("get_subscription", ProviderError::network("timeout"));
        let (body, header) = delivery("evt_f", "customer.subscription.updated", json!({"id": "sub_1"}));

        let first = f.handler.handle(&body, Some(&header)).await;
        assert!(matches!(first, Err(WebhookError::Provider(_))));
        assert_eq!(f.ledger.outcome("evt_f").as_deref(), Some("failed"));

        let second = f.handler.handle(&body, Some(&header)).await.unwrap();
        assert_eq!(second, WebhookOutcome::Duplicate);
    }

    #[tokio::test]
    async fn slow_pipeline_times_out() {
        let f = fixture_with(WebhookPipelineConfig {
            timeout: Duration::from_millis(20),
            require_livemode: false,
        });
        f.provider.set_latency(Duration::from_millis(200));
        f.provider
            .add_subscription(subscription(SubscriptionStatus::Active, Some("user-1")));
        let (body, header) = delivery("evt_slow", "customer.subscription.updated", json!({"id": "sub_1"}));

        let result = f.handler.handle(&body, Some(&header)).await;

        assert!(matches!(result, Err(WebhookError::Timeout(_))));
        assert_eq!(f.store.write_count(), 0);
        assert_eq!(f.ledger.marker_count(), 1);
    }
}
