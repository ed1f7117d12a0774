//! EventRouter - turns a claimed event into one fresh subscription snapshot.
//!
//! Each event kind has its own fetch chain. Every chain ends in a
//! `get_subscription` so decisions are made on current provider state, not on
//! whatever copy the event carried.

use std::sync::Arc;

use crate::domain::billing::{BillingEvent, BillingEventKind, IdentityHints, SubscriptionSnapshot};
use crate::domain::foundation::SubscriptionId;
use crate::ports::BillingProvider;

use super::errors::EntitlementError;

/// What the router made of an event.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedEvent {
    /// A subscription was found.
    Resolved {
        snapshot: SubscriptionSnapshot,
        hints: IdentityHints,
        force_inactive: bool,
    },
    /// The event refers to no subscription we can find. Dropped.
    NoSubscription { reason: String },
    /// The event kind is not acted on. Acknowledged.
    Unhandled,
}

impl RoutedEvent {
    fn missing(reason: impl Into<String>) -> Self {
        RoutedEvent::NoSubscription {
            reason: reason.into(),
        }
    }
}

pub struct EventRouter {
    provider: Arc<dyn BillingProvider>,
}

impl EventRouter {
    pub fn new(provider: Arc<dyn BillingProvider>) -> Self {
        Self { provider }
    }

    /// Routes an event. Errors are transient provider failures only.
    pub async fn route(&self, event: &BillingEvent) -> Result<RoutedEvent, EntitlementError> {
        let force_inactive = event.kind.is_force_inactive();

        match &event.kind {
            BillingEventKind::SubscriptionCreated
            | BillingEventKind::SubscriptionUpdated
            | BillingEventKind::SubscriptionDeleted => self.route_subscription(event).await,

            BillingEventKind::CheckoutSessionCompleted => self.route_checkout(event).await,

            BillingEventKind::InvoicePaid
            | BillingEventKind::InvoicePaymentSucceeded
            | BillingEventKind::InvoicePaymentFailed => {
                let Some(invoice_id) = event.object_id() else {
                    return Ok(RoutedEvent::missing("invoice event without invoice id"));
                };
                let hints = IdentityHints::none().with_metadata_uid(event.metadata_uid());
                self.route_invoice(invoice_id, hints, force_inactive).await
            }

            BillingEventKind::ChargeRefunded | BillingEventKind::ChargeDisputeCreated => {
                self.route_charge(event, force_inactive).await
            }

            BillingEventKind::Unhandled(event_type) => {
                tracing::debug!(event_id = %event.id, event_type = %event_type, "Unhandled event type");
                Ok(RoutedEvent::Unhandled)
            }
        }
    }

    async fn route_subscription(&self, event: &BillingEvent) -> Result<RoutedEvent, EntitlementError> {
        let inline = self.provider.decode_subscription(&event.payload);
        let id = inline
            .as_ref()
            .map(|s| s.subscription_id.clone())
            .or_else(|| event.object_id().and_then(|id| SubscriptionId::new(id).ok()));

        let Some(id) = id else {
            return Ok(RoutedEvent::missing("subscription event without subscription id"));
        };

        let snapshot = match self.provider.get_subscription(&id).await? {
            Some(fresh) => fresh,
            None => match inline {
                Some(inline) => {
                    tracing::debug!(
                        event_id = %event.id,
                        subscription_id = %id,
                        "Subscription no longer returned by provider, using event copy"
                    );
                    inline
                }
                None => return Ok(RoutedEvent::missing(format!("subscription {} not found", id))),
            },
        };

        Ok(RoutedEvent::Resolved {
            snapshot,
            hints: IdentityHints::none(),
            force_inactive: false,
        })
    }

    async fn route_checkout(&self, event: &BillingEvent) -> Result<RoutedEvent, EntitlementError> {
        let Some(session_id) = event.object_id() else {
            return Ok(RoutedEvent::missing("checkout event without session id"));
        };
        let Some(session) = self.provider.get_checkout_session(session_id).await? else {
            return Ok(RoutedEvent::missing(format!(
                "checkout session {} not found",
                session_id
            )));
        };
        let Some(subscription_id) = session.subscription_id.as_ref() else {
            return Ok(RoutedEvent::missing(format!(
                "checkout session {} created no subscription",
                session.id
            )));
        };

        let hints = IdentityHints::none()
            .with_client_reference(session.client_reference_id.as_deref())
            .with_metadata_uid(session.metadata_uid.as_deref());

        self.fetch_subscription(subscription_id, hints, false).await
    }

    async fn route_invoice(
        &self,
        invoice_id: &str,
        hints: IdentityHints,
        force_inactive: bool,
    ) -> Result<RoutedEvent, EntitlementError> {
        let Some(invoice) = self.provider.get_invoice(invoice_id).await? else {
            return Ok(RoutedEvent::missing(format!("invoice {} not found", invoice_id)));
        };
        let Some(subscription_id) = invoice.subscription_id.as_ref() else {
            return Ok(RoutedEvent::missing(format!(
                "invoice {} has no subscription",
                invoice.id
            )));
        };

        let hints = hints.with_metadata_uid(invoice.metadata_uid.as_deref());
        self.fetch_subscription(subscription_id, hints, force_inactive)
            .await
    }

    async fn route_charge(
        &self,
        event: &BillingEvent,
        force_inactive: bool,
    ) -> Result<RoutedEvent, EntitlementError> {
        // Disputes carry the charge id in `charge`; refunds are the charge.
        let charge_id = match event.kind {
            BillingEventKind::ChargeDisputeCreated => event.object_str("charge"),
            _ => event.object_id(),
        };
        let Some(charge_id) = charge_id else {
            return Ok(RoutedEvent::missing("charge event without charge id"));
        };
        let Some(charge) = self.provider.get_charge(charge_id).await? else {
            return Ok(RoutedEvent::missing(format!("charge {} not found", charge_id)));
        };
        let Some(invoice_id) = charge.invoice_id.as_deref() else {
            return Ok(RoutedEvent::missing(format!(
                "charge {} has no invoice",
                charge.id
            )));
        };

        let hints = IdentityHints::none()
            .with_metadata_uid(event.metadata_uid())
            .with_metadata_uid(charge.metadata_uid.as_deref());
        self.route_invoice(invoice_id, hints, force_inactive).await
    }

    async fn fetch_subscription(
        &self,
        subscription_id: &SubscriptionId,
        hints: IdentityHints,
        force_inactive: bool,
    ) -> Result<RoutedEvent, EntitlementError> {
        match self.provider.get_subscription(subscription_id).await? {
            Some(snapshot) => Ok(RoutedEvent::Resolved {
                snapshot,
                hints,
                force_inactive,
            }),
            None => Ok(RoutedEvent::missing(format!(
                "subscription {} not found",
                subscription_id
            ))),
        }
    }
}
