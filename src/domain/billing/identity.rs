//! Identity hints and the local resolution strategies.
//!
//! A strategy is a pure function from what the router already holds to an
//! optional uid. Strategies are tried in order and the first hit wins. The
//! two strategies that need I/O (stored link, customer metadata) live in the
//! application resolver and run after these.

use crate::domain::foundation::UserId;

use super::subscription::SubscriptionSnapshot;

/// Candidate uids carried by the object that triggered the event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityHints {
    /// Checkout session `client_reference_id`.
    pub client_reference_id: Option<String>,
    /// `uid` metadata on the session, invoice or charge.
    pub trigger_metadata_uid: Option<String>,
}

impl IdentityHints {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_client_reference(mut self, value: Option<&str>) -> Self {
        self.client_reference_id = value.map(str::to_string);
        self
    }

    /// Keeps the first metadata uid seen; later objects in a fetch chain do
    /// not override the triggering object's own hint.
    pub fn with_metadata_uid(mut self, value: Option<&str>) -> Self {
        if self.trigger_metadata_uid.is_none() {
            self.trigger_metadata_uid = value.map(str::to_string);
        }
        self
    }
}

/// Where a resolved uid came from. Logged with every resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    ClientReference,
    TriggerMetadata,
    SubscriptionMetadata,
    CustomerLink,
    CustomerMetadata,
}

impl IdentitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentitySource::ClientReference => "client_reference",
            IdentitySource::TriggerMetadata => "trigger_metadata",
            IdentitySource::SubscriptionMetadata => "subscription_metadata",
            IdentitySource::CustomerLink => "customer_link",
            IdentitySource::CustomerMetadata => "customer_metadata",
        }
    }
}

type Strategy = fn(&IdentityHints, &SubscriptionSnapshot) -> Option<UserId>;

/// Local strategies in priority order.
const LOCAL_STRATEGIES: [(IdentitySource, Strategy); 3] = [
    (IdentitySource::ClientReference, from_client_reference),
    (IdentitySource::TriggerMetadata, from_trigger_metadata),
    (IdentitySource::SubscriptionMetadata, from_subscription_metadata),
];

/// Runs the local strategies and returns the first uid found.
pub fn resolve_local(
    hints: &IdentityHints,
    snapshot: &SubscriptionSnapshot,
) -> Option<(UserId, IdentitySource)> {
    LOCAL_STRATEGIES
        .iter()
        .find_map(|(source, strategy)| strategy(hints, snapshot).map(|uid| (uid, *source)))
}

/// Parses a candidate, treating blank values as absent.
pub fn candidate_uid(raw: Option<&str>) -> Option<UserId> {
    raw.and_then(|s| UserId::new(s.trim()).ok())
}

fn from_client_reference(hints: &IdentityHints, _: &SubscriptionSnapshot) -> Option<UserId> {
    candidate_uid(hints.client_reference_id.as_deref())
}

fn from_trigger_metadata(hints: &IdentityHints, _: &SubscriptionSnapshot) -> Option<UserId> {
    candidate_uid(hints.trigger_metadata_uid.as_deref())
}

fn from_subscription_metadata(_: &IdentityHints, snapshot: &SubscriptionSnapshot) -> Option<UserId> {
    candidate_uid(snapshot.metadata_uid.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::SubscriptionStatus;
    use crate::domain::foundation::{CustomerId, SubscriptionId};

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

    #[test]
    fn client_reference_beats_subscription_metadata() {
        let hints = IdentityHints::none().with_client_reference(Some("from-session"));

        let (uid, source) = resolve_local(&hints, &snapshot(Some("from-subscription"))).unwrap();

        assert_eq!(uid.as_str(), "from-session");
        assert_eq!(source, IdentitySource::ClientReference);
    }

    #[test]
    fn trigger_metadata_beats_subscription_metadata() {
        let hints = IdentityHints::none().with_metadata_uid(Some("from-invoice"));

        let (uid, source) = resolve_local(&hints, &snapshot(Some("from-subscription"))).unwrap();

        assert_eq!(uid.as_str(), "from-invoice");
        assert_eq!(source, IdentitySource::TriggerMetadata);
    }

    #[test]
    fn falls_back_to_subscription_metadata() {
        let (uid, source) = resolve_local(&IdentityHints::none(), &snapshot(Some("u-9"))).unwrap();

        assert_eq!(uid.as_str(), "u-9");
        assert_eq!(source, IdentitySource::SubscriptionMetadata);
    }

    #[test]
    fn blank_candidates_are_skipped() {
        let hints = IdentityHints::none()
            .with_client_reference(Some("  "))
            .with_metadata_uid(Some(""));

        let (uid, source) = resolve_local(&hints, &snapshot(Some("u-3"))).unwrap();

        assert_eq!(uid.as_str(), "u-3");
        assert_eq!(source, IdentitySource::SubscriptionMetadata);
    }

    #[test]
    fn nothing_found_returns_none() {
        assert!(resolve_local(&IdentityHints::none(), &snapshot(None)).is_none());
    }

    #[test]
    fn first_metadata_hint_is_kept() {
        let hints = IdentityHints::none()
            .with_metadata_uid(Some("charge-uid"))
            .with_metadata_uid(Some("invoice-uid"));
        assert_eq!(hints.trigger_metadata_uid.as_deref(), Some("charge-uid"));
    }
}
