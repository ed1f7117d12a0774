//! Subscription snapshots fetched from the billing provider.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CustomerId, SubscriptionId, Timestamp};

/// Subscription status as reported by the provider.
///
/// The set is closed; anything the provider adds later lands in `Unknown`
/// and never grants access.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    Incomplete,
    PastDue,
    Unpaid,
    Canceled,
    IncompleteExpired,
    Paused,
    Unknown(String),
}

impl SubscriptionStatus {
    /// Parses the provider status string.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "active" => Self::Active,
            "trialing" => Self::Trialing,
            "incomplete" => Self::Incomplete,
            "past_due" => Self::PastDue,
            "unpaid" => Self::Unpaid,
            "canceled" => Self::Canceled,
            "incomplete_expired" => Self::IncompleteExpired,
            "paused" => Self::Paused,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Returns the provider status string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::Incomplete => "incomplete",
            Self::PastDue => "past_due",
            Self::Unpaid => "unpaid",
            Self::Canceled => "canceled",
            Self::IncompleteExpired => "incomplete_expired",
            Self::Paused => "paused",
            Self::Unknown(raw) => raw,
        }
    }

    /// Statuses that always revoke access.
    pub fn is_downgrade(&self) -> bool {
        matches!(
            self,
            Self::PastDue | Self::Unpaid | Self::Canceled | Self::IncompleteExpired | Self::Paused
        )
    }

    /// Whether the status alone permits access. Plan checks still apply.
    ///
    /// `Unknown` statuses fail closed: a status this code cannot name is
    /// treated as not entitled until the provider reports a known one.
    pub fn permits_access(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing | Self::Incomplete)
    }
}

impl Serialize for SubscriptionStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SubscriptionStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authoritative state of one subscription at fetch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub subscription_id: SubscriptionId,
    pub customer_id: CustomerId,
    pub status: SubscriptionStatus,
    /// Price id of the first subscription item. Unvalidated.
    pub plan_id: Option<String>,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    /// `uid` stored in the subscription's metadata, if any.
    pub metadata_uid: Option<String>,
}

impl SubscriptionSnapshot {
    /// Picks the subscription with the latest period end.
    ///
    /// Subscriptions without a period end sort first.
    pub fn latest(snapshots: Vec<SubscriptionSnapshot>) -> Option<SubscriptionSnapshot> {
        snapshots
            .into_iter()
            .max_by_key(|s| s.current_period_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: &str, period_end: Option<i64>) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            subscription_id: SubscriptionId::new(id).unwrap(),
            customer_id: CustomerId::new("cus_1").unwrap(),
            status: SubscriptionStatus::Active,
            plan_id: Some("pro_monthly".to_string()),
            current_period_end: period_end.and_then(Timestamp::from_unix_secs),
            cancel_at_period_end: false,
            metadata_uid: None,
        }
    }

    #[test]
    fn downgrade_statuses_never_permit_access() {
        for raw in ["past_due", "unpaid", "canceled", "incomplete_expired", "paused"] {
            let status = SubscriptionStatus::parse(raw);
            assert!(status.is_downgrade(), "{raw} should be a downgrade");
            assert!(!status.permits_access(), "{raw} should not permit access");
        }
    }

    #[test]
    fn active_like_statuses_permit_access() {
        for raw in ["active", "trialing", "incomplete"] {
            assert!(SubscriptionStatus::parse(raw).permits_access());
        }
    }

    #[test]
    fn unknown_status_fails_closed() {
        let status = SubscriptionStatus::parse("paused_by_robot");
        assert_eq!(status, SubscriptionStatus::Unknown("paused_by_robot".to_string()));
        assert!(!status.is_downgrade());
        assert!(!status.permits_access());
    }

    #[test]
    fn status_serializes_as_provider_string() {
        let json = serde_json::to_string(&SubscriptionStatus::PastDue).unwrap();
        assert_eq!(json, "\"past_due\"");
        let back: SubscriptionStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SubscriptionStatus::PastDue);
    }

    #[test]
    fn latest_picks_greatest_period_end() {
        let picked = SubscriptionSnapshot::latest(vec![
            snapshot("sub_old", Some(1_000)),
            snapshot("sub_none", None),
            snapshot("sub_new", Some(2_000)),
        ])
        .unwrap();
        assert_eq!(picked.subscription_id.as_str(), "sub_new");
    }

    #[test]
    fn latest_of_empty_is_none() {
        assert!(SubscriptionSnapshot::latest(Vec::new()).is_none());
    }
}
