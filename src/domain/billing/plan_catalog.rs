//! Server-maintained allow-list of plans that grant premium access.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A plan id that was found in the allow-list.
///
/// Only `PlanCatalog::recognize` hands these out, so a `PlanId` on an
/// entitlement record is always allow-listed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(String);

impl PlanId {
    /// Rehydrates a plan id that was validated before it was stored.
    pub(crate) fn from_stored(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Set of plan ids that entitle a subscriber.
#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    allowed: HashSet<String>,
}

impl PlanCatalog {
    /// Builds a catalog from plan ids. Blank entries are dropped.
    pub fn new<I, S>(plans: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed = plans
            .into_iter()
            .map(Into::into)
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self { allowed }
    }

    /// Builds a catalog from a comma-separated list.
    pub fn from_csv(csv: &str) -> Self {
        Self::new(csv.split(','))
    }

    /// Returns the plan id if it is allow-listed.
    pub fn recognize(&self, raw: &str) -> Option<PlanId> {
        self.allowed.contains(raw).then(|| PlanId(raw.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_listed_plan() {
        let catalog = PlanCatalog::new(["pro_monthly", "pro_yearly"]);
        assert_eq!(
            catalog.recognize("pro_yearly").map(|p| p.as_str().to_string()),
            Some("pro_yearly".to_string())
        );
    }

    #[test]
    fn rejects_unlisted_plan() {
        let catalog = PlanCatalog::new(["pro_monthly"]);
        assert!(catalog.recognize("pro_lifetime_free").is_none());
    }

    #[test]
    fn from_csv_trims_and_drops_blanks() {
        let catalog = PlanCatalog::from_csv(" pro_monthly, ,pro_yearly,");
        assert_eq!(catalog.len(), 2);
        assert!(catalog.recognize("pro_monthly").is_some());
    }

    #[test]
    fn empty_catalog_recognizes_nothing() {
        let catalog = PlanCatalog::default();
        assert!(catalog.is_empty());
        assert!(catalog.recognize("").is_none());
    }
}
