//! Entitlement store port - the user's durable entitlement projection.

use async_trait::async_trait;

use crate::domain::billing::EntitlementRecord;
use crate::domain::foundation::{DomainError, UserId};

/// Stores the current entitlement of each user.
///
/// `upsert` is a merge-write: it replaces the entitlement fields of the
/// user's record and leaves every other field of that record untouched.
/// Writing the same record twice has the same effect as writing it once.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Create or overwrite the entitlement fields for `record.uid`.
    async fn upsert(&self, record: &EntitlementRecord) -> Result<(), DomainError>;

    /// Read back the stored entitlement.
    async fn get(&self, uid: &UserId) -> Result<Option<EntitlementRecord>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entitlement_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn EntitlementStore) {}
    }
}
