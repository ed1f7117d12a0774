//! Customer link port - the customer id → uid index.
//!
//! Links are monotonic. `link_if_absent` never changes an existing link;
//! only `relink`, reached from the admin endpoint, may.

use async_trait::async_trait;

use crate::domain::foundation::{CustomerId, DomainError, Timestamp, UserId};

/// Durable mapping from a billing customer to an internal user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerLink {
    pub customer_id: CustomerId,
    pub uid: UserId,
    pub linked_at: Timestamp,
}

impl CustomerLink {
    pub fn new(customer_id: CustomerId, uid: UserId) -> Self {
        Self {
            customer_id,
            uid,
            linked_at: Timestamp::now(),
        }
    }
}

/// Result of `link_if_absent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// No link existed; this one was written.
    Created,
    /// The same link already existed.
    AlreadyLinked,
    /// A link to a different uid exists and was left in place.
    Conflict { existing_uid: UserId },
}

#[async_trait]
pub trait CustomerLinkRepository: Send + Sync {
    /// Atomically create the link unless one exists for the customer.
    async fn link_if_absent(&self, link: &CustomerLink) -> Result<LinkOutcome, DomainError>;

    /// Look up the link for a customer.
    async fn find_by_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerLink>, DomainError>;

    /// Every customer linked to a uid, newest first.
    async fn find_by_uid(&self, uid: &UserId) -> Result<Vec<CustomerLink>, DomainError>;

    /// Administrative overwrite. Returns the uid previously linked, if any.
    async fn relink(&self, link: &CustomerLink) -> Result<Option<UserId>, DomainError>;

    /// Links ordered by customer id, strictly after `after`, at most `limit`.
    async fn list_batch(
        &self,
        after: Option<&CustomerId>,
        limit: usize,
    ) -> Result<Vec<CustomerLink>, DomainError>;
}
