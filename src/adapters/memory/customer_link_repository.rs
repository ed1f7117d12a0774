//! In-memory customer link index for testing.
//!
//! Ordered by customer id so batch listing matches the PostgreSQL adapter.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::foundation::{CustomerId, DomainError, UserId};
use crate::ports::{CustomerLink, CustomerLinkRepository, LinkOutcome};

pub struct InMemoryCustomerLinkRepository {
    links: RwLock<BTreeMap<CustomerId, CustomerLink>>,
}

impl InMemoryCustomerLinkRepository {
    pub fn new() -> Self {
        Self {
            links: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.links
            .read()
            .expect("InMemoryCustomerLinkRepository: lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryCustomerLinkRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CustomerLinkRepository for InMemoryCustomerLinkRepository {
    async fn link_if_absent(&self, link: &CustomerLink) -> Result<LinkOutcome, DomainError> {
        let mut links = self
            .links
            .write()
            .expect("InMemoryCustomerLinkRepository: lock poisoned");

        match links.get(&link.customer_id) {
            Some(existing) if existing.uid == link.uid => Ok(LinkOutcome::AlreadyLinked),
            Some(existing) => Ok(LinkOutcome::Conflict {
                existing_uid: existing.uid.clone(),
            }),
            None => {
                links.insert(link.customer_id.clone(), link.clone());
                Ok(LinkOutcome::Created)
            }
        }
    }

    async fn find_by_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerLink>, DomainError> {
        Ok(self
            .links
            .read()
            .expect("InMemoryCustomerLinkRepository: lock poisoned")
            .get(customer_id)
            .cloned())
    }

    async fn find_by_uid(&self, uid: &UserId) -> Result<Vec<CustomerLink>, DomainError> {
        let mut found: Vec<CustomerLink> = self
            .links
            .read()
            .expect("InMemoryCustomerLinkRepository: lock poisoned")
            .values()
            .filter(|l| l.uid == *uid)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.linked_at.cmp(&a.linked_at));
        Ok(found)
    }

    async fn relink(&self, link: &CustomerLink) -> Result<Option<UserId>, DomainError> {
        let previous = self
            .links
            .write()
            .expect("InMemoryCustomerLinkRepository: lock poisoned")
            .insert(link.customer_id.clone(), link.clone());
        Ok(previous.map(|l| l.uid))
    }

    async fn list_batch(
        &self,
        after: Option<&CustomerId>,
        limit: usize,
    ) -> Result<Vec<CustomerLink>, DomainError> {
        let links = self
            .links
            .read()
            .expect("InMemoryCustomerLinkRepository: lock poisoned");

        Ok(links
            .iter()
            .filter(|(id, _)| after.map_or(true, |cursor| *id > cursor))
            .take(limit)
            .map(|(_, link)| link.clone())
            .collect())
    }
}
