//! In-memory entitlement store for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::billing::EntitlementRecord;
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::EntitlementStore;

/// Keeps one record per uid and counts writes for assertions.
pub struct InMemoryEntitlementStore {
    records: RwLock<HashMap<UserId, EntitlementRecord>>,
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryEntitlementStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            writes: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// A store whose every call fails with a database error.
    pub fn failing() -> Self {
        let store = Self::new();
        store.failing.store(true, Ordering::SeqCst);
        store
    }

    // === Test Helpers ===

    /// Successful upserts so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Distinct users with a record.
    pub fn record_count(&self) -> usize {
        self.records
            .read()
            .expect("InMemoryEntitlementStore: lock poisoned")
            .len()
    }

    fn check_available(&self) -> Result<(), DomainError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::database("Entitlement store unavailable"));
        }
        Ok(())
    }
}

impl Default for InMemoryEntitlementStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn upsert(&self, record: &EntitlementRecord) -> Result<(), DomainError> {
        self.check_available()?;
        self.records
            .write()
            .expect("InMemoryEntitlementStore: lock poisoned")
            .insert(record.uid.clone(), record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, uid: &UserId) -> Result<Option<EntitlementRecord>, DomainError> {
        self.check_available()?;
        Ok(self
            .records
            .read()
            .expect("InMemoryEntitlementStore: lock poisoned")
            .get(uid)
            .cloned())
    }
}
