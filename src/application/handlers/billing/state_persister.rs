//! StatePersister - writes an entitlement and mirrors it into auth claims.
//!
//! The store write is the source of truth and must succeed. The claims
//! mirror is best-effort and catches up on the next successful sync.

use std::sync::Arc;

use crate::domain::billing::EntitlementRecord;
use crate::domain::foundation::UserId;
use crate::ports::{entitlement_claims, ClaimsSync, EntitlementStore};

use super::errors::EntitlementError;

/// Result of a persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistReport {
    pub claims_synced: bool,
}

#[derive(Clone)]
pub struct StatePersister {
    store: Arc<dyn EntitlementStore>,
    claims: Arc<dyn ClaimsSync>,
}

impl StatePersister {
    pub fn new(store: Arc<dyn EntitlementStore>, claims: Arc<dyn ClaimsSync>) -> Self {
        Self { store, claims }
    }

    pub async fn persist(&self, record: &EntitlementRecord) -> Result<PersistReport, EntitlementError> {
        self.store.upsert(record).await?;

        let claims_synced = match self
            .claims
            .merge_claims(&record.uid, entitlement_claims(record.is_pro))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    uid = %record.uid,
                    is_pro = record.is_pro,
                    error = %e,
                    "Claims sync failed, stored entitlement stands"
                );
                false
            }
        };

        Ok(PersistReport { claims_synced })
    }

    /// The stored entitlement for `uid`, if one was ever written.
    pub async fn current(&self, uid: &UserId) -> Result<Option<EntitlementRecord>, EntitlementError> {
        Ok(self.store.get(uid).await?)
    }
}
