//! Recording claims sync for testing.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::foundation::UserId;
use crate::ports::{ClaimsError, ClaimsSync, IS_PRO_CLAIM};

/// Keeps merged claims per uid, or fails every call.
#[derive(Debug, Default)]
pub struct RecordingClaimsSync {
    claims: RwLock<HashMap<String, Map<String, Value>>>,
    failing: bool,
}

impl RecordingClaimsSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every merge fails as unavailable.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// The `isPro` claim last written for `uid`.
    pub fn is_pro(&self, uid: &str) -> Option<bool> {
        self.claims
            .read()
            .expect("RecordingClaimsSync: lock poisoned")
            .get(uid)
            .and_then(|c| c.get(IS_PRO_CLAIM))
            .and_then(Value::as_bool)
    }
}

#[async_trait]
impl ClaimsSync for RecordingClaimsSync {
    async fn merge_claims(
        &self,
        uid: &UserId,
        claims: Map<String, Value>,
    ) -> Result<(), ClaimsError> {
        if self.failing {
            return Err(ClaimsError::Unavailable("recording sync set to fail".to_string()));
        }
        self.claims
            .write()
            .expect("RecordingClaimsSync: lock poisoned")
            .entry(uid.as_str().to_string())
            .or_default()
            .extend(claims);
        Ok(())
    }
}
