//! Claims sync port - mirrors entitlement into identity-provider claims.
//!
//! Claims are a cache of the stored record so clients can gate features
//! without a read. Failures here never undo or block the record write.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::foundation::UserId;

/// Custom claim key carrying the premium flag.
pub const IS_PRO_CLAIM: &str = "isPro";

/// Errors from the identity provider's admin API.
#[derive(Debug, Clone, Error)]
pub enum ClaimsError {
    #[error("User not found in identity provider: {0}")]
    UserNotFound(String),

    #[error("Identity provider rejected the request: {0}")]
    Rejected(String),

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ClaimsSync: Send + Sync {
    /// Merge `claims` into the user's existing custom claims.
    async fn merge_claims(&self, uid: &UserId, claims: Map<String, Value>)
        -> Result<(), ClaimsError>;
}

/// Builds the claims object for an entitlement flag.
pub fn entitlement_claims(is_pro: bool) -> Map<String, Value> {
    let mut claims = Map::new();
    claims.insert(IS_PRO_CLAIM.to_string(), Value::Bool(is_pro));
    claims
}
