//! Authentication types for the domain layer.
//!
//! A `Caller` is what the `SessionValidator` port extracts from a bearer
//! credential on the callable reconcile endpoints. The webhook path never
//! sees one; it is authenticated by signature instead.

use super::UserId;
use thiserror::Error;

/// Authenticated caller extracted from a validated bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// The caller's uid.
    pub uid: UserId,

    /// Whether the token carries the `admin` claim.
    pub is_admin: bool,
}

impl Caller {
    /// Creates a regular (non-admin) caller.
    pub fn user(uid: UserId) -> Self {
        Self {
            uid,
            is_admin: false,
        }
    }

    /// Creates an administrative caller.
    pub fn admin(uid: UserId) -> Self {
        Self {
            uid,
            is_admin: true,
        }
    }

    /// Returns true if this caller may act on the given uid.
    pub fn may_act_for(&self, uid: &UserId) -> bool {
        self.is_admin || &self.uid == uid
    }
}

/// Authentication errors that can occur during token validation.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The token is missing, malformed, or has an invalid signature.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// The token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// Caller is authenticated but lacks the required role.
    #[error("Insufficient permissions")]
    InsufficientPermissions,

    /// The authentication service is unavailable.
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AuthError {
    /// Returns true if this is a transient error that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::ServiceUnavailable(_))
    }
}
