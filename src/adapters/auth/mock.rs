//! Mock session validator for testing.
//!
//! # Example
//!
//! ```ignore
//! let validator = MockSessionValidator::new()
//!     .with_user("user-token", "user-1")
//!     .with_admin("admin-token", "ops");
//!
//! let caller = validator.validate("user-token").await?;
//! ```

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, Caller, UserId};
use crate::ports::SessionValidator;

/// Maps fixed tokens to callers. Unknown tokens are `InvalidToken`.
#[derive(Debug, Default)]
pub struct MockSessionValidator {
    tokens: RwLock<HashMap<String, Caller>>,
    force_error: RwLock<Option<AuthError>>,
}

impl MockSessionValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `token` as a regular caller with `uid`.
    pub fn with_user(self, token: impl Into<String>, uid: &str) -> Self {
        self.with_caller(token, Caller::user(test_uid(uid)))
    }

    /// Accepts `token` as an admin caller with `uid`.
    pub fn with_admin(self, token: impl Into<String>, uid: &str) -> Self {
        self.with_caller(token, Caller::admin(test_uid(uid)))
    }

    pub fn with_caller(self, token: impl Into<String>, caller: Caller) -> Self {
        self.tokens
            .write()
            .expect("MockSessionValidator: lock poisoned")
            .insert(token.into(), caller);
        self
    }

    /// Forces every validation to return `error`.
    pub fn with_error(self, error: AuthError) -> Self {
        *self
            .force_error
            .write()
            .expect("MockSessionValidator: lock poisoned") = Some(error);
        self
    }
}

fn test_uid(uid: &str) -> UserId {
    UserId::new(uid).expect("MockSessionValidator: uid must not be blank")
}

#[async_trait]
impl SessionValidator for MockSessionValidator {
    async fn validate(&self, token: &str) -> Result<Caller, AuthError> {
        if let Some(error) = self
            .force_error
            .read()
            .expect("MockSessionValidator: lock poisoned")
            .clone()
        {
            return Err(error);
        }

        self.tokens
            .read()
            .expect("MockSessionValidator: lock poisoned")
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_tokens_map_to_callers() {
        let validator = MockSessionValidator::new()
            .with_user("t-user", "user-1")
            .with_admin("t-admin", "ops");

        assert!(!validator.validate("t-user").await.unwrap().is_admin);
        assert!(validator.validate("t-admin").await.unwrap().is_admin);
        assert!(matches!(
            validator.validate("nope").await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn forced_error_wins() {
        let validator = MockSessionValidator::new()
            .with_user("t-user", "user-1")
            .with_error(AuthError::ServiceUnavailable("down".to_string()));

        assert!(validator.validate("t-user").await.unwrap_err().is_transient());
    }
}
