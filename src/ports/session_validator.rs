//! Session validation port for bearer tokens.
//!
//! Used only by the callable reconcile and admin endpoints. Implementations
//! must validate signature, issuer and expiry.

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, Caller};

/// Validates access tokens and extracts the caller.
///
/// # Contract
///
/// - `AuthError::InvalidToken` for malformed or badly signed tokens
/// - `AuthError::TokenExpired` for expired tokens
/// - `AuthError::ServiceUnavailable` for transient errors
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// Validate a raw token (without the "Bearer " prefix).
    async fn validate(&self, token: &str) -> Result<Caller, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;
    use std::collections::HashMap;
    use std::sync::RwLock;

    struct TestSessionValidator {
        tokens: RwLock<HashMap<String, Caller>>,
    }

    #[async_trait]
    impl SessionValidator for TestSessionValidator {
        async fn validate(&self, token: &str) -> Result<Caller, AuthError> {
            self.tokens
                .read()
                .unwrap()
                .get(token)
                .cloned()
                .ok_or(AuthError::InvalidToken)
        }
    }

    #[tokio::test]
    async fn session_validator_returns_caller_for_known_token() {
        let mut tokens = HashMap::new();
        tokens.insert(
            "token-1".to_string(),
            Caller::user(UserId::new("user-123").unwrap()),
        );
        let validator = TestSessionValidator {
            tokens: RwLock::new(tokens),
        };

        let caller = validator.validate("token-1").await.unwrap();
        assert_eq!(caller.uid.as_str(), "user-123");

        let missing = validator.validate("other").await;
        assert!(matches!(missing, Err(AuthError::InvalidToken)));
    }

    #[test]
    fn session_validator_trait_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn SessionValidator>();
    }
}
