//! Error types shared by the domain, ports and adapters.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Raised when a value object refuses its input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: String },
}

impl ValidationError {
    pub fn empty_field(field: impl Into<String>) -> Self {
        ValidationError::EmptyField { field: field.into() }
    }
}

/// Stable machine-readable error codes. HTTP status mapping keys off these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ValidationFailed,
    NotFound,
    /// No billing customer is linked to the uid.
    UserNotLinked,
    /// The customer is already linked to a different uid.
    CustomerLinkConflict,
    DatabaseError,
    CacheError,
    ExternalServiceError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::UserNotLinked => "USER_NOT_LINKED",
            ErrorCode::CustomerLinkConflict => "CUSTOMER_LINK_CONFLICT",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::CacheError => "CACHE_ERROR",
            ErrorCode::ExternalServiceError => "EXTERNAL_SERVICE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Infrastructure failures that a later attempt may clear.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorCode::DatabaseError | ErrorCode::CacheError | ErrorCode::ExternalServiceError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned across port boundaries.
///
/// `details` carries identifiers for logs (event id, uid, customer id) and
/// is never shown to callers.
#[derive(Debug, Clone, Error)]
#[error("[{code}] {message}")]
pub struct DomainError {
    pub code: ErrorCode,
    pub message: String,
    pub details: BTreeMap<String, String>,
}

impl DomainError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    /// Shorthand for storage adapters.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_transient(&self) -> bool {
        self.code.is_transient()
    }
}

impl From<ValidationError> for DomainError {
    fn from(err: ValidationError) -> Self {
        DomainError::new(ErrorCode::ValidationFailed, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_field_names_the_field() {
        let err = ValidationError::empty_field("uid");
        assert_eq!(err.to_string(), "Field 'uid' cannot be empty");
    }

    #[test]
    fn domain_error_displays_code_and_message() {
        let err = DomainError::new(ErrorCode::UserNotLinked, "No billing customer for user");
        assert_eq!(err.to_string(), "[USER_NOT_LINKED] No billing customer for user");
    }

    #[test]
    fn details_stay_out_of_display() {
        let err = DomainError::database("insert failed").with_detail("uid", "user-1");
        assert_eq!(err.details.get("uid").map(String::as_str), Some("user-1"));
        assert_eq!(err.to_string(), "[DATABASE_ERROR] insert failed");
    }

    #[test]
    fn only_infrastructure_codes_are_transient() {
        assert!(DomainError::database("down").is_transient());
        assert!(ErrorCode::CacheError.is_transient());
        assert!(!ErrorCode::ValidationFailed.is_transient());
        assert!(!ErrorCode::CustomerLinkConflict.is_transient());
    }

    #[test]
    fn validation_converts_to_validation_failed() {
        let err: DomainError = ValidationError::empty_field("customer_id").into();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }
}
