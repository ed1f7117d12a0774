//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, caller identity and error types
//! that form the vocabulary of the entitlement domain.

mod auth;
mod errors;
mod ids;
mod timestamp;

pub use auth::{AuthError, Caller};
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{CustomerId, SubscriptionId, SweepRunId, UserId};
pub use timestamp::Timestamp;
