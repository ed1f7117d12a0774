//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Storage Ports
//!
//! - `IdempotencyLedger` - exactly-once gate keyed by event id
//! - `EntitlementStore` - per-user entitlement projection
//! - `CustomerLinkRepository` - customer id → uid index
//!
//! ## External Service Ports
//!
//! - `BillingProvider` - subscription billing system of record
//! - `ClaimsSync` - identity provider custom claims
//! - `SessionValidator` - bearer token validation

mod billing_provider;
mod claims_sync;
mod customer_link_repository;
mod entitlement_store;
mod idempotency_ledger;
mod session_validator;

pub use billing_provider::{
    BillingProvider, ChargeRef, CheckoutSessionRef, CustomerRef, InvoiceRef, ProviderError,
    ProviderErrorCode,
};
pub use claims_sync::{entitlement_claims, ClaimsError, ClaimsSync, IS_PRO_CLAIM};
pub use customer_link_repository::{CustomerLink, CustomerLinkRepository, LinkOutcome};
pub use entitlement_store::EntitlementStore;
pub use idempotency_ledger::{ClaimResult, IdempotencyLedger, IdempotencyMarker, ProcessingOutcome};
pub use session_validator::SessionValidator;
