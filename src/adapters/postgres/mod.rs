//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresEntitlementStore` - entitlement columns of the `users` row
//! - `PostgresCustomerLinkRepository` - `billing_customer_links` index
//!
//! The PostgreSQL idempotency ledger lives in `adapters::ledger`.

mod customer_link_repository;
mod entitlement_store;

pub use customer_link_repository::PostgresCustomerLinkRepository;
pub use entitlement_store::PostgresEntitlementStore;
