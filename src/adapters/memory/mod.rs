//! In-memory storage adapters for tests and local runs.

mod customer_link_repository;
mod entitlement_store;

pub use customer_link_repository::InMemoryCustomerLinkRepository;
pub use entitlement_store::InMemoryEntitlementStore;
