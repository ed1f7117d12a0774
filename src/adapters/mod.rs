//! Adapters - Implementations of port interfaces.
//!
//! - `stripe` - billing provider client and test double
//! - `ledger` - idempotency ledger (PostgreSQL, Redis, in-memory)
//! - `postgres` - entitlement store and customer links
//! - `memory` - in-memory stores for tests and local runs
//! - `claims` - custom-claims sync against the identity provider
//! - `auth` - bearer session validation
//! - `http` - axum routes and middleware
//! - `scheduler` - background reconciliation sweep

pub mod auth;
pub mod claims;
pub mod http;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod scheduler;
pub mod stripe;

pub use scheduler::{SweepScheduler, SweepSchedulerConfig};
