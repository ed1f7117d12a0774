//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, caller, errors)
//! - `billing` - Billing events, subscription snapshots and entitlement rules

pub mod billing;
pub mod foundation;
