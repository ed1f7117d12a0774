//! Application handlers.
//!
//! Command handlers that orchestrate domain operations over ports.

pub mod billing;
