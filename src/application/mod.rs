//! Application layer - Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.

pub mod handlers;

pub use handlers::billing::{
    EntitlementError, ProcessWebhookHandler, ReconcileEntitlementsHandler, ReconcileOutcome,
    RelinkCustomerHandler, SweepReport, WebhookOutcome,
};
