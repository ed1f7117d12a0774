//! Entitlement Engine - billing webhooks to premium entitlements
//!
//! Turns Stripe subscription lifecycle events into a per-user `isPro`
//! entitlement, mirrored as a custom claim on the identity provider, and
//! periodically reconciles every linked customer against the provider's
//! current state.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
