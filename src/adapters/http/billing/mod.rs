//! HTTP adapter for billing.
//!
//! - `POST /api/webhooks/billing` - provider webhooks
//! - `POST /api/billing/reconcile` - reconcile the caller
//! - `POST /api/admin/billing/reconcile/:uid` - reconcile any user
//! - `PUT /api/admin/billing/customer-links/:customer_id` - re-link a customer

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{BillingApiError, BillingAppState, SIGNATURE_HEADER};
pub use routes::billing_router;
