//! Stripe billing provider adapter.
//!
//! Implements the `BillingProvider` port for Stripe, including:
//! - Subscription, invoice, charge, checkout session and customer lookups
//! - Customer subscription listing for reconciliation
//! - Metadata back-fill of the internal user id
//!
//! Webhook signatures are verified in the domain layer before any of this
//! runs; the adapter only talks to the REST API.
//!
//! # Configuration
//!
//! Required settings:
//! - `billing.stripe_api_key`: Stripe secret API key

mod mock_billing_provider;
mod stripe_adapter;
mod webhook_types;

pub use mock_billing_provider::{MethodCall, MockBillingProvider};
pub use stripe_adapter::{StripeBillingAdapter, StripeConfig};
pub use webhook_types::{
    decode_subscription, Expandable, StripeCharge, StripeCheckoutSession, StripeCustomer,
    StripeInvoice, StripeList, StripeSubscription,
};
