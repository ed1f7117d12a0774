//! Billing entitlement handlers.
//!
//! - `ProcessWebhookHandler` - verified webhook → entitlement write
//! - `ReconcileEntitlementsHandler` - scheduled sweep and on-demand reconcile
//! - `RelinkCustomerHandler` - administrative customer re-link

mod errors;
mod event_router;
mod identity_resolver;
mod process_webhook;
mod reconcile_entitlements;
mod relink_customer;
mod state_persister;

pub use errors::EntitlementError;
pub use event_router::{EventRouter, RoutedEvent};
pub use identity_resolver::{IdentityResolver, ResolvedIdentity};
pub use process_webhook::{ProcessWebhookHandler, WebhookOutcome, WebhookPipelineConfig};
pub use reconcile_entitlements::{
    ReconcileEntitlementsHandler, ReconcileOutcome, SweepConfig, SweepFailure, SweepReport,
};
pub use relink_customer::{RelinkCustomerCommand, RelinkCustomerHandler, RelinkCustomerResult};
pub use state_persister::{PersistReport, StatePersister};
