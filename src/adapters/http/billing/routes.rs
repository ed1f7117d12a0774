//! Axum router for the billing endpoints.

use axum::{
    middleware,
    routing::{post, put},
    Router,
};

use crate::adapters::http::middleware::auth_middleware;

use super::handlers::{
    receive_billing_webhook, reconcile_self, reconcile_user, relink_customer, BillingAppState,
};

/// Webhook routes. Authenticated by signature, so no bearer layer.
///
/// - `POST /api/webhooks/billing`
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/api/webhooks/billing", post(receive_billing_webhook))
}

/// Bearer-authenticated callable routes.
///
/// - `POST /api/billing/reconcile` - caller's own uid
/// - `POST /api/admin/billing/reconcile/:uid` - admin only
/// - `PUT /api/admin/billing/customer-links/:customer_id` - admin only
pub fn callable_routes(state: &BillingAppState) -> Router<BillingAppState> {
    Router::new()
        .route("/api/billing/reconcile", post(reconcile_self))
        .route("/api/admin/billing/reconcile/:uid", post(reconcile_user))
        .route(
            "/api/admin/billing/customer-links/:customer_id",
            put(relink_customer),
        )
        .layer(middleware::from_fn_with_state(
            state.session_validator.clone(),
            auth_middleware,
        ))
}

/// The complete billing API.
///
/// ```ignore
/// let app = billing_router(state).layer(TraceLayer::new_for_http());
/// ```
pub fn billing_router(state: BillingAppState) -> Router {
    Router::new()
        .merge(webhook_routes())
        .merge(callable_routes(&state))
        .with_state(state)
}
