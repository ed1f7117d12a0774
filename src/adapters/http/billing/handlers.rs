//! HTTP handlers for the billing endpoints.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::adapters::http::middleware::{AuthState, RequireAdmin, RequireAuth};
use crate::application::handlers::billing::{
    EntitlementError, ProcessWebhookHandler, ReconcileEntitlementsHandler, RelinkCustomerCommand,
    RelinkCustomerHandler,
};
use crate::domain::foundation::{CustomerId, ErrorCode, UserId, ValidationError};

use super::dto::{
    ErrorResponse, ReconcileResponse, RelinkCustomerRequest, RelinkCustomerResponse,
    WebhookAckResponse,
};

/// Header carrying the provider's webhook signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the billing routes. Cloned per request.
#[derive(Clone)]
pub struct BillingAppState {
    pub webhook_handler: Arc<ProcessWebhookHandler>,
    pub reconcile_handler: Arc<ReconcileEntitlementsHandler>,
    pub relink_handler: Arc<RelinkCustomerHandler>,
    pub session_validator: AuthState,
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Mapping
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub enum BillingApiError {
    Validation(ValidationError),
    Entitlement(EntitlementError),
}

impl From<ValidationError> for BillingApiError {
    fn from(err: ValidationError) -> Self {
        BillingApiError::Validation(err)
    }
}

impl From<EntitlementError> for BillingApiError {
    fn from(err: EntitlementError) -> Self {
        BillingApiError::Entitlement(err)
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            BillingApiError::Validation(e) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("VALIDATION_FAILED", e.to_string()),
            ),
            BillingApiError::Entitlement(EntitlementError::Storage(e)) => {
                let status = match e.code {
                    ErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
                    ErrorCode::NotFound | ErrorCode::UserNotLinked => StatusCode::NOT_FOUND,
                    ErrorCode::CustomerLinkConflict => StatusCode::CONFLICT,
                    _ => {
                        tracing::error!(error = %e, "Billing request failed on storage");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, ErrorResponse::new(e.code.to_string(), e.message()))
            }
            BillingApiError::Entitlement(EntitlementError::Provider(e)) => {
                tracing::error!(error = %e, "Billing request failed on provider");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse::new("PROVIDER_ERROR", e.message.clone()),
                )
            }
        };
        (status, Json(error)).into_response()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/billing
///
/// 200 for anything the provider should stop delivering, 400 for bad
/// signatures or bodies, 500 when a redelivery may succeed.
pub async fn receive_billing_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    match state.webhook_handler.handle(&body, signature).await {
        Ok(outcome) => (StatusCode::OK, Json(WebhookAckResponse::from(outcome))).into_response(),
        Err(e) => {
            let status = e.status_code();
            if e.is_retryable() {
                tracing::error!(error = %e, "Webhook processing failed, provider will retry");
            } else {
                tracing::warn!(error = %e, "Webhook rejected");
            }
            let code = if e.is_retryable() {
                "WEBHOOK_RETRY"
            } else {
                "WEBHOOK_REJECTED"
            };
            (status, Json(ErrorResponse::new(code, e.to_string()))).into_response()
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Callable Reconcile
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/billing/reconcile - reconcile the caller's own entitlement
pub async fn reconcile_self(
    State(state): State<BillingAppState>,
    RequireAuth(caller): RequireAuth,
) -> Result<impl IntoResponse, BillingApiError> {
    let outcome = state.reconcile_handler.reconcile_user(&caller.uid).await?;
    Ok(Json(ReconcileResponse::new(&caller.uid, outcome)))
}

/// POST /api/admin/billing/reconcile/:uid
pub async fn reconcile_user(
    State(state): State<BillingAppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(uid): Path<String>,
) -> Result<impl IntoResponse, BillingApiError> {
    let uid = UserId::new(uid)?;

    tracing::info!(uid = %uid, admin_uid = %admin.uid, "Admin reconcile requested");
    let outcome = state.reconcile_handler.reconcile_user(&uid).await?;
    Ok(Json(ReconcileResponse::new(&uid, outcome)))
}

/// PUT /api/admin/billing/customer-links/:customer_id
pub async fn relink_customer(
    State(state): State<BillingAppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(customer_id): Path<String>,
    Json(request): Json<RelinkCustomerRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let customer_id = CustomerId::new(customer_id)?;
    let uid = UserId::new(request.uid)?;

    let result = state
        .relink_handler
        .handle(
            RelinkCustomerCommand {
                customer_id: customer_id.clone(),
                uid: uid.clone(),
            },
            &admin,
        )
        .await?;

    Ok(Json(RelinkCustomerResponse::new(&customer_id, &uid, result)))
}
