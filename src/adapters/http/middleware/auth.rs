//! Bearer-token middleware and extractors for the callable endpoints.
//!
//! ```text
//! Request → auth_middleware → Caller in extensions
//!                                  ↓
//!                   RequireAuth / RequireAdmin read it back
//! ```
//!
//! The webhook route is mounted outside this layer; it authenticates by
//! signature.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::domain::foundation::{AuthError, Caller};
use crate::ports::SessionValidator;

pub type AuthState = Arc<dyn SessionValidator>;

fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}

/// Validates a bearer token when one is present.
///
/// A valid token puts its `Caller` into the request extensions. A bad token
/// is rejected here. No token passes through, leaving enforcement to the
/// extractors.
pub async fn auth_middleware(
    State(validator): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return next.run(request).await;
    };

    match validator.validate(&token).await {
        Ok(caller) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        Err(e) => AuthRejection::from(e).into_response(),
    }
}

/// Requires an authenticated caller.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub Caller);

impl<S> axum::extract::FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            parts
                .extensions
                .get::<Caller>()
                .cloned()
                .map(RequireAuth)
                .ok_or(AuthRejection::MissingToken)
        })
    }
}

/// Requires an authenticated caller holding the admin claim.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub Caller);

impl<S> axum::extract::FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let caller = parts
                .extensions
                .get::<Caller>()
                .cloned()
                .ok_or(AuthRejection::MissingToken)?;
            if !caller.is_admin {
                tracing::warn!(uid = %caller.uid, "Non-admin caller rejected from admin route");
                return Err(AuthRejection::Forbidden);
            }
            Ok(RequireAdmin(caller))
        })
    }
}

#[derive(Debug)]
pub enum AuthRejection {
    MissingToken,
    InvalidToken,
    TokenExpired,
    Forbidden,
    Unavailable,
}

impl From<AuthError> for AuthRejection {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidToken => AuthRejection::InvalidToken,
            AuthError::TokenExpired => AuthRejection::TokenExpired,
            AuthError::InsufficientPermissions => AuthRejection::Forbidden,
            AuthError::ServiceUnavailable(msg) => {
                tracing::error!(error = %msg, "Session validation unavailable");
                AuthRejection::Unavailable
            }
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthRejection::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "AUTHENTICATION_REQUIRED",
                "Authentication is required",
            ),
            AuthRejection::InvalidToken => {
                (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", "Invalid token")
            }
            AuthRejection::TokenExpired => {
                (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED", "Token expired")
            }
            AuthRejection::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Administrative access is required",
            ),
            AuthRejection::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "AUTH_UNAVAILABLE",
                "Authentication service unavailable",
            ),
        };

        (
            status,
            Json(serde_json::json!({
                "error": message,
                "code": code
            })),
        )
            .into_response()
    }
}
