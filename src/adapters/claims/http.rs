//! Identity provider admin API client for custom claims.
//!
//! Claims are replaced wholesale by the provider, so a merge is a read of
//! the current claims followed by a write of the union.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::foundation::UserId;
use crate::ports::{ClaimsError, ClaimsSync};

/// Configuration for the claims API.
#[derive(Clone)]
pub struct ClaimsApiConfig {
    /// Base URL, e.g. `https://auth.example.com/admin/v1`.
    pub base_url: String,
    token: SecretString,
    pub request_timeout: Duration,
}

impl ClaimsApiConfig {
    pub fn new(base_url: impl Into<String>, token: SecretString) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ClaimsBody {
    #[serde(default)]
    claims: Map<String, Value>,
}

pub struct HttpClaimsSync {
    config: ClaimsApiConfig,
    http_client: reqwest::Client,
}

impl HttpClaimsSync {
    pub fn new(config: ClaimsApiConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            http_client,
        }
    }

    fn claims_url(&self, uid: &UserId) -> String {
        format!("{}/users/{}/claims", self.config.base_url, uid)
    }

    fn map_status(status: reqwest::StatusCode, uid: &UserId, body: String) -> ClaimsError {
        if status == reqwest::StatusCode::NOT_FOUND {
            ClaimsError::UserNotFound(uid.to_string())
        } else if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            ClaimsError::Unavailable(format!("{}: {}", status, body))
        } else {
            ClaimsError::Rejected(format!("{}: {}", status, body))
        }
    }

    async fn current_claims(&self, uid: &UserId) -> Result<Map<String, Value>, ClaimsError> {
        let response = self
            .http_client
            .get(self.claims_url(uid))
            .bearer_auth(self.config.token.expose_secret())
            .send()
            .await
            .map_err(|e| ClaimsError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, uid, body));
        }

        let body: ClaimsBody = response
            .json()
            .await
            .map_err(|e| ClaimsError::Unavailable(format!("Invalid claims response: {}", e)))?;
        Ok(body.claims)
    }
}

/// Overlays `updates` onto `current`.
fn merged(mut current: Map<String, Value>, updates: Map<String, Value>) -> Map<String, Value> {
    current.extend(updates);
    current
}

#[async_trait]
impl ClaimsSync for HttpClaimsSync {
    async fn merge_claims(
        &self,
        uid: &UserId,
        claims: Map<String, Value>,
    ) -> Result<(), ClaimsError> {
        let current = self.current_claims(uid).await?;
        let body = ClaimsBody {
            claims: merged(current, claims),
        };

        let response = self
            .http_client
            .put(self.claims_url(uid))
            .bearer_auth(self.config.token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ClaimsError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, uid, body));
        }

        tracing::debug!(uid = %uid, "Custom claims updated");
        Ok(())
    }
}
