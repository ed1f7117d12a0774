//! Identity configuration: bearer validation and the claims API

use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the session issuer
    pub jwt_secret: String,

    /// Expected `iss` on bearer tokens
    pub jwt_issuer: String,

    /// Base URL of the identity provider's admin API
    pub claims_api_url: String,

    /// Service token for the admin API
    pub claims_api_token: String,
}

impl AuthConfig {
    /// In production the claims API must be HTTPS and the JWT secret at
    /// least 32 bytes.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.jwt_secret.is_empty() {
            return Err(ValidationError::MissingRequired("AUTH__JWT_SECRET"));
        }
        if self.jwt_issuer.is_empty() {
            return Err(ValidationError::MissingRequired("AUTH__JWT_ISSUER"));
        }
        if self.claims_api_url.is_empty() {
            return Err(ValidationError::MissingRequired("AUTH__CLAIMS_API_URL"));
        }
        if self.claims_api_token.is_empty() {
            return Err(ValidationError::MissingRequired("AUTH__CLAIMS_API_TOKEN"));
        }
        if !self.claims_api_url.starts_with("http://") && !self.claims_api_url.starts_with("https://")
        {
            return Err(ValidationError::InvalidClaimsApiUrl);
        }

        if *environment == Environment::Production {
            if !self.claims_api_url.starts_with("https://") {
                return Err(ValidationError::ClaimsApiMustBeHttps);
            }
            if self.jwt_secret.len() < 32 {
                return Err(ValidationError::JwtSecretTooShort);
            }
        }

        Ok(())
    }
}
