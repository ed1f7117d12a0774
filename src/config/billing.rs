//! Billing provider configuration (Stripe)

use serde::Deserialize;
use std::time::Duration;

use crate::domain::billing::PlanCatalog;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    pub stripe_api_key: String,

    /// Webhook signing secret (`whsec_...`)
    pub stripe_webhook_secret: String,

    /// Comma-separated plan (price) ids that grant Pro
    pub allowed_plan_ids: String,

    /// Budget for the webhook pipeline after signature verification
    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,

    /// Drop events whose `livemode` is false
    #[serde(default)]
    pub require_livemode: bool,

    /// Override for the Stripe API base URL
    pub api_base_url: Option<String>,
}

impl BillingConfig {
    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key.starts_with("sk_test_")
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }

    pub fn plan_catalog(&self) -> PlanCatalog {
        PlanCatalog::from_csv(&self.allowed_plan_ids)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stripe_api_key.is_empty() {
            return Err(ValidationError::MissingRequired("BILLING__STRIPE_API_KEY"));
        }
        if self.stripe_webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired(
                "BILLING__STRIPE_WEBHOOK_SECRET",
            ));
        }
        if !self.stripe_api_key.starts_with("sk_") && !self.stripe_api_key.starts_with("rk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !self.stripe_webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        if self.plan_catalog().is_empty() {
            return Err(ValidationError::EmptyPlanAllowList);
        }
        if self.webhook_timeout_secs == 0 || self.webhook_timeout_secs > 60 {
            return Err(ValidationError::InvalidWebhookTimeout);
        }
        Ok(())
    }
}

fn default_webhook_timeout() -> u64 {
    20
}
