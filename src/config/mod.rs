//! Application configuration module
//!
//! Configuration is read from environment variables with the
//! `ENTITLEMENT_ENGINE` prefix; nested values use `__` as the separator.
//! A `.env` file is loaded first when present.
//!
//! # Example
//!
//! ```no_run
//! use entitlement_engine::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod auth;
mod billing;
mod database;
mod error;
mod ledger;
mod reconciliation;
mod redis;
mod server;

pub use auth::AuthConfig;
pub use billing::BillingConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use ledger::{LedgerBackend, LedgerConfig};
pub use reconciliation::ReconciliationConfig;
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    /// Only needed for the Redis ledger backend
    #[serde(default)]
    pub redis: Option<RedisConfig>,

    #[serde(default)]
    pub ledger: LedgerConfig,

    pub billing: BillingConfig,

    pub auth: AuthConfig,

    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
}

impl AppConfig {
    /// Loads configuration from the environment.
    ///
    /// - `ENTITLEMENT_ENGINE__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `ENTITLEMENT_ENGINE__BILLING__ALLOWED_PLAN_IDS=price_a,price_b`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or a value
    /// does not parse.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("ENTITLEMENT_ENGINE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Semantic validation across all sections.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        if let Some(redis) = &self.redis {
            redis.validate()?;
        }
        self.ledger.validate(self.redis.as_ref())?;
        self.billing.validate()?;
        self.auth.validate(&self.server.environment)?;
        self.reconciliation.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
