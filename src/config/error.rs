//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Redis ledger backend selected but redis.url is not set")]
    RedisRequiredForLedger,

    #[error("Invalid Stripe API key format")]
    InvalidStripeKey,

    #[error("Invalid Stripe webhook secret format")]
    InvalidStripeWebhookSecret,

    #[error("No plan ids are allow-listed")]
    EmptyPlanAllowList,

    #[error("Invalid webhook timeout")]
    InvalidWebhookTimeout,

    #[error("Invalid claims API URL")]
    InvalidClaimsApiUrl,

    #[error("Claims API must use HTTPS in production")]
    ClaimsApiMustBeHttps,

    #[error("JWT secret must be at least 32 bytes in production")]
    JwtSecretTooShort,

    #[error("Reconciliation batch size must be between 1 and 1000")]
    InvalidBatchSize,

    #[error("Reconciliation concurrency must be between 1 and 64")]
    InvalidConcurrency,

    #[error("Reconciliation interval must be at least 60 seconds")]
    InvalidSweepInterval,

    #[error("Ledger retention must be at least 1 day")]
    InvalidRetention,
}
