//! Idempotency ledger backend selection

use serde::Deserialize;

use super::error::ValidationError;
use super::redis::RedisConfig;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Postgres,
    Redis,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub backend: LedgerBackend,
}

impl LedgerConfig {
    /// The Redis backend needs a Redis section.
    pub fn validate(&self, redis: Option<&RedisConfig>) -> Result<(), ValidationError> {
        match (self.backend, redis) {
            (LedgerBackend::Redis, None) => Err(ValidationError::RedisRequiredForLedger),
            (LedgerBackend::Redis, Some(redis)) => redis.validate(),
            (LedgerBackend::Postgres, _) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_is_the_default() {
        assert_eq!(LedgerConfig::default().backend, LedgerBackend::Postgres);
        assert!(LedgerConfig::default().validate(None).is_ok());
    }

    #[test]
    fn redis_backend_requires_redis_section() {
        let config = LedgerConfig {
            backend: LedgerBackend::Redis,
        };
        assert_eq!(
            config.validate(None),
            Err(ValidationError::RedisRequiredForLedger)
        );

        let redis = RedisConfig {
            url: "redis://localhost:6379".to_string(),
            connect_timeout_secs: 5,
        };
        assert!(config.validate(Some(&redis)).is_ok());
    }
}
