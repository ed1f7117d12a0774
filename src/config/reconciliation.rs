//! Reconciliation sweep configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationConfig {
    /// Run the background sweep
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Customer links per sweep batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Users reconciled in parallel within a batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Age in days at which ledger markers are pruned
    #[serde(default = "default_retention_days")]
    pub ledger_retention_days: u32,
}

impl ReconciliationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ValidationError::InvalidBatchSize);
        }
        if self.concurrency == 0 || self.concurrency > 64 {
            return Err(ValidationError::InvalidConcurrency);
        }
        if self.interval_secs < 60 {
            return Err(ValidationError::InvalidSweepInterval);
        }
        if self.ledger_retention_days == 0 {
            return Err(ValidationError::InvalidRetention);
        }
        Ok(())
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            ledger_retention_days: default_retention_days(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_interval() -> u64 {
    900
}

fn default_batch_size() -> usize {
    100
}

fn default_concurrency() -> usize {
    4
}

fn default_retention_days() -> u32 {
    90
}
