//! PostgreSQL idempotency ledger.
//!
//! A claim is a single `INSERT ... ON CONFLICT DO NOTHING` on the primary
//! key; `rows_affected` tells the caller whether it won.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::{ClaimResult, IdempotencyLedger, IdempotencyMarker, ProcessingOutcome};

pub struct PostgresIdempotencyLedger {
    pool: PgPool,
}

impl PostgresIdempotencyLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn claim_result(rows_affected: u64) -> ClaimResult {
    if rows_affected == 1 {
        ClaimResult::Acquired
    } else {
        ClaimResult::AlreadyProcessed
    }
}

#[async_trait]
impl IdempotencyLedger for PostgresIdempotencyLedger {
    async fn claim(&self, marker: &IdempotencyMarker) -> Result<ClaimResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO billing_event_ledger (event_id, event_type, occurred_at, claimed_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&marker.event_id)
        .bind(&marker.event_type)
        .bind(marker.occurred_at.as_datetime())
        .bind(marker.claimed_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to claim event: {}", e))
                .with_detail("event_id", marker.event_id.clone())
        })?;

        Ok(claim_result(result.rows_affected()))
    }

    async fn record_outcome(
        &self,
        event_id: &str,
        outcome: &ProcessingOutcome,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            UPDATE billing_event_ledger
            SET outcome = $2, outcome_reason = $3, completed_at = $4
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(outcome.as_str())
        .bind(outcome.reason())
        .bind(Timestamp::now().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to record event outcome: {}", e),
            )
        })?;

        Ok(())
    }

    async fn prune_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM billing_event_ledger WHERE claimed_at < $1")
            .bind(cutoff.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Failed to prune ledger: {}", e))
            })?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_inserted_row_acquires() {
        assert_eq!(claim_result(1), ClaimResult::Acquired);
    }

    #[test]
    fn conflicting_insert_is_already_processed() {
        assert_eq!(claim_result(0), ClaimResult::AlreadyProcessed);
    }
}
