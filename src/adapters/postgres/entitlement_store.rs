//! PostgreSQL implementation of EntitlementStore.
//!
//! Entitlement lives in dedicated columns of the `users` row. The upsert
//! only touches those columns so profile data written by other services is
//! left alone.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::billing::{EntitlementRecord, PlanId};
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp, UserId};
use crate::ports::EntitlementStore;

pub struct PostgresEntitlementStore {
    pool: PgPool,
}

impl PostgresEntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of the entitlement columns.
#[derive(Debug, sqlx::FromRow)]
struct EntitlementRow {
    uid: String,
    is_pro: bool,
    subscription_status: String,
    plan_id: Option<String>,
    subscription_id: Option<String>,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    last_processed_event_id: String,
    last_processed_at: DateTime<Utc>,
}

impl TryFrom<EntitlementRow> for EntitlementRecord {
    type Error = DomainError;

    fn try_from(row: EntitlementRow) -> Result<Self, Self::Error> {
        let uid = UserId::new(row.uid).map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid uid: {}", e))
        })?;
        let subscription_id = row
            .subscription_id
            .map(SubscriptionId::new)
            .transpose()
            .map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid subscription_id: {}", e))
            })?;

        Ok(EntitlementRecord {
            uid,
            is_pro: row.is_pro,
            status: row.subscription_status,
            plan_id: row.plan_id.map(PlanId::from_stored),
            subscription_id,
            current_period_end: row.current_period_end.map(Timestamp::from_datetime),
            cancel_at_period_end: row.cancel_at_period_end,
            last_processed_event_id: row.last_processed_event_id,
            last_processed_at: Timestamp::from_datetime(row.last_processed_at),
        })
    }
}

#[async_trait]
impl EntitlementStore for PostgresEntitlementStore {
    async fn upsert(&self, record: &EntitlementRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO users (
                uid, is_pro, subscription_status, plan_id, subscription_id,
                current_period_end, cancel_at_period_end,
                last_processed_event_id, last_processed_at, entitlement_updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (uid) DO UPDATE SET
                is_pro = EXCLUDED.is_pro,
                subscription_status = EXCLUDED.subscription_status,
                plan_id = EXCLUDED.plan_id,
                subscription_id = EXCLUDED.subscription_id,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                last_processed_event_id = EXCLUDED.last_processed_event_id,
                last_processed_at = EXCLUDED.last_processed_at,
                entitlement_updated_at = NOW()
            "#,
        )
        .bind(record.uid.as_str())
        .bind(record.is_pro)
        .bind(&record.status)
        .bind(record.plan_id.as_ref().map(PlanId::as_str))
        .bind(record.subscription_id.as_ref().map(SubscriptionId::as_str))
        .bind(record.current_period_end.map(|t| *t.as_datetime()))
        .bind(record.cancel_at_period_end)
        .bind(&record.last_processed_event_id)
        .bind(record.last_processed_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to upsert entitlement: {}", e),
            )
            .with_detail("uid", record.uid.as_str())
        })?;

        Ok(())
    }

    async fn get(&self, uid: &UserId) -> Result<Option<EntitlementRecord>, DomainError> {
        // Users created elsewhere have no entitlement until the first write.
        let row: Option<EntitlementRow> = sqlx::query_as(
            r#"
            SELECT uid, is_pro, subscription_status, plan_id, subscription_id,
                   current_period_end, cancel_at_period_end,
                   last_processed_event_id, last_processed_at
            FROM users
            WHERE uid = $1 AND last_processed_at IS NOT NULL
            "#,
        )
        .bind(uid.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to load entitlement: {}", e))
        })?;

        row.map(EntitlementRecord::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> EntitlementRow {
        EntitlementRow {
            uid: "user-1".to_string(),
            is_pro: true,
            subscription_status: "active".to_string(),
            plan_id: Some("pro_monthly".to_string()),
            subscription_id: Some("sub_1".to_string()),
            current_period_end: DateTime::from_timestamp(1_706_745_600, 0),
            cancel_at_period_end: false,
            last_processed_event_id: "evt_1".to_string(),
            last_processed_at: DateTime::from_timestamp(1_704_067_200, 0).unwrap(),
        }
    }

    #[test]
    fn row_converts_to_record() {
        let record = EntitlementRecord::try_from(row()).unwrap();

        assert_eq!(record.uid.as_str(), "user-1");
        assert!(record.is_pro);
        assert_eq!(record.plan_id.as_ref().map(PlanId::as_str), Some("pro_monthly"));
        assert_eq!(
            record.current_period_end.map(|t| t.as_unix_secs()),
            Some(1_706_745_600)
        );
    }

    #[test]
    fn blank_uid_row_is_a_database_error() {
        let mut bad = row();
        bad.uid = " ".to_string();

        let err = EntitlementRecord::try_from(bad).unwrap_err();

        assert_eq!(err.code, ErrorCode::DatabaseError);
    }
}
