//! PostgreSQL implementation of CustomerLinkRepository.
//!
//! `link_if_absent` relies on the primary key on `customer_id`: the insert
//! either wins or is a no-op, and a follow-up read classifies the no-op.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::foundation::{CustomerId, DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::{CustomerLink, CustomerLinkRepository, LinkOutcome};

pub struct PostgresCustomerLinkRepository {
    pool: PgPool,
}

impl PostgresCustomerLinkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LinkRow {
    customer_id: String,
    uid: String,
    linked_at: DateTime<Utc>,
}

impl TryFrom<LinkRow> for CustomerLink {
    type Error = DomainError;

    fn try_from(row: LinkRow) -> Result<Self, Self::Error> {
        Ok(CustomerLink {
            customer_id: CustomerId::new(row.customer_id).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid customer_id: {}", e))
            })?,
            uid: UserId::new(row.uid).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid uid: {}", e))
            })?,
            linked_at: Timestamp::from_datetime(row.linked_at),
        })
    }
}

fn db_error(action: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", action, e))
}

/// Classifies an insert that did nothing against the link already stored.
fn classify_existing(existing: &CustomerLink, requested: &UserId) -> LinkOutcome {
    if existing.uid == *requested {
        LinkOutcome::AlreadyLinked
    } else {
        LinkOutcome::Conflict {
            existing_uid: existing.uid.clone(),
        }
    }
}

#[async_trait]
impl CustomerLinkRepository for PostgresCustomerLinkRepository {
    async fn link_if_absent(&self, link: &CustomerLink) -> Result<LinkOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO billing_customer_links (customer_id, uid, linked_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (customer_id) DO NOTHING
            "#,
        )
        .bind(link.customer_id.as_str())
        .bind(link.uid.as_str())
        .bind(link.linked_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("link customer", e))?;

        if result.rows_affected() == 1 {
            return Ok(LinkOutcome::Created);
        }

        let existing = self.find_by_customer(&link.customer_id).await?.ok_or_else(|| {
            DomainError::new(
                ErrorCode::DatabaseError,
                "Customer link vanished between insert and read",
            )
            .with_detail("customer_id", link.customer_id.as_str())
        })?;

        Ok(classify_existing(&existing, &link.uid))
    }

    async fn find_by_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerLink>, DomainError> {
        let row: Option<LinkRow> = sqlx::query_as(
            "SELECT customer_id, uid, linked_at FROM billing_customer_links WHERE customer_id = $1",
        )
        .bind(customer_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find customer link", e))?;

        row.map(CustomerLink::try_from).transpose()
    }

    async fn find_by_uid(&self, uid: &UserId) -> Result<Vec<CustomerLink>, DomainError> {
        let rows: Vec<LinkRow> = sqlx::query_as(
            r#"
            SELECT customer_id, uid, linked_at
            FROM billing_customer_links
            WHERE uid = $1
            ORDER BY linked_at DESC
            "#,
        )
        .bind(uid.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("find links for user", e))?;

        rows.into_iter().map(CustomerLink::try_from).collect()
    }

    async fn relink(&self, link: &CustomerLink) -> Result<Option<UserId>, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin relink", e))?;

        let previous: Option<(String,)> = sqlx::query_as(
            "SELECT uid FROM billing_customer_links WHERE customer_id = $1 FOR UPDATE",
        )
        .bind(link.customer_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("read customer link", e))?;

        sqlx::query(
            r#"
            INSERT INTO billing_customer_links (customer_id, uid, linked_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (customer_id) DO UPDATE SET uid = EXCLUDED.uid, linked_at = EXCLUDED.linked_at
            "#,
        )
        .bind(link.customer_id.as_str())
        .bind(link.uid.as_str())
        .bind(link.linked_at.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("relink customer", e))?;

        tx.commit().await.map_err(|e| db_error("commit relink", e))?;

        Ok(previous.and_then(|(uid,)| UserId::new(uid).ok()))
    }

    async fn list_batch(
        &self,
        after: Option<&CustomerId>,
        limit: usize,
    ) -> Result<Vec<CustomerLink>, DomainError> {
        let rows: Vec<LinkRow> = sqlx::query_as(
            r#"
            SELECT customer_id, uid, linked_at
            FROM billing_customer_links
            WHERE $1::TEXT IS NULL OR customer_id > $1
            ORDER BY customer_id
            LIMIT $2
            "#,
        )
        .bind(after.map(CustomerId::as_str))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list customer links", e))?;

        rows.into_iter().map(CustomerLink::try_from).collect()
    }
}
