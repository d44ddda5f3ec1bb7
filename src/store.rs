//! Persistence layer: the outbox table, the dead-letter table, and the
//! row-locking primitives the lease manager and failure protocol build on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::{OutboxError, OutboxResult};
use crate::model::{OutboxMessage, OutboxStatus};

/// Lease age beyond which an `in_progress` row is eligible for re-lease.
pub const STALE_LEASE: chrono::Duration = chrono::Duration::seconds(300);

/// Persistence operations on the outbox and dead-letter tables.
///
/// Implementations must guarantee that two concurrent calls to
/// `select_eligible_for_update` never return the same id while either
/// call's enclosing transaction is still open.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Selects up to `limit` eligible row ids, ordered ascending by id, and
    /// row-locks them for the duration of `tx`.
    async fn select_eligible_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        limit: i64,
        now: DateTime<Utc>,
    ) -> OutboxResult<Vec<Uuid>>;

    /// Transitions `ids` to `in_progress` with `leased_at = leased_at`.
    async fn mark_in_progress(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ids: &[Uuid],
        leased_at: DateTime<Utc>,
    ) -> OutboxResult<()>;

    /// Reads the full row for `id`, or `None` if it is absent (already
    /// processed or raced away by another worker).
    async fn fetch(&self, id: Uuid) -> OutboxResult<Option<OutboxMessage>>;

    /// Re-reads `attempts` for `id` under a row lock, for the failure
    /// protocol's re-select step. `None` means the row is already gone.
    async fn fetch_attempts_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> OutboxResult<Option<i32>>;

    /// Reschedules a message for retry: `status=pending`, `leased_at=null`,
    /// updated `attempts` and `next_available_at`.
    async fn schedule_retry(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        attempts: i32,
        next_available_at: DateTime<Utc>,
    ) -> OutboxResult<()>;

    /// Removes the row for `id`. A no-op if already absent.
    async fn delete(&self, tx: &mut Transaction<'_, Postgres>, id: Uuid) -> OutboxResult<()>;

    /// Deletes the outbox row and inserts a dead-letter row for `id` in a
    /// single transaction. The insert is idempotent on `id`.
    async fn transfer_to_dlq(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        event: &serde_json::Value,
        failed_at: DateTime<Utc>,
        last_error: &str,
    ) -> OutboxResult<()>;

    /// Begins a transaction against the underlying pool.
    async fn begin(&self) -> OutboxResult<Transaction<'static, Postgres>>;

    /// Pending count and oldest-pending age in seconds (0 if none pending),
    /// for metrics sampling.
    async fn pending_stats(&self) -> OutboxResult<(i64, i64)>;
}

/// `sqlx`/PostgreSQL implementation of [`OutboxStore`].
pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn select_eligible_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        limit: i64,
        now: DateTime<Utc>,
    ) -> OutboxResult<Vec<Uuid>> {
        let stale_before = now - STALE_LEASE;

        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM outbox_messages
            WHERE
                (status = 'pending' AND (next_available_at IS NULL OR next_available_at < $1))
                OR (status = 'in_progress' AND leased_at < $2)
            ORDER BY id ASC
            LIMIT $3
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .bind(stale_before)
        .bind(limit)
        .fetch_all(&mut **tx)
        .await?;

        debug!(count = ids.len(), "selected eligible outbox rows");
        Ok(ids)
    }

    async fn mark_in_progress(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ids: &[Uuid],
        leased_at: DateTime<Utc>,
    ) -> OutboxResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE outbox_messages
            SET status = 'in_progress', leased_at = $1
            WHERE id = ANY($2)
            "#,
        )
        .bind(leased_at)
        .bind(ids)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> OutboxResult<Option<OutboxMessage>> {
        let row = sqlx::query(
            r#"
            SELECT id, status, leased_at, next_available_at, attempts, event
            FROM outbox_messages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_message).transpose()
    }

    async fn fetch_attempts_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> OutboxResult<Option<i32>> {
        let attempts: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT attempts
            FROM outbox_messages
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(attempts)
    }

    async fn schedule_retry(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        attempts: i32,
        next_available_at: DateTime<Utc>,
    ) -> OutboxResult<()> {
        sqlx::query(
            r#"
            UPDATE outbox_messages
            SET status = 'pending',
                leased_at = NULL,
                attempts = $2,
                next_available_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(next_available_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn delete(&self, tx: &mut Transaction<'_, Postgres>, id: Uuid) -> OutboxResult<()> {
        sqlx::query("DELETE FROM outbox_messages WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn transfer_to_dlq(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        event: &serde_json::Value,
        failed_at: DateTime<Utc>,
        last_error: &str,
    ) -> OutboxResult<()> {
        sqlx::query("DELETE FROM outbox_messages WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO outbox_dead_letters (id, failed_at, event, last_error)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(failed_at)
        .bind(event)
        .bind(last_error)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn begin(&self) -> OutboxResult<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    async fn pending_stats(&self) -> OutboxResult<(i64, i64)> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*)::BIGINT AS pending,
                COALESCE(EXTRACT(EPOCH FROM (NOW() - MIN(next_available_at)))::BIGINT, 0) AS age_seconds
            FROM outbox_messages
            WHERE status = 'pending'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let pending: i64 = row.try_get("pending").unwrap_or(0);
        let age: i64 = row.try_get("age_seconds").unwrap_or(0);
        Ok((pending, age))
    }
}

fn row_to_message(row: sqlx::postgres::PgRow) -> OutboxResult<OutboxMessage> {
    let status_str: String = row.try_get("status").map_err(OutboxError::Database)?;
    let status = match status_str.as_str() {
        "pending" => OutboxStatus::Pending,
        "in_progress" => OutboxStatus::InProgress,
        other => {
            return Err(OutboxError::Other(anyhow::anyhow!(
                "unknown outbox status: {other}"
            )))
        }
    };

    Ok(OutboxMessage {
        id: row.try_get("id").map_err(OutboxError::Database)?,
        status,
        leased_at: row.try_get("leased_at").map_err(OutboxError::Database)?,
        next_available_at: row
            .try_get("next_available_at")
            .map_err(OutboxError::Database)?,
        attempts: row.try_get("attempts").map_err(OutboxError::Database)?,
        event: row.try_get("event").map_err(OutboxError::Database)?,
    })
}
