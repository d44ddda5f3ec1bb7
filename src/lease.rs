//! Lease Manager: selects a bounded batch of eligible outbox rows and
//! atomically transitions them to `in_progress`.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::error::OutboxResult;
use crate::store::OutboxStore;

pub struct LeaseManager<S: OutboxStore> {
    store: Arc<S>,
}

impl<S: OutboxStore> LeaseManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Leases up to `limit` outbox rows.
    ///
    /// Returns an empty set without touching the database when `limit <= 0`.
    /// The returned ids are disjoint from any concurrent `lease` call's
    /// result, by virtue of `FOR UPDATE SKIP LOCKED` row locking inside the
    /// enclosing transaction.
    pub async fn lease(&self, limit: i64) -> OutboxResult<Vec<Uuid>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let ids = self
            .store
            .select_eligible_for_update(&mut tx, limit, now)
            .await?;

        if ids.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        self.store.mark_in_progress(&mut tx, &ids, now).await?;
        tx.commit().await?;

        debug!(count = ids.len(), "leased outbox rows");
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    //! The lease manager's correctness depends entirely on the row-locking
    //! semantics of the underlying transactional store, so it is exercised
    //! end-to-end in `tests/dispatcher_integration.rs` against a real
    //! PostgreSQL instance rather than with an in-memory fake here.
    //!
    //! The one property testable without a database is the `limit <= 0`
    //! short-circuit, which must not touch the store at all.

    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use sqlx::{Postgres, Transaction};

    struct PanicsOnUse;

    #[async_trait]
    impl OutboxStore for PanicsOnUse {
        async fn select_eligible_for_update(
            &self,
            _tx: &mut Transaction<'_, Postgres>,
            _limit: i64,
            _now: DateTime<Utc>,
        ) -> OutboxResult<Vec<Uuid>> {
            panic!("should not be called when limit <= 0")
        }

        async fn mark_in_progress(
            &self,
            _tx: &mut Transaction<'_, Postgres>,
            _ids: &[Uuid],
            _leased_at: DateTime<Utc>,
        ) -> OutboxResult<()> {
            panic!("should not be called when limit <= 0")
        }

        async fn fetch(
            &self,
            _id: Uuid,
        ) -> OutboxResult<Option<crate::model::OutboxMessage>> {
            unreachable!()
        }

        async fn fetch_attempts_for_update(
            &self,
            _tx: &mut Transaction<'_, Postgres>,
            _id: Uuid,
        ) -> OutboxResult<Option<i32>> {
            unreachable!()
        }

        async fn schedule_retry(
            &self,
            _tx: &mut Transaction<'_, Postgres>,
            _id: Uuid,
            _attempts: i32,
            _next_available_at: DateTime<Utc>,
        ) -> OutboxResult<()> {
            unreachable!()
        }

        async fn delete(&self, _tx: &mut Transaction<'_, Postgres>, _id: Uuid) -> OutboxResult<()> {
            unreachable!()
        }

        async fn transfer_to_dlq(
            &self,
            _tx: &mut Transaction<'_, Postgres>,
            _id: Uuid,
            _event: &serde_json::Value,
            _failed_at: DateTime<Utc>,
            _last_error: &str,
        ) -> OutboxResult<()> {
            unreachable!()
        }

        async fn begin(&self) -> OutboxResult<Transaction<'static, Postgres>> {
            panic!("should not be called when limit <= 0")
        }

        async fn pending_stats(&self) -> OutboxResult<(i64, i64)> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn zero_limit_returns_empty_without_touching_store() {
        let manager = LeaseManager::new(Arc::new(PanicsOnUse));
        let result = manager.lease(0).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn negative_limit_returns_empty_without_touching_store() {
        let manager = LeaseManager::new(Arc::new(PanicsOnUse));
        let result = manager.lease(-5).await.unwrap();
        assert!(result.is_empty());
    }
}
