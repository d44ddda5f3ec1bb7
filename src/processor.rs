//! Message Processor and Batch Processor: the per-message pipeline and the
//! chunked fan-out that drives it across a leased batch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::OutboxResult;
use crate::handler::{ExternalEffectHandler, HandlerOutcome, ProjectionHandler};
use crate::metrics::DispatcherMetrics;
use crate::model::IntegrationEvent;
use crate::retry;
use crate::store::OutboxStore;

/// Per-message pipeline: fetch, invoke both handlers concurrently, and
/// apply the success or failure disposition.
pub struct MessageProcessor<S: OutboxStore, P: ProjectionHandler, E: ExternalEffectHandler> {
    store: Arc<S>,
    projection: Arc<P>,
    external_effect: Arc<E>,
    max_attempts: i32,
    metrics: Option<Arc<DispatcherMetrics>>,
}

impl<S: OutboxStore, P: ProjectionHandler, E: ExternalEffectHandler> MessageProcessor<S, P, E> {
    pub fn new(
        store: Arc<S>,
        projection: Arc<P>,
        external_effect: Arc<E>,
        max_attempts: i32,
    ) -> Self {
        Self {
            store,
            projection,
            external_effect,
            max_attempts,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<DispatcherMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Runs the full pipeline for a single leased message id.
    pub async fn process(&self, id: Uuid) -> OutboxResult<()> {
        let Some(message) = self.store.fetch(id).await? else {
            // Raced deletion by a peer worker: no-op success.
            debug!(%id, "message vanished before fetch, skipping");
            return Ok(());
        };

        let (projection_outcome, external_outcome) = match IntegrationEvent::from_value(&message.event)
        {
            Ok(event) => {
                let (p, e) = tokio::join!(
                    self.projection.handle(&event),
                    self.external_effect.handle(&event)
                );
                (p, e)
            }
            Err(err) => {
                let failure = HandlerOutcome::Failure {
                    error: format!("malformed event payload: {err}"),
                };
                (failure.clone(), failure)
            }
        };

        if projection_outcome.is_success() && external_outcome.is_success() {
            let mut tx = self.store.begin().await?;
            self.store.delete(&mut tx, id).await?;
            tx.commit().await?;
            if let Some(metrics) = &self.metrics {
                metrics.delivered.inc();
            }
            debug!(%id, "message delivered, deleted from outbox");
            return Ok(());
        }

        let joined_error = format!(
            "projection: {}; external_effect: {}",
            projection_outcome.error_or_none(),
            external_outcome.error_or_none()
        );

        self.apply_failure(id, &message.event, &joined_error).await
    }

    /// Failure protocol: re-select the row under a lock and either
    /// reschedule it with backoff or transfer it to the dead-letter table.
    async fn apply_failure(
        &self,
        id: Uuid,
        event: &serde_json::Value,
        joined_error: &str,
    ) -> OutboxResult<()> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let Some(attempts) = self.store.fetch_attempts_for_update(&mut tx, id).await? else {
            // A peer worker already gave this message its terminal disposition.
            tx.commit().await?;
            return Ok(());
        };

        let next_attempts = attempts + 1;

        if next_attempts >= self.max_attempts {
            self.store
                .transfer_to_dlq(&mut tx, id, event, now, joined_error)
                .await?;
            tx.commit().await?;
            if let Some(metrics) = &self.metrics {
                metrics.dead_lettered.inc();
            }
            warn!(%id, attempts = next_attempts, error = %joined_error, "message exhausted retry budget, moved to dead-letter table");
        } else {
            let next_available_at = now + chrono::Duration::from_std(retry::backoff(next_attempts))
                .unwrap_or_else(|_| chrono::Duration::seconds(300));
            self.store
                .schedule_retry(&mut tx, id, next_attempts, next_available_at)
                .await?;
            tx.commit().await?;
            if let Some(metrics) = &self.metrics {
                metrics.retried.inc();
            }
            debug!(%id, attempts = next_attempts, next_available_at = %next_available_at, "message rescheduled with backoff");
        }

        Ok(())
    }
}

/// Splits a leased batch into concurrency-bounded chunks and fans out
/// processing within each chunk.
pub struct BatchProcessor<S: OutboxStore, P: ProjectionHandler, E: ExternalEffectHandler> {
    processor: Arc<MessageProcessor<S, P, E>>,
}

impl<S: OutboxStore, P: ProjectionHandler, E: ExternalEffectHandler> BatchProcessor<S, P, E> {
    pub fn new(processor: Arc<MessageProcessor<S, P, E>>) -> Self {
        Self { processor }
    }

    /// Processes `ids` in consecutive chunks of at most `chunk_size`,
    /// awaiting each chunk's concurrent pipelines before advancing to the
    /// next. `in_flight` is incremented before each pipeline starts and
    /// decremented on completion, regardless of outcome.
    ///
    /// A `chunk_size` of zero is a configuration pathology: the batch is
    /// left untouched (rows remain `in_progress` and are recovered by
    /// stale-lease reclamation) rather than treated as a crash.
    pub async fn process_batch(&self, ids: Vec<Uuid>, chunk_size: usize, in_flight: &AtomicUsize) {
        if ids.is_empty() {
            return;
        }

        if chunk_size == 0 {
            warn!(
                leased = ids.len(),
                "process_batch_size is 0; leased rows will be recovered via stale-lease reclamation"
            );
            return;
        }

        for chunk in ids.chunks(chunk_size) {
            let tasks = chunk.iter().map(|&id| {
                let processor = self.processor.clone();
                async move {
                    in_flight.fetch_add(1, Ordering::SeqCst);
                    if let Err(err) = processor.process(id).await {
                        warn!(%id, error = %err, "message pipeline failed with a database error");
                    }
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            });

            join_all(tasks).await;
        }
    }
}
