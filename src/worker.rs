//! Poll Loop: drives repeated lease/process cycles with a fixed target
//! period, and owns shutdown signaling and in-flight accounting.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::config::DispatcherConfig;
use crate::handler::{ExternalEffectHandler, ProjectionHandler};
use crate::lease::LeaseManager;
use crate::metrics::DispatcherMetrics;
use crate::processor::{BatchProcessor, MessageProcessor};
use crate::store::OutboxStore;

/// The outbox dispatcher's poll loop.
///
/// `shutting_down` and `in_flight` are process-local atomics owned by this
/// struct; cross-worker coordination is left entirely to the database's
/// row-level locking.
pub struct OutboxWorker<S: OutboxStore, P: ProjectionHandler, E: ExternalEffectHandler> {
    lease_manager: LeaseManager<S>,
    batch_processor: BatchProcessor<S, P, E>,
    config: DispatcherConfig,
    metrics: Option<Arc<DispatcherMetrics>>,
    store: Arc<S>,
    shutting_down: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
}

impl<S: OutboxStore + 'static, P: ProjectionHandler + 'static, E: ExternalEffectHandler + 'static>
    OutboxWorker<S, P, E>
{
    pub fn new(
        store: Arc<S>,
        projection: Arc<P>,
        external_effect: Arc<E>,
        config: DispatcherConfig,
        metrics: Option<Arc<DispatcherMetrics>>,
    ) -> Self {
        config.warn_on_pathologies();

        let mut message_processor =
            MessageProcessor::new(store.clone(), projection, external_effect, config.max_attempts);
        if let Some(metrics) = &metrics {
            message_processor = message_processor.with_metrics(metrics.clone());
        }

        Self {
            lease_manager: LeaseManager::new(store.clone()),
            batch_processor: BatchProcessor::new(Arc::new(message_processor)),
            config,
            metrics,
            store,
            shutting_down: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Signals the loop to stop leasing new work. Returns immediately;
    /// callers typically await `run()` to observe graceful stop.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutting_down: self.shutting_down.clone(),
        }
    }

    /// Drives lease/process cycles until shutdown is signaled, then waits
    /// for in-flight pipelines to drain (bounded by `shutdown_timeout_ms`).
    pub async fn run(&self) -> OutboxResultUnit {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        while !self.shutting_down.load(Ordering::SeqCst) {
            let start = Instant::now();

            match self.lease_manager.lease(self.config.lease_batch_size).await {
                Ok(ids) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.leased_total.inc_by(ids.len() as u64);
                    }
                    self.batch_processor
                        .process_batch(ids, self.config.process_batch_size, &self.in_flight)
                        .await;
                }
                Err(err) => {
                    error!(error = %err, "lease cycle failed, retrying next tick");
                }
            }

            self.sample_metrics().await;

            let elapsed = start.elapsed();
            let sleep_for = poll_interval.saturating_sub(elapsed);
            tokio::time::sleep(sleep_for).await;
        }

        self.wait_for_drain().await;
        Ok(())
    }

    async fn sample_metrics(&self) {
        let Some(metrics) = &self.metrics else {
            return;
        };

        metrics
            .in_flight
            .set(self.in_flight.load(Ordering::SeqCst) as i64);

        if let Ok((pending, age)) = self.store.pending_stats().await {
            metrics.pending.set(pending);
            metrics.oldest_pending_age_seconds.set(age);
        }
    }

    async fn wait_for_drain(&self) {
        let deadline = Instant::now() + Duration::from_millis(self.config.shutdown_timeout_ms);
        loop {
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                debug!("all in-flight pipelines drained, shutdown complete");
                return;
            }
            if Instant::now() >= deadline {
                info!(
                    in_flight = self.in_flight.load(Ordering::SeqCst),
                    "shutdown timeout elapsed with pipelines still in flight, returning anyway"
                );
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// A cheap, cloneable handle that flips the worker's shutdown flag.
#[derive(Clone)]
pub struct ShutdownHandle {
    shutting_down: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }
}

/// `run()` only fails on errors that escape the loop itself; per-cycle and
/// per-message errors are confined and logged, never propagated here.
pub type OutboxResultUnit = Result<(), anyhow::Error>;
