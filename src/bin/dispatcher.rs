//! Outbox dispatcher process entrypoint.
//!
//! Loads configuration from the environment, builds the database pool,
//! wires the projection and external-effect handlers, installs signal
//! handlers for graceful shutdown, and runs the poll loop to completion.
//!
//! The real projection and external-effect handler bodies are named
//! collaborators outside this crate's scope (§1 of the dispatcher spec);
//! this binary wires logging stand-ins so the worker is runnable
//! end-to-end. A production deployment links in real handler
//! implementations and constructs `OutboxWorker` directly instead of using
//! this binary.
//!
//! Environment variables:
//! - DATABASE_URL: PostgreSQL connection string (required)
//! - OUTBOX_LEASE_BATCH_SIZE: max rows leased per cycle (default 200)
//! - OUTBOX_PROCESS_BATCH_SIZE: max concurrent pipelines (default 32)
//! - OUTBOX_MAX_ATTEMPTS: attempts before dead-lettering (default 8)
//! - OUTBOX_POLL_INTERVAL_MS: target cycle period (default 20)
//! - OUTBOX_SHUTDOWN_TIMEOUT_MS: graceful-shutdown wait bound (default 30000)

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use outbox_dispatcher::config::DispatcherConfig;
use outbox_dispatcher::handler::{ExternalEffectHandler, HandlerOutcome, ProjectionHandler};
use outbox_dispatcher::metrics::DispatcherMetrics;
use outbox_dispatcher::model::IntegrationEvent;
use outbox_dispatcher::store::PgOutboxStore;
use outbox_dispatcher::worker::OutboxWorker;

/// Logs receipt of every event and reports success. Stands in for a real
/// projection/external-effect handler until one is wired in by the caller.
struct LoggingHandler {
    role: &'static str,
}

#[async_trait]
impl ProjectionHandler for LoggingHandler {
    async fn handle(&self, event: &IntegrationEvent) -> HandlerOutcome {
        info!(role = self.role, event_id = %event.event_id, event_name = %event.event_name, "handled integration event");
        HandlerOutcome::Success
    }
}

#[async_trait]
impl ExternalEffectHandler for LoggingHandler {
    async fn handle(&self, event: &IntegrationEvent) -> HandlerOutcome {
        info!(role = self.role, event_id = %event.event_id, event_name = %event.event_name, "handled integration event");
        HandlerOutcome::Success
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("outbox_dispatcher=info".parse().expect("valid directive")),
        )
        .init();

    dotenvy::dotenv().ok();
    let config = DispatcherConfig::from_env().map_err(|e| format!("configuration error: {e}"))?;
    info!(
        lease_batch_size = config.lease_batch_size,
        process_batch_size = config.process_batch_size,
        max_attempts = config.max_attempts,
        poll_interval_ms = config.poll_interval_ms,
        "starting outbox dispatcher"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .acquire_timeout(std::time::Duration::from_secs(config.db_acquire_timeout_secs))
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = Arc::new(PgOutboxStore::new(pool));
    let metrics = Arc::new(DispatcherMetrics::new("outbox-dispatcher"));

    let worker = Arc::new(OutboxWorker::new(
        store,
        Arc::new(LoggingHandler { role: "projection" }),
        Arc::new(LoggingHandler {
            role: "external_effect",
        }),
        config,
        Some(metrics),
    ));

    let shutdown_handle = worker.shutdown_handle();
    tokio::spawn(async move {
        let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "failed to install ctrl_c signal handler");
                    return;
                }
                info!("interrupt signal received");
            }
            _ = terminate.recv() => {
                info!("terminate signal received");
            }
        }
        shutdown_handle.shutdown();
    });

    match worker.run().await {
        Ok(()) => {
            info!("outbox dispatcher stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "outbox dispatcher exited with a fatal error");
            std::process::exit(1);
        }
    }
}
