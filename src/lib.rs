//! # Outbox Dispatcher
//!
//! A polling, leasing, retrying worker that drains a relational outbox
//! table of pending integration-event messages, invokes a read-model
//! projection handler and an external-effect handler per message, and
//! either deletes the message on success, reschedules it with exponential
//! backoff on transient failure, or moves it to a dead-letter table once
//! its retry budget is exhausted.
//!
//! The command-side aggregate that writes into the outbox, the bodies of
//! the projection and external-effect handlers, and the HTTP/CLI layer
//! that starts and stops the worker are named collaborators outside this
//! crate: only their result contracts are modeled here.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use outbox_dispatcher::{
//!     config::DispatcherConfig,
//!     metrics::DispatcherMetrics,
//!     store::PgOutboxStore,
//!     worker::OutboxWorker,
//! };
//! use std::sync::Arc;
//!
//! # use outbox_dispatcher::handler::{ExternalEffectHandler, ProjectionHandler, HandlerOutcome};
//! # use outbox_dispatcher::model::IntegrationEvent;
//! # use async_trait::async_trait;
//! # struct NoopHandler;
//! # #[async_trait]
//! # impl ProjectionHandler for NoopHandler {
//! #     async fn handle(&self, _event: &IntegrationEvent) -> HandlerOutcome { HandlerOutcome::Success }
//! # }
//! # #[async_trait]
//! # impl ExternalEffectHandler for NoopHandler {
//! #     async fn handle(&self, _event: &IntegrationEvent) -> HandlerOutcome { HandlerOutcome::Success }
//! # }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DispatcherConfig::from_env()?;
//!     let pool = sqlx::postgres::PgPoolOptions::new()
//!         .max_connections(config.db_max_connections)
//!         .connect(&config.database_url)
//!         .await?;
//!
//!     let store = Arc::new(PgOutboxStore::new(pool));
//!     let metrics = Arc::new(DispatcherMetrics::new("outbox-dispatcher"));
//!     let worker = OutboxWorker::new(
//!         store,
//!         Arc::new(NoopHandler),
//!         Arc::new(NoopHandler),
//!         config,
//!         Some(metrics),
//!     );
//!
//!     worker.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod lease;
pub mod metrics;
pub mod model;
pub mod processor;
pub mod retry;
pub mod store;
pub mod worker;

pub use error::{OutboxError, OutboxResult};
pub use handler::{ExternalEffectHandler, HandlerOutcome, ProjectionHandler};
pub use model::{DeadLetterRow, IntegrationEvent, OutboxMessage, OutboxStatus};
pub use store::{OutboxStore, PgOutboxStore};
pub use worker::{OutboxWorker, ShutdownHandle};
