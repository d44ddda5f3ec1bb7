//! Prometheus metrics for the outbox dispatcher, sampled once per poll
//! cycle plus incremented at the relevant message-disposition points.

use prometheus::{IntCounter, IntGauge, Opts};
use tracing::warn;

#[derive(Clone)]
pub struct DispatcherMetrics {
    pub pending: IntGauge,
    pub oldest_pending_age_seconds: IntGauge,
    pub in_flight: IntGauge,
    pub leased_total: IntCounter,
    pub delivered: IntCounter,
    pub retried: IntCounter,
    pub dead_lettered: IntCounter,
}

impl DispatcherMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();

        let pending = gauge(
            "outbox_pending_count",
            "Number of outbox rows currently pending or awaiting retry",
            service,
        );
        let oldest_pending_age_seconds = gauge(
            "outbox_oldest_pending_age_seconds",
            "Age in seconds of the oldest pending outbox row",
            service,
        );
        let in_flight = gauge(
            "outbox_in_flight",
            "Number of message pipelines currently in flight",
            service,
        );
        let leased_total = counter(
            "outbox_leased_total",
            "Total number of outbox rows returned by lease()",
            service,
        );
        let delivered = counter(
            "outbox_delivered_total",
            "Total number of messages deleted after both handlers succeeded",
            service,
        );
        let retried = counter(
            "outbox_retried_total",
            "Total number of messages rescheduled with backoff",
            service,
        );
        let dead_lettered = counter(
            "outbox_dead_lettered_total",
            "Total number of messages moved to the dead-letter table",
            service,
        );

        for metric in [
            Box::new(pending.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(oldest_pending_age_seconds.clone()),
            Box::new(in_flight.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("failed to register outbox gauge: {}", e);
            }
        }
        for metric in [
            Box::new(leased_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(delivered.clone()),
            Box::new(retried.clone()),
            Box::new(dead_lettered.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("failed to register outbox counter: {}", e);
            }
        }

        Self {
            pending,
            oldest_pending_age_seconds,
            in_flight,
            leased_total,
            delivered,
            retried,
            dead_lettered,
        }
    }
}

fn gauge(name: &str, help: &str, service: &str) -> IntGauge {
    IntGauge::with_opts(Opts::new(name, help).const_label("service", service.to_string()))
        .unwrap_or_else(|_| panic!("valid metric opts for {name}"))
}

fn counter(name: &str, help: &str, service: &str) -> IntCounter {
    IntCounter::with_opts(Opts::new(name, help).const_label("service", service.to_string()))
        .unwrap_or_else(|_| panic!("valid metric opts for {name}"))
}
