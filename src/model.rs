//! Data types shared by the store, lease manager, and message processor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a row in the outbox table.
///
/// There is no explicit "done" status: a successfully processed message is
/// deleted outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    InProgress,
}

/// A row in the outbox table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub status: OutboxStatus,
    pub leased_at: Option<DateTime<Utc>>,
    pub next_available_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub event: serde_json::Value,
}

/// An integration event decoded from an outbox row's `event` payload.
///
/// The dispatcher never interprets `event_name` or `payload`; it only
/// forwards the decoded value to the two handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationEvent {
    pub event_id: Uuid,
    pub event_name: String,
    pub occurred_at: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub payload: serde_json::Value,
}

impl IntegrationEvent {
    /// Decode an integration event from an outbox row's opaque JSON payload.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}

/// A row in the dead-letter table: the terminal resting place for a message
/// that has exhausted its retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRow {
    pub id: Uuid,
    pub failed_at: DateTime<Utc>,
    pub event: serde_json::Value,
    pub last_error: String,
}
