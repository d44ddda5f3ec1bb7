//! Error types for the outbox dispatcher.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for dispatcher operations.
pub type OutboxResult<T> = Result<T, OutboxError>;

/// Errors that can occur while operating the outbox.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Message not found in the outbox
    #[error("message not found: {0}")]
    MessageNotFound(Uuid),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("outbox error: {0}")]
    Other(#[from] anyhow::Error),
}
