use common::RecordId;
use thiserror::Error;

use crate::EventStatus;

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// No record exists with the given id.
    #[error("Event record not found: {0}")]
    RecordNotFound(RecordId),

    /// The requested status change is not an edge of the lifecycle graph,
    /// or the record moved concurrently.
    #[error("Invalid status transition for record {id}: {from} -> {to}")]
    InvalidStatusTransition {
        id: RecordId,
        from: EventStatus,
        to: EventStatus,
    },

    /// Records may only be created `pending` or `failed`.
    #[error("Records cannot be created with status {0}")]
    InvalidInitialStatus(EventStatus),

    /// A stored status string is not a known status.
    #[error("Unknown event status in storage: {0}")]
    UnknownStatus(String),

    /// The store cannot take writes right now.
    #[error("Event store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
