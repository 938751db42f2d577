//! Saga error types.

use common::{OrderId, ProductId};
use domain::{OrderError, ProductError, ValidationError};
use event_store::EventStoreError;
use messaging::MessagingError;
use thiserror::Error;

/// Errors raised by saga steps, collaborators and the replay coordinator.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The referenced order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The referenced product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Order repository error.
    #[error("Order repository error: {0}")]
    OrderRepository(String),

    /// Inventory service error.
    #[error("Inventory service error: {0}")]
    InventoryService(String),

    /// Notification service error.
    #[error("Notification service error: {0}")]
    NotificationService(String),

    /// The order state machine refused an update.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Stock bookkeeping refused a reserve or release.
    #[error("Product error: {0}")]
    Product(#[from] ProductError),

    /// An event or request failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Event store error.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// Broker error.
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A replay run left records failed.
    #[error("replay completed with {failed} failures out of {total} events")]
    ReplayIncomplete {
        replayed: usize,
        failed: usize,
        total: usize,
    },
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
