use domain::ValidationError;
use thiserror::Error;

/// Errors that can occur when talking to the broker.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The message was rejected before reaching the broker.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// An event envelope failed validation and was not published.
    #[error("Event validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The broker connection is not open.
    #[error("Broker connection is closed")]
    ConnectionClosed,

    /// The channel used for the operation is not open.
    #[error("Broker channel is closed")]
    ChannelClosed,

    /// The broker refused or failed to accept a published message.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Opening a consumer failed.
    #[error("Consume failed: {0}")]
    Consume(String),

    /// Acknowledging or rejecting a delivery failed.
    #[error("Acknowledgement failed: {0}")]
    Ack(String),

    /// An event could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An error reported by the AMQP client.
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;
