//! Outbound side of the broker seam.

use async_trait::async_trait;
use common::EventType;
use domain::IntegrationEvent;
use tracing::debug;

use crate::{MessagingError, Result};

/// Sends raw payloads to the topic exchange.
///
/// Implementations never retry; callers own the retry policy.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes `payload` as a persistent message under `routing_key`.
    ///
    /// Fails with `InvalidMessage` for an empty routing key or payload,
    /// `ConnectionClosed`/`ChannelClosed` when the broker is unavailable,
    /// and `Publish` when the broker does not accept the message.
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<()>;

    /// Returns true while the broker connection is open.
    fn is_connected(&self) -> bool {
        true
    }
}

/// Checks the preconditions every publisher enforces.
pub fn check_publish_args(routing_key: &str, payload: &[u8]) -> Result<()> {
    if routing_key.is_empty() {
        return Err(MessagingError::InvalidMessage(
            "routing key is empty".to_string(),
        ));
    }
    if payload.is_empty() {
        return Err(MessagingError::InvalidMessage(format!(
            "payload for {routing_key} is empty"
        )));
    }
    Ok(())
}

/// Validates and serializes an event. Invalid envelopes never reach the
/// broker.
pub fn encode_event<E: IntegrationEvent>(event: &E) -> Result<Vec<u8>> {
    event.validate()?;
    Ok(serde_json::to_vec(event)?)
}

/// Extension trait providing typed publishing for publishers.
#[async_trait]
pub trait EventPublisherExt: EventPublisher {
    /// Validates, serializes and publishes an event under its event type.
    async fn publish_event<E: IntegrationEvent>(&self, event: &E) -> Result<()> {
        let payload = encode_event(event)?;
        debug!(
            event_type = %E::EVENT_TYPE,
            order_id = %event.correlation_id(),
            "Publishing event"
        );
        self.publish(E::EVENT_TYPE.as_str(), &payload).await
    }

    /// Routes a payload to the dead-letter queue of `event_type`.
    async fn dead_letter(&self, event_type: EventType, payload: &[u8]) -> Result<()> {
        self.publish(&event_type.dead_letter_queue(), payload).await
    }
}

// Blanket implementation for all EventPublisher implementations
impl<T: EventPublisher + ?Sized> EventPublisherExt for T {}
