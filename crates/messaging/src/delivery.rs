//! Inbound side of the broker seam.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::Result;

/// A message as seen by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Queue the message was consumed from.
    pub queue: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    pub payload: Vec<u8>,
    /// True if the broker delivered this message before.
    pub redelivered: bool,
}

/// Settles a delivery with the broker.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<()>;

    /// With `requeue == false` the broker routes the message to the queue's
    /// dead-letter exchange.
    async fn reject(&self, requeue: bool) -> Result<()>;
}

/// A consumed message and the handle to settle it.
pub struct Delivery {
    pub message: ReceivedMessage,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(message: ReceivedMessage, acker: Box<dyn Acknowledger>) -> Self {
        Self { message, acker }
    }

    pub async fn ack(&self) -> Result<()> {
        self.acker.ack().await
    }

    pub async fn reject(&self, requeue: bool) -> Result<()> {
        self.acker.reject(requeue).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// A stream of deliveries from one queue. It ends when the underlying
/// channel goes away.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery>> + Send>>;

/// Something that can open a consumer on a queue.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Starts consuming `queue` with at most `prefetch` unacknowledged
    /// deliveries outstanding.
    async fn consume(&self, queue: &str, prefetch: u16) -> Result<DeliveryStream>;
}
