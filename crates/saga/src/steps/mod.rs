//! Saga step handlers.
//!
//! Each step consumes one event type, performs one side effect through a
//! collaborator and publishes the next event(s) of the chain:
//!
//! ```text
//! order.requested ──► order.created ──► inventory.status.updated ──► notification.sent
//!                                                 └──► order.cancelled
//! ```
//!
//! Malformed payloads and failed side effects are dead-lettered with the
//! original bytes. Payloads that parse but fail validation are dropped.

mod inventory_status_updated;
mod notification_sent;
mod order_cancelled;
mod order_created;
mod order_requested;

use std::sync::Arc;

use async_trait::async_trait;
use common::EventType;
use domain::IntegrationEvent;
use event_store::{EventStore, EventStoreExt};
use messaging::{
    Disposition, EventHandler, EventPublisher, EventPublisherExt, HandlerRegistry, ReceivedMessage,
    RetryPolicy, encode_event,
};
use metrics::counter;
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::services::{InventoryService, NotificationService, OrderRepository};

pub use inventory_status_updated::InventoryStatusUpdatedStep;
pub use notification_sent::NotificationSentStep;
pub use order_cancelled::OrderCancelledStep;
pub use order_created::OrderCreatedStep;
pub use order_requested::OrderRequestedStep;

/// What the handler does with the original message once a step ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    /// The step ran but the message still needs operator attention.
    DeadLetter,
}

/// Broker and store access shared by every step.
#[derive(Clone)]
pub struct StepContext {
    publisher: Arc<dyn EventPublisher>,
    store: Arc<dyn EventStore>,
    retry: RetryPolicy,
}

impl StepContext {
    pub fn new(publisher: Arc<dyn EventPublisher>, store: Arc<dyn EventStore>) -> Self {
        Self {
            publisher,
            store,
            retry: RetryPolicy::publish_default(),
        }
    }

    /// Overrides the publish retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Publishes the next event of the chain with retries.
    ///
    /// When every attempt fails, the encoded event is stored as `pending`
    /// so a replay can publish it later, and the error is returned.
    pub async fn publish_next<E: IntegrationEvent>(&self, event: &E) -> Result<()> {
        let payload = encode_event(event)?;
        let routing_key = E::EVENT_TYPE.as_str();

        let published = self
            .retry
            .retry(routing_key, |_| self.publisher.publish(routing_key, &payload))
            .await;

        if let Err(e) = published {
            let order_id = event.correlation_id().clone();
            error!(
                event_type = routing_key,
                order_id = %order_id,
                error = %e,
                "Publish failed after retries, storing event for replay"
            );
            if let Err(store_err) = self
                .store
                .store_pending(order_id, routing_key, payload)
                .await
            {
                error!(event_type = routing_key, error = %store_err, "Failed to store pending event");
            }
            return Err(e.into());
        }

        debug!(event_type = routing_key, order_id = %event.correlation_id(), "Published next event");
        Ok(())
    }

    /// Sends the original payload to the dead-letter queue of `event_type`.
    ///
    /// Returns how the consumed delivery should be settled: acknowledged once
    /// the copy is on the dead-letter queue, or rejected into the dead-letter
    /// exchange when publishing the copy failed.
    pub async fn dead_letter(&self, event_type: EventType, payload: &[u8]) -> Disposition {
        counter!("events_dead_lettered_total", "event_type" => event_type.as_str())
            .increment(1);

        let queue = event_type.dead_letter_queue();
        let sent = self
            .retry
            .retry(&queue, |_| self.publisher.dead_letter(event_type, payload))
            .await;
        match sent {
            Ok(()) => Disposition::Ack,
            Err(e) => {
                error!(event_type = %event_type, error = %e, "Failed to dead-letter message");
                Disposition::DeadLetter
            }
        }
    }

    /// Parses and validates a payload.
    ///
    /// Unparsable input is dead-lettered; input that fails validation is
    /// logged and dropped. Either way the delivery's settlement is returned
    /// as the error.
    pub async fn decode<E: IntegrationEvent>(
        &self,
        payload: &[u8],
    ) -> std::result::Result<E, Disposition> {
        let event: E = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(event_type = %E::EVENT_TYPE, error = %e, "Malformed payload, dead-lettering");
                return Err(self.dead_letter(E::EVENT_TYPE, payload).await);
            }
        };

        if let Err(e) = event.validate() {
            warn!(
                event_type = %E::EVENT_TYPE,
                order_id = %event.correlation_id(),
                error = %e,
                "Invalid event, discarding"
            );
            counter!("events_invalid_total", "event_type" => E::EVENT_TYPE.as_str()).increment(1);
            return Err(Disposition::Ack);
        }

        Ok(event)
    }
}

/// One step of the choreography.
#[async_trait]
pub trait SagaStep: Send + Sync + 'static {
    /// The event this step consumes.
    type Event: IntegrationEvent;

    fn context(&self) -> &StepContext;

    /// Performs the side effect for a valid event and publishes what follows.
    async fn process(&self, event: &Self::Event) -> Result<StepOutcome>;
}

/// Adapts a [`SagaStep`] to the consumer loop.
pub struct StepHandler<S>(S);

impl<S: SagaStep> StepHandler<S> {
    pub fn new(step: S) -> Self {
        Self(step)
    }

    /// Wraps `step` for registration with a handler registry.
    pub fn shared(step: S) -> Arc<dyn EventHandler> {
        Arc::new(Self(step))
    }
}

#[async_trait]
impl<S: SagaStep> EventHandler for StepHandler<S> {
    async fn handle(&self, message: &ReceivedMessage) -> Disposition {
        let ctx = self.0.context();
        let event_type = <S::Event as IntegrationEvent>::EVENT_TYPE;

        let event = match ctx.decode::<S::Event>(&message.payload).await {
            Ok(event) => event,
            Err(disposition) => return disposition,
        };

        match self.0.process(&event).await {
            Ok(StepOutcome::Completed) => Disposition::Ack,
            Ok(StepOutcome::DeadLetter) => ctx.dead_letter(event_type, &message.payload).await,
            Err(e) => {
                error!(
                    event_type = %event_type,
                    order_id = %event.correlation_id(),
                    error = %e,
                    "Step failed, dead-lettering"
                );
                ctx.dead_letter(event_type, &message.payload).await
            }
        }
    }
}

/// Collaborators the steps perform their side effects through.
#[derive(Clone)]
pub struct Collaborators {
    pub orders: Arc<dyn OrderRepository>,
    pub inventory: Arc<dyn InventoryService>,
    pub notifications: Arc<dyn NotificationService>,
}

/// Registers all five steps, each on the queue named after its event type.
pub fn register_steps(registry: &mut HandlerRegistry, ctx: StepContext, c: &Collaborators) {
    registry.register(
        EventType::OrderRequested.as_str(),
        StepHandler::shared(OrderRequestedStep::new(ctx.clone(), c.orders.clone())),
    );
    registry.register(
        EventType::OrderCreated.as_str(),
        StepHandler::shared(OrderCreatedStep::new(
            ctx.clone(),
            c.orders.clone(),
            c.inventory.clone(),
        )),
    );
    registry.register(
        EventType::InventoryStatusUpdated.as_str(),
        StepHandler::shared(InventoryStatusUpdatedStep::new(
            ctx.clone(),
            c.notifications.clone(),
        )),
    );
    registry.register(
        EventType::OrderCancelled.as_str(),
        StepHandler::shared(OrderCancelledStep::new(
            ctx.clone(),
            c.orders.clone(),
            c.inventory.clone(),
        )),
    );
    registry.register(
        EventType::NotificationSent.as_str(),
        StepHandler::shared(NotificationSentStep::new(ctx, c.orders.clone())),
    );
}
