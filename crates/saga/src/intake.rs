//! Client-facing entry into the choreography.

use std::sync::Arc;
use std::time::Duration;

use common::OrderId;
use domain::{IntegrationEvent, OrderCancelled, OrderRequested, ProductSnapshot};
use messaging::{EventPublisher, RetryPolicy, encode_event};
use serde::Deserialize;
use tracing::{error, info};

use crate::error::Result;

/// A client's order as received over HTTP.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateOrderRequest {
    pub amount: f64,
    pub product: ProductSnapshot,
}

/// Starts and cancels orders by publishing the first event of the chain.
///
/// Publishing gets two attempts; the caller learns about a failure directly
/// instead of through the dead-letter path.
pub struct OrderIntake {
    publisher: Arc<dyn EventPublisher>,
    retry: RetryPolicy,
}

impl OrderIntake {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            publisher,
            retry: RetryPolicy::linear(2, Duration::from_secs(1)),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Assigns an order id and publishes `order.requested`.
    #[tracing::instrument(skip_all, fields(product_id = %request.product.id))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<OrderRequested> {
        let event = OrderRequested::new(OrderId::generate(), request.product, request.amount);
        self.publish(&event).await?;
        info!(order_id = %event.id, "Order requested");
        Ok(event)
    }

    /// Publishes `order.cancelled` for `order_id`.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<OrderCancelled> {
        let event = OrderCancelled::new(order_id);
        self.publish(&event).await?;
        info!("Order cancellation requested");
        Ok(event)
    }

    async fn publish<E: IntegrationEvent>(&self, event: &E) -> Result<()> {
        event.validate()?;
        let payload = encode_event(event)?;
        let routing_key = E::EVENT_TYPE.as_str();

        self.retry
            .retry(routing_key, |_| self.publisher.publish(routing_key, &payload))
            .await
            .map_err(|e| {
                error!(order_id = %event.correlation_id(), event_type = routing_key, error = %e, "Publish failed");
                e.into()
            })
    }
}
