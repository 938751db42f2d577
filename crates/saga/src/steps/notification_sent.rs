use std::sync::Arc;

use async_trait::async_trait;
use domain::{NotificationSent, OrderUpdate};
use tracing::info;

use super::{SagaStep, StepContext, StepOutcome};
use crate::error::Result;
use crate::services::OrderRepository;

/// `notification.sent`: records on the order that the customer was told.
pub struct NotificationSentStep {
    ctx: StepContext,
    orders: Arc<dyn OrderRepository>,
}

impl NotificationSentStep {
    pub fn new(ctx: StepContext, orders: Arc<dyn OrderRepository>) -> Self {
        Self { ctx, orders }
    }
}

#[async_trait]
impl SagaStep for NotificationSentStep {
    type Event = NotificationSent;

    fn context(&self) -> &StepContext {
        &self.ctx
    }

    #[tracing::instrument(skip_all, fields(order_id = %event.order_id))]
    async fn process(&self, event: &NotificationSent) -> Result<StepOutcome> {
        self.orders
            .update_order(
                &event.order_id,
                OrderUpdate::notification_sent(event.message.clone()),
            )
            .await?;
        info!("Notification status recorded");
        Ok(StepOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use common::{EventType, OrderId};
    use domain::{NOTIFICATION_SENT, Order, OrderRequested, ProductSnapshot};
    use event_store::InMemoryEventStore;
    use messaging::{EventHandler, InMemoryBroker};

    use super::*;
    use crate::services::InMemoryOrderRepository;
    use crate::steps::StepHandler;
    use crate::steps::test_support::{context, json, message};

    #[tokio::test]
    async fn records_notification_on_order() {
        let broker = InMemoryBroker::new();
        let orders = InMemoryOrderRepository::new();
        orders
            .insert(Order::from_request(&OrderRequested::new(
                OrderId::new("o1"),
                ProductSnapshot::new("p1", "Widget", 2),
                50.0,
            )))
            .await;
        let handler = StepHandler::new(NotificationSentStep::new(
            context(&broker, &InMemoryEventStore::new()),
            Arc::new(orders.clone()),
        ));

        let event = NotificationSent::new(OrderId::new("o1"), "Order confirmed for product: p1");
        handler
            .handle(&message(EventType::NotificationSent, json(&event)))
            .await;

        let order = orders.get_order(&OrderId::new("o1")).await.unwrap().unwrap();
        assert_eq!(order.notification_status.as_deref(), Some(NOTIFICATION_SENT));
        assert_eq!(
            order.notification_message.as_deref(),
            Some("Order confirmed for product: p1")
        );
    }

    #[tokio::test]
    async fn unknown_order_is_dead_lettered() {
        let broker = InMemoryBroker::new();
        let handler = StepHandler::new(NotificationSentStep::new(
            context(&broker, &InMemoryEventStore::new()),
            Arc::new(InMemoryOrderRepository::new()),
        ));

        let payload = json(&NotificationSent::new(OrderId::new("ghost"), "hello"));
        handler
            .handle(&message(EventType::NotificationSent, payload.clone()))
            .await;

        assert_eq!(
            broker.published_to("notification.sent.dlq").await,
            vec![payload]
        );
    }
}
