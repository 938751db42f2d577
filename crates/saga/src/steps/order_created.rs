use std::sync::Arc;

use async_trait::async_trait;
use domain::{InventoryStatusUpdated, OrderCreated, OrderStatus, OrderUpdate};
use tracing::{info, warn};

use super::{SagaStep, StepContext, StepOutcome};
use crate::error::{Result, SagaError};
use crate::services::{InventoryService, OrderRepository};

/// `order.created`: reserves stock, confirms the order and reports the
/// outcome as `inventory.status.updated`.
///
/// A stock-out is published as `hasStock = false` and the original message
/// is also dead-lettered for audit. A failing inventory collaborator
/// publishes nothing; the original message is dead-lettered for replay.
pub struct OrderCreatedStep {
    ctx: StepContext,
    orders: Arc<dyn OrderRepository>,
    inventory: Arc<dyn InventoryService>,
}

impl OrderCreatedStep {
    pub fn new(
        ctx: StepContext,
        orders: Arc<dyn OrderRepository>,
        inventory: Arc<dyn InventoryService>,
    ) -> Self {
        Self {
            ctx,
            orders,
            inventory,
        }
    }
}

#[async_trait]
impl SagaStep for OrderCreatedStep {
    type Event = OrderCreated;

    fn context(&self) -> &StepContext {
        &self.ctx
    }

    #[tracing::instrument(skip_all, fields(order_id = %event.id, product_id = %event.product.id))]
    async fn process(&self, event: &OrderCreated) -> Result<StepOutcome> {
        let product_id = &event.product.id;
        let quantity = event.product.quantity;

        // Only a stock-out or a missing product is a negative answer; any
        // other collaborator error leaves the outcome unknown.
        let reserved = match self.inventory.reserve(product_id, quantity).await {
            Ok(reserved) => reserved,
            Err(SagaError::ProductNotFound(_)) => {
                warn!("Product not found");
                false
            }
            Err(e) => return Err(e),
        };

        if !reserved {
            info!(quantity, "Insufficient stock");
            self.ctx
                .publish_next(&InventoryStatusUpdated::new(
                    event.id.clone(),
                    product_id.clone(),
                    false,
                ))
                .await?;
            return Ok(StepOutcome::DeadLetter);
        }

        if let Err(e) = self
            .orders
            .update_order(&event.id, OrderUpdate::status(OrderStatus::Confirmed))
            .await
        {
            // give the stock back so a replay can reserve it again
            if let Err(release_err) = self.inventory.release(product_id, quantity).await {
                warn!(error = %release_err, "Failed to release reservation");
            }
            return Err(e);
        }
        info!(quantity, "Stock reserved, order confirmed");

        self.ctx
            .publish_next(&InventoryStatusUpdated::new(
                event.id.clone(),
                product_id.clone(),
                true,
            ))
            .await?;
        Ok(StepOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use common::{EventType, OrderId, ProductId};
    use domain::{Order, OrderRequested, Product, ProductSnapshot};
    use event_store::InMemoryEventStore;
    use messaging::{EventHandler, InMemoryBroker};

    use super::*;
    use crate::services::{InMemoryInventoryService, InMemoryOrderRepository};
    use crate::steps::StepHandler;
    use crate::steps::test_support::{context, decode, json, message};

    struct Fixture {
        broker: InMemoryBroker,
        orders: InMemoryOrderRepository,
        inventory: InMemoryInventoryService,
        handler: StepHandler<OrderCreatedStep>,
    }

    async fn fixture(stock: i64) -> Fixture {
        let broker = InMemoryBroker::new();
        let store = InMemoryEventStore::new();
        let orders = InMemoryOrderRepository::new();
        let inventory = InMemoryInventoryService::with_products([Product::new("p1", "Widget", stock)]);
        orders.insert(Order::from_request(&requested())).await;

        let handler = StepHandler::new(OrderCreatedStep::new(
            context(&broker, &store),
            Arc::new(orders.clone()),
            Arc::new(inventory.clone()),
        ));
        Fixture {
            broker,
            orders,
            inventory,
            handler,
        }
    }

    fn requested() -> OrderRequested {
        OrderRequested::new(OrderId::new("o1"), ProductSnapshot::new("p1", "Widget", 2), 50.0)
    }

    fn created_payload() -> Vec<u8> {
        json(&OrderCreated::from_requested(&requested()))
    }

    async fn stock(inventory: &InMemoryInventoryService) -> (i64, i64) {
        let p = inventory
            .get_product(&ProductId::new("p1"))
            .await
            .unwrap()
            .unwrap();
        (p.quantity, p.reserved)
    }

    #[tokio::test]
    async fn sufficient_stock_confirms_order() {
        let f = fixture(10).await;
        f.handler
            .handle(&message(EventType::OrderCreated, created_payload()))
            .await;

        let order = f.orders.get_order(&OrderId::new("o1")).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(stock(&f.inventory).await, (8, 2));

        let updates: Vec<InventoryStatusUpdated> =
            decode(&f.broker.published_to("inventory.status.updated").await);
        assert_eq!(updates.len(), 1);
        assert!(updates[0].has_stock);
        assert_eq!(updates[0].product_id, ProductId::new("p1"));
        assert!(f.broker.published_to("order.created.dlq").await.is_empty());
    }

    #[tokio::test]
    async fn insufficient_stock_signals_and_dead_letters() {
        let f = fixture(1).await;
        let payload = created_payload();
        f.handler
            .handle(&message(EventType::OrderCreated, payload.clone()))
            .await;

        let updates: Vec<InventoryStatusUpdated> =
            decode(&f.broker.published_to("inventory.status.updated").await);
        assert_eq!(updates.len(), 1);
        assert!(!updates[0].has_stock);
        assert_eq!(f.broker.published_to("order.created.dlq").await, vec![payload]);

        let order = f.orders.get_order(&OrderId::new("o1")).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(stock(&f.inventory).await, (1, 0));
    }

    #[tokio::test]
    async fn unknown_product_is_treated_as_stock_out() {
        let f = fixture(10).await;
        let mut event = OrderCreated::from_requested(&requested());
        event.product.id = ProductId::new("missing");
        f.handler
            .handle(&message(EventType::OrderCreated, json(&event)))
            .await;

        let updates: Vec<InventoryStatusUpdated> =
            decode(&f.broker.published_to("inventory.status.updated").await);
        assert!(!updates[0].has_stock);
        assert_eq!(f.broker.published_to("order.created.dlq").await.len(), 1);
    }

    #[tokio::test]
    async fn inventory_outage_dead_letters_without_signalling() {
        let f = fixture(10).await;
        f.inventory.set_fail(true);
        let payload = created_payload();
        f.handler
            .handle(&message(EventType::OrderCreated, payload.clone()))
            .await;

        assert!(f.broker.published_to("inventory.status.updated").await.is_empty());
        assert_eq!(f.broker.published_to("order.created.dlq").await, vec![payload]);

        f.inventory.set_fail(false);
        let order = f.orders.get_order(&OrderId::new("o1")).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(stock(&f.inventory).await, (10, 0));
    }

    #[tokio::test]
    async fn failed_confirmation_releases_reservation() {
        let f = fixture(10).await;
        let event = OrderCreated {
            id: OrderId::new("unknown-order"),
            ..OrderCreated::from_requested(&requested())
        };
        f.handler
            .handle(&message(EventType::OrderCreated, json(&event)))
            .await;

        assert_eq!(stock(&f.inventory).await, (10, 0));
        assert!(f.broker.published_to("inventory.status.updated").await.is_empty());
        assert_eq!(f.broker.published_to("order.created.dlq").await.len(), 1);
    }
}
