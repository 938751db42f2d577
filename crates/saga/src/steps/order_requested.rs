use std::sync::Arc;

use async_trait::async_trait;
use domain::{Order, OrderCreated, OrderRequested};
use tracing::{debug, info};

use super::{SagaStep, StepContext, StepOutcome};
use crate::error::Result;
use crate::services::OrderRepository;

/// `order.requested`: creates the order record and announces `order.created`.
pub struct OrderRequestedStep {
    ctx: StepContext,
    orders: Arc<dyn OrderRepository>,
}

impl OrderRequestedStep {
    pub fn new(ctx: StepContext, orders: Arc<dyn OrderRepository>) -> Self {
        Self { ctx, orders }
    }
}

#[async_trait]
impl SagaStep for OrderRequestedStep {
    type Event = OrderRequested;

    fn context(&self) -> &StepContext {
        &self.ctx
    }

    #[tracing::instrument(skip_all, fields(order_id = %event.id))]
    async fn process(&self, event: &OrderRequested) -> Result<StepOutcome> {
        let order = Order::from_request(event);
        if self.orders.create_order(&order).await? {
            info!(product_id = %order.product.id, "Order created");
        } else {
            debug!("Order already exists, republishing");
        }

        self.ctx
            .publish_next(&OrderCreated::from_requested(event))
            .await?;
        Ok(StepOutcome::Completed)
    }
}
