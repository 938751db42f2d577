use std::sync::Arc;

use async_trait::async_trait;
use domain::{OrderCancelled, OrderStatus, OrderUpdate};
use tracing::{debug, info, warn};

use super::{SagaStep, StepContext, StepOutcome};
use crate::error::Result;
use crate::services::{InventoryService, OrderRepository};

/// `order.cancelled`: returns held stock and marks the order cancelled.
pub struct OrderCancelledStep {
    ctx: StepContext,
    orders: Arc<dyn OrderRepository>,
    inventory: Arc<dyn InventoryService>,
}

impl OrderCancelledStep {
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
impl SagaStep for OrderCancelledStep {
    type Event = OrderCancelled;

    fn context(&self) -> &StepContext {
        &self.ctx
    }

    #[tracing::instrument(skip_all, fields(order_id = %event.order_id))]
    async fn process(&self, event: &OrderCancelled) -> Result<StepOutcome> {
        let Some(order) = self.orders.get_order(&event.order_id).await? else {
            warn!("Order not found, nothing to cancel");
            return Ok(StepOutcome::Completed);
        };

        if order.status.is_terminal() {
            debug!("Order already cancelled");
            return Ok(StepOutcome::Completed);
        }

        if order.status.holds_reservation() {
            self.inventory
                .release(&order.product.id, order.product.quantity)
                .await?;
            info!(
                product_id = %order.product.id,
                quantity = order.product.quantity,
                "Reservation released"
            );
        }

        self.orders
            .update_order(&event.order_id, OrderUpdate::status(OrderStatus::Cancelled))
            .await?;
        info!("Order cancelled");
        Ok(StepOutcome::Completed)
    }
}
