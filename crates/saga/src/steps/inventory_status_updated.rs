use std::sync::Arc;

use async_trait::async_trait;
use domain::{InventoryStatusUpdated, NotificationSent, OrderCancelled};
use tracing::info;

use super::{SagaStep, StepContext, StepOutcome};
use crate::error::Result;
use crate::services::{NotificationRequest, NotificationService, NotificationServiceExt};

/// `inventory.status.updated`: tells the customer and closes the loop.
///
/// In stock: confirmation, then `notification.sent`. Out of stock:
/// cancellation notice, `order.cancelled`, then `notification.sent`.
pub struct InventoryStatusUpdatedStep {
    ctx: StepContext,
    notifications: Arc<dyn NotificationService>,
}

impl InventoryStatusUpdatedStep {
    pub fn new(ctx: StepContext, notifications: Arc<dyn NotificationService>) -> Self {
        Self { ctx, notifications }
    }
}

fn notification_message(event: &InventoryStatusUpdated) -> String {
    if event.has_stock {
        format!("Order confirmed for product: {}", event.product_id)
    } else {
        format!(
            "Order cancelled due to insufficient stock for product: {}",
            event.product_id
        )
    }
}

#[async_trait]
impl SagaStep for InventoryStatusUpdatedStep {
    type Event = InventoryStatusUpdated;

    fn context(&self) -> &StepContext {
        &self.ctx
    }

    #[tracing::instrument(skip_all, fields(order_id = %event.order_id, has_stock = event.has_stock))]
    async fn process(&self, event: &InventoryStatusUpdated) -> Result<StepOutcome> {
        let order_id = event.order_id.clone();
        let product_id = event.product_id.clone();

        let request = if event.has_stock {
            NotificationRequest::confirmation(order_id.clone(), product_id)
        } else {
            NotificationRequest::cancellation(order_id.clone(), product_id)
        };
        let delivered = self
            .notifications
            .send_multi_channel(&request, request.kind.channels())
            .await;
        info!(delivered, "Customer notified");

        if !event.has_stock {
            self.ctx
                .publish_next(&OrderCancelled::new(order_id.clone()))
                .await?;
        }

        self.ctx
            .publish_next(&NotificationSent::new(order_id, notification_message(event)))
            .await?;
        Ok(StepOutcome::Completed)
    }
}
