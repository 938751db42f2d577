//! Order aggregate.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderStatus};
use crate::events::{OrderRequested, ProductSnapshot};

/// Notification status recorded once the customer has been told.
pub const NOTIFICATION_SENT: &str = "sent";

/// Order aggregate root, as owned by the order collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub amount: f64,
    pub product: ProductSnapshot,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_message: Option<String>,
}

impl Order {
    /// Builds the order record for a request; the record starts `Processing`.
    pub fn from_request(event: &OrderRequested) -> Self {
        Self {
            id: event.id.clone(),
            amount: event.amount,
            product: event.product.clone(),
            status: OrderStatus::Processing,
            created_at: Utc::now(),
            notification_status: None,
            notification_message: None,
        }
    }

    /// Applies a partial update.
    ///
    /// Moving to the status the order already has is a no-op; any other
    /// status change must be an edge of the order state machine.
    pub fn apply_update(&mut self, update: OrderUpdate) -> Result<(), OrderError> {
        if let Some(next) = update.status {
            validate_transition(self.status, next)?;
            self.status = next;
        }
        if let Some(status) = update.notification_status {
            self.notification_status = Some(status);
        }
        if let Some(message) = update.notification_message {
            self.notification_message = Some(message);
        }
        Ok(())
    }
}

/// Checks that `from -> to` is allowed. Staying put is always allowed.
pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
    let allowed = from == to
        || match to {
            OrderStatus::Requested => false,
            OrderStatus::Processing => from.can_start_processing(),
            OrderStatus::Confirmed => from.can_confirm(),
            OrderStatus::Cancelled => from.can_cancel(),
        };

    if allowed {
        Ok(())
    } else {
        Err(OrderError::InvalidStatusTransition { from, to })
    }
}

/// Fields of an order that saga steps may change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub notification_status: Option<String>,
    pub notification_message: Option<String>,
}

impl OrderUpdate {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn notification_sent(message: impl Into<String>) -> Self {
        Self {
            notification_status: Some(NOTIFICATION_SENT.to_string()),
            notification_message: Some(message.into()),
            ..Self::default()
        }
    }
}
