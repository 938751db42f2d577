//! Integration events exchanged over the broker.
//!
//! Every envelope deserializes leniently: a missing field becomes its empty
//! or zero value, so incomplete payloads are caught by [`IntegrationEvent::validate`]
//! rather than failing to parse. A payload that is not JSON, or whose
//! fields have the wrong types, still fails deserialization.

use chrono::{DateTime, Utc};
use common::{EventType, OrderId, ProductId};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{OrderStatus, ValidationError};

/// Envelope schema version stamped on every event.
pub const EVENT_VERSION: u32 = 1;

/// Contract shared by every event envelope.
pub trait IntegrationEvent: Serialize + DeserializeOwned + Send + Sync {
    /// The routing key this envelope is published under.
    const EVENT_TYPE: EventType;

    /// Checks required fields and positive quantities.
    fn validate(&self) -> Result<(), ValidationError>;

    /// The order this event belongs to.
    fn correlation_id(&self) -> &OrderId;
}

/// Product details captured when the order was placed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    pub quantity: i64,
}

impl ProductSnapshot {
    pub fn new(id: impl Into<ProductId>, name: impl Into<String>, quantity: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            quantity,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingField("product.id"));
        }
        if self.quantity <= 0 {
            return Err(ValidationError::NonPositiveQuantity(self.quantity));
        }
        Ok(())
    }
}

fn validate_amount(amount: f64) -> Result<(), ValidationError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ValidationError::NonPositiveAmount(amount));
    }
    Ok(())
}

fn require_order_id(id: &OrderId, field: &'static str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

/// A client asked for an order to be placed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderRequested {
    pub id: OrderId,
    pub product: ProductSnapshot,
    pub amount: f64,
    pub status: OrderStatus,
    pub version: u32,
    pub timestamp: DateTime<Utc>,
}

impl OrderRequested {
    pub fn new(id: OrderId, product: ProductSnapshot, amount: f64) -> Self {
        Self {
            id,
            product,
            amount,
            status: OrderStatus::Requested,
            version: EVENT_VERSION,
            timestamp: Utc::now(),
        }
    }
}

impl IntegrationEvent for OrderRequested {
    const EVENT_TYPE: EventType = EventType::OrderRequested;

    fn validate(&self) -> Result<(), ValidationError> {
        require_order_id(&self.id, "id")?;
        self.product.validate()?;
        validate_amount(self.amount)
    }

    fn correlation_id(&self) -> &OrderId {
        &self.id
    }
}

/// The order record exists and is being processed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderCreated {
    pub id: OrderId,
    pub product: ProductSnapshot,
    pub amount: f64,
    pub status: OrderStatus,
    pub version: u32,
    pub timestamp: DateTime<Utc>,
}

impl OrderCreated {
    /// Carries the request's product and amount forward unchanged.
    pub fn from_requested(requested: &OrderRequested) -> Self {
        Self {
            id: requested.id.clone(),
            product: requested.product.clone(),
            amount: requested.amount,
            status: OrderStatus::Processing,
            version: EVENT_VERSION,
            timestamp: Utc::now(),
        }
    }
}

impl IntegrationEvent for OrderCreated {
    const EVENT_TYPE: EventType = EventType::OrderCreated;

    fn validate(&self) -> Result<(), ValidationError> {
        require_order_id(&self.id, "id")?;
        self.product.validate()?;
        validate_amount(self.amount)
    }

    fn correlation_id(&self) -> &OrderId {
        &self.id
    }
}

/// The order will not be fulfilled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub version: u32,
    pub timestamp: DateTime<Utc>,
}

impl OrderCancelled {
    pub fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            status: OrderStatus::Cancelled,
            version: EVENT_VERSION,
            timestamp: Utc::now(),
        }
    }
}

impl IntegrationEvent for OrderCancelled {
    const EVENT_TYPE: EventType = EventType::OrderCancelled;

    fn validate(&self) -> Result<(), ValidationError> {
        require_order_id(&self.order_id, "orderId")
    }

    fn correlation_id(&self) -> &OrderId {
        &self.order_id
    }
}

/// Outcome of the stock reservation for an order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InventoryStatusUpdated {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub has_stock: bool,
    pub version: u32,
    pub timestamp: DateTime<Utc>,
}

impl InventoryStatusUpdated {
    pub fn new(order_id: OrderId, product_id: ProductId, has_stock: bool) -> Self {
        Self {
            order_id,
            product_id,
            has_stock,
            version: EVENT_VERSION,
            timestamp: Utc::now(),
        }
    }
}

impl IntegrationEvent for InventoryStatusUpdated {
    const EVENT_TYPE: EventType = EventType::InventoryStatusUpdated;

    fn validate(&self) -> Result<(), ValidationError> {
        require_order_id(&self.order_id, "orderId")?;
        if self.product_id.is_empty() {
            return Err(ValidationError::MissingField("productId"));
        }
        Ok(())
    }

    fn correlation_id(&self) -> &OrderId {
        &self.order_id
    }
}

/// The customer has been told about the order outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSent {
    pub order_id: OrderId,
    pub message: String,
    pub version: u32,
    pub timestamp: DateTime<Utc>,
}

impl NotificationSent {
    pub fn new(order_id: OrderId, message: impl Into<String>) -> Self {
        Self {
            order_id,
            message: message.into(),
            version: EVENT_VERSION,
            timestamp: Utc::now(),
        }
    }
}

impl IntegrationEvent for NotificationSent {
    const EVENT_TYPE: EventType = EventType::NotificationSent;

    fn validate(&self) -> Result<(), ValidationError> {
        require_order_id(&self.order_id, "orderId")?;
        if self.message.is_empty() {
            return Err(ValidationError::MissingField("message"));
        }
        Ok(())
    }

    fn correlation_id(&self) -> &OrderId {
        &self.order_id
    }
}

/// Extracts a best-effort order id from a raw payload of unknown type.
///
/// Looks at `orderId` first, then `id`. Returns `None` when the payload is
/// not a JSON object or carries neither as a non-empty string.
pub fn extract_correlation_id(payload: &[u8]) -> Option<OrderId> {
    let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
    ["orderId", "id"].into_iter().find_map(|key| {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(OrderId::from)
    })
}
