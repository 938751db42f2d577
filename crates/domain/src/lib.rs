//! Domain layer for the order-fulfillment choreography.
//!
//! This crate provides:
//! - Integration event envelopes and their validation rules
//! - Order aggregate with its status state machine
//! - Product aggregate with atomic reserve/release semantics

pub mod error;
pub mod events;
pub mod order;
pub mod product;

pub use error::{ProductError, ValidationError};
pub use events::{
    EVENT_VERSION, InventoryStatusUpdated, IntegrationEvent, NotificationSent, OrderCancelled,
    OrderCreated, OrderRequested, ProductSnapshot, extract_correlation_id,
};
pub use order::{NOTIFICATION_SENT, Order, OrderError, OrderStatus, OrderUpdate};
pub use product::{Product, sample_catalog};
