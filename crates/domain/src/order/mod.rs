//! Order aggregate and related types.

mod aggregate;
mod state;

pub use aggregate::{NOTIFICATION_SENT, Order, OrderUpdate, validate_transition};
pub use state::OrderStatus;

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The requested status change is not allowed from the current status.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },
}
