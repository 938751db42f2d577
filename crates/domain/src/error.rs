//! Domain error types.

use common::ProductId;
use thiserror::Error;

/// An event envelope or client request is missing data it needs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required identifier or text field is empty.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Quantity must be greater than 0.
    #[error("Invalid quantity: {0} (must be greater than 0)")]
    NonPositiveQuantity(i64),

    /// Amount must be a finite number greater than 0.
    #[error("Invalid amount: {0} (must be greater than 0)")]
    NonPositiveAmount(f64),
}

/// Errors raised by the product aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    /// Reserve and release only accept positive quantities.
    #[error("Invalid quantity: {0} (must be greater than 0)")]
    InvalidQuantity(i64),

    /// A release asked for more than is currently reserved.
    #[error("Cannot release {requested} of product {product_id}: only {reserved} reserved")]
    ReleaseExceedsReserved {
        product_id: ProductId,
        requested: i64,
        reserved: i64,
    },
}
