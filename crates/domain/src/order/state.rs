//! Order status state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The status of an order in the fulfillment choreography.
///
/// State transitions:
/// ```text
/// Requested ──► Processing ──┬──► Confirmed
///     │             │        │        │
///     └─────────────┴────────┴────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// A client asked for the order; no record exists yet.
    #[default]
    Requested,

    /// The order record exists and stock is being reserved.
    Processing,

    /// Stock is reserved for the order.
    Confirmed,

    /// The order will not be fulfilled (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the order record can be created from this status.
    pub fn can_start_processing(&self) -> bool {
        matches!(self, OrderStatus::Requested)
    }

    /// Returns true if a successful reservation can confirm the order.
    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderStatus::Processing)
    }

    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if stock is held for the order and must be released on
    /// cancellation.
    pub fn holds_reservation(&self) -> bool {
        matches!(self, OrderStatus::Confirmed)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Requested => "Requested",
            OrderStatus::Processing => "Processing",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Requested" => Ok(OrderStatus::Requested),
            "Processing" => Ok(OrderStatus::Processing),
            "Confirmed" => Ok(OrderStatus::Confirmed),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(other.to_string()),
        }
    }
}
