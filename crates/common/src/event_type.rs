//! The fixed set of event types routed through the topic exchange.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Suffix appended to an event type to name its dead-letter queue.
pub const DEAD_LETTER_SUFFIX: &str = ".dlq";

/// An event type. Its string form doubles as routing key and queue name.
///
/// The choreography chain:
/// ```text
/// order.requested ──► order.created ──► inventory.status.updated ──► notification.sent
///                                                  │
///                                                  └──► order.cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "order.requested")]
    OrderRequested,
    #[serde(rename = "order.created")]
    OrderCreated,
    #[serde(rename = "order.cancelled")]
    OrderCancelled,
    #[serde(rename = "inventory.status.updated")]
    InventoryStatusUpdated,
    #[serde(rename = "notification.sent")]
    NotificationSent,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [EventType; 5] = [
        EventType::OrderRequested,
        EventType::OrderCreated,
        EventType::OrderCancelled,
        EventType::InventoryStatusUpdated,
        EventType::NotificationSent,
    ];

    /// Returns the routing key for this event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OrderRequested => "order.requested",
            EventType::OrderCreated => "order.created",
            EventType::OrderCancelled => "order.cancelled",
            EventType::InventoryStatusUpdated => "inventory.status.updated",
            EventType::NotificationSent => "notification.sent",
        }
    }

    /// Returns the name of this event type's dead-letter queue (`<type>.dlq`).
    pub fn dead_letter_queue(&self) -> String {
        format!("{}{}", self.as_str(), DEAD_LETTER_SUFFIX)
    }

    /// Resolves a routing key or queue name to an event type.
    ///
    /// Accepts both `<type>` and `<type>.dlq`.
    pub fn from_routing_key(key: &str) -> Option<Self> {
        let base = key.strip_suffix(DEAD_LETTER_SUFFIX).unwrap_or(key);
        base.parse().ok()
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returned when a string does not name one of the known event types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_known_type() {
        for event_type in EventType::ALL {
            assert_eq!(event_type.as_str().parse::<EventType>(), Ok(event_type));
        }
    }

    #[test]
    fn rejects_unknown_type() {
        let err = "order.shipped".parse::<EventType>().unwrap_err();
        assert_eq!(err, UnknownEventType("order.shipped".to_string()));
    }

    #[test]
    fn dead_letter_queue_appends_suffix() {
        assert_eq!(
            EventType::InventoryStatusUpdated.dead_letter_queue(),
            "inventory.status.updated.dlq"
        );
    }

    #[test]
    fn from_routing_key_accepts_dead_letter_form() {
        assert_eq!(
            EventType::from_routing_key("order.created.dlq"),
            Some(EventType::OrderCreated)
        );
        assert_eq!(
            EventType::from_routing_key("order.created"),
            Some(EventType::OrderCreated)
        );
        assert_eq!(EventType::from_routing_key("order_events_queue.dlq"), None);
    }

    #[test]
    fn serializes_as_routing_key() {
        let json = serde_json::to_string(&EventType::NotificationSent).unwrap();
        assert_eq!(json, "\"notification.sent\"");
    }
}
