use chrono::{DateTime, Utc};
use common::{OrderId, RecordId};
use serde::{Deserialize, Serialize};

use crate::EventStatus;

/// Correlation id stored when none could be extracted from a payload.
pub const UNKNOWN_ORDER_ID: &str = "unknown";

/// A raw event payload persisted for dead-letter audit and replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique identifier of this record.
    pub id: RecordId,

    /// Order the payload belongs to, or [`UNKNOWN_ORDER_ID`].
    pub order_id: OrderId,

    /// Routing key the payload is republished under.
    pub event_type: String,

    /// The serialized event exactly as it was seen on the wire.
    pub payload: Vec<u8>,

    /// Current lifecycle status.
    pub status: EventStatus,

    /// When the record was stored.
    pub created_at: DateTime<Utc>,

    /// When the record was last republished successfully.
    pub replayed_at: Option<DateTime<Utc>>,
}

impl EventRecord {
    /// Returns true once the payload has been republished.
    pub fn is_replayed(&self) -> bool {
        self.replayed_at.is_some()
    }
}

/// A record about to be stored. The store assigns `created_at`.
#[derive(Debug, Clone)]
pub struct NewEventRecord {
    pub id: RecordId,
    pub order_id: OrderId,
    pub event_type: String,
    pub payload: Vec<u8>,
    pub status: EventStatus,
}

impl NewEventRecord {
    /// A speculative copy of an event that could not be published.
    pub fn pending(
        order_id: impl Into<OrderId>,
        event_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self::with_status(order_id, event_type, payload, EventStatus::Pending)
    }

    /// An event captured from a dead-letter queue.
    pub fn failed(
        order_id: impl Into<OrderId>,
        event_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self::with_status(order_id, event_type, payload, EventStatus::Failed)
    }

    fn with_status(
        order_id: impl Into<OrderId>,
        event_type: impl Into<String>,
        payload: Vec<u8>,
        status: EventStatus,
    ) -> Self {
        let order_id = order_id.into();
        Self {
            id: RecordId::new(),
            order_id: if order_id.is_empty() {
                OrderId::new(UNKNOWN_ORDER_ID)
            } else {
                order_id
            },
            event_type: event_type.into(),
            payload,
            status,
        }
    }

    /// Materializes the record as stored at `created_at`.
    pub fn into_record(self, created_at: DateTime<Utc>) -> EventRecord {
        EventRecord {
            id: self.id,
            order_id: self.order_id,
            event_type: self.event_type,
            payload: self.payload,
            status: self.status,
            created_at,
            replayed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_order_id_falls_back_to_unknown() {
        let record = NewEventRecord::failed("", "order.created", b"{}".to_vec());
        assert_eq!(record.order_id.as_str(), UNKNOWN_ORDER_ID);
    }

    #[test]
    fn constructors_set_initial_status() {
        let pending = NewEventRecord::pending("o1", "order.created", vec![1]);
        let failed = NewEventRecord::failed("o1", "order.created", vec![1]);
        assert_eq!(pending.status, EventStatus::Pending);
        assert_eq!(failed.status, EventStatus::Failed);
        assert_ne!(pending.id, failed.id);
    }

    #[test]
    fn into_record_starts_unreplayed() {
        let now = Utc::now();
        let record = NewEventRecord::pending("o1", "order.created", vec![1]).into_record(now);
        assert_eq!(record.created_at, now);
        assert!(!record.is_replayed());
    }
}
