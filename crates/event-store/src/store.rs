use async_trait::async_trait;
use common::{OrderId, RecordId};

use crate::{EventRecord, EventStatus, NewEventRecord, Result};

/// Core trait for event store implementations.
///
/// The store is shared by dead-letter capture and the replay coordinator.
/// Every mutation is keyed by a single record id; there are no
/// cross-record transactions. All implementations must be thread-safe.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Stores a new record.
    ///
    /// Fails with `InvalidInitialStatus` unless the record is `pending` or
    /// `failed`.
    async fn append(&self, record: NewEventRecord) -> Result<EventRecord>;

    /// Retrieves a record by id.
    async fn get(&self, id: RecordId) -> Result<Option<EventRecord>>;

    /// Returns up to `limit` records eligible for replay (`pending` or
    /// `failed`), oldest first. Ties on creation time keep insertion order.
    async fn fetch_replayable(&self, limit: usize) -> Result<Vec<EventRecord>>;

    /// Moves a record to `to`, validating the edge against its current
    /// status. Entering `completed` stamps the replay time.
    async fn transition(&self, id: RecordId, to: EventStatus) -> Result<EventRecord>;

    /// Counts records currently in `status`.
    async fn count_by_status(&self, status: EventStatus) -> Result<usize>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Stores a payload that could not be published.
    async fn store_pending(
        &self,
        order_id: OrderId,
        event_type: &str,
        payload: Vec<u8>,
    ) -> Result<EventRecord> {
        self.append(NewEventRecord::pending(order_id, event_type, payload))
            .await
    }

    /// Stores a payload captured from a dead-letter queue.
    async fn store_failed(
        &self,
        order_id: OrderId,
        event_type: &str,
        payload: Vec<u8>,
    ) -> Result<EventRecord> {
        self.append(NewEventRecord::failed(order_id, event_type, payload))
            .await
    }

    async fn mark_replaying(&self, id: RecordId) -> Result<EventRecord> {
        self.transition(id, EventStatus::Replaying).await
    }

    async fn mark_completed(&self, id: RecordId) -> Result<EventRecord> {
        self.transition(id, EventStatus::Completed).await
    }

    async fn mark_failed(&self, id: RecordId) -> Result<EventRecord> {
        self.transition(id, EventStatus::Failed).await
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}
