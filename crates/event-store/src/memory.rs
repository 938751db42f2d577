use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::RecordId;
use tokio::sync::RwLock;

use crate::{
    EventRecord, EventStatus, EventStoreError, NewEventRecord, Result, store::EventStore,
};

/// In-memory event store implementation for testing.
///
/// Records live in insertion order, which doubles as the tie-break for
/// equal creation times.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    records: Arc<RwLock<Vec<EventRecord>>>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records stored.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns a copy of every record in insertion order.
    pub async fn all(&self) -> Vec<EventRecord> {
        self.records.read().await.clone()
    }

    /// Inserts a fully formed record, bypassing initial-status checks.
    /// Lets tests control creation times.
    pub async fn insert_raw(&self, record: EventRecord) {
        self.records.write().await.push(record);
    }

    /// Makes `append` and `transition` fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(EventStoreError::Unavailable(
                "simulated write failure".to_string(),
            ));
        }
        Ok(())
    }

    /// Clears all records.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, record: NewEventRecord) -> Result<EventRecord> {
        self.check_writable()?;
        if !record.status.is_initial() {
            return Err(EventStoreError::InvalidInitialStatus(record.status));
        }

        // Stamp under the lock so creation order matches insertion order.
        let mut records = self.records.write().await;
        let stored = record.into_record(Utc::now());
        records.push(stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: RecordId) -> Result<Option<EventRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn fetch_replayable(&self, limit: usize) -> Result<Vec<EventRecord>> {
        let records = self.records.read().await;
        let mut replayable: Vec<_> = records
            .iter()
            .filter(|r| r.status.is_replayable())
            .cloned()
            .collect();
        // stable sort keeps insertion order among equal timestamps
        replayable.sort_by_key(|r| r.created_at);
        replayable.truncate(limit);
        Ok(replayable)
    }

    async fn transition(&self, id: RecordId, to: EventStatus) -> Result<EventRecord> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(EventStoreError::RecordNotFound(id))?;

        if !record.status.can_transition_to(to) {
            return Err(EventStoreError::InvalidStatusTransition {
                id,
                from: record.status,
                to,
            });
        }

        record.status = to;
        if to == EventStatus::Completed {
            record.replayed_at = Some(Utc::now());
        }
        Ok(record.clone())
    }

    async fn count_by_status(&self, status: EventStatus) -> Result<usize> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| r.status == status).count())
    }
}
