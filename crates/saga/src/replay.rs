//! On-demand republication of stored events.

use std::sync::Arc;

use common::{EventType, RecordId};
use event_store::{EventRecord, EventStore, EventStoreError, EventStoreExt};
use messaging::{EventPublisher, RetryPolicy};
use metrics::counter;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{Result, SagaError};

/// Records fetched per replay run.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Counts from one replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub replayed: usize,
    pub failed: usize,
    pub total: usize,
}

enum RecordOutcome {
    Replayed,
    Failed,
    /// Another replay run claimed the record first.
    Skipped,
}

/// Republishes `pending` and `failed` records under their stored event type.
pub struct ReplayCoordinator {
    store: Arc<dyn EventStore>,
    publisher: Arc<dyn EventPublisher>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl ReplayCoordinator {
    pub fn new(store: Arc<dyn EventStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            store,
            publisher,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::publish_default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replays one batch, oldest first.
    ///
    /// Every fetched record ends `completed` or `failed`. Returns
    /// `ReplayIncomplete` with the counts when any record failed.
    #[tracing::instrument(skip(self), fields(batch_size = self.batch_size))]
    pub async fn replay_failed_events(&self) -> Result<ReplaySummary> {
        let records = self.store.fetch_replayable(self.batch_size).await?;
        let mut summary = ReplaySummary {
            total: records.len(),
            ..ReplaySummary::default()
        };
        info!(total = summary.total, "Starting replay");

        for record in &records {
            match self.replay_record(record).await {
                RecordOutcome::Replayed => summary.replayed += 1,
                RecordOutcome::Failed => summary.failed += 1,
                RecordOutcome::Skipped => {}
            }
        }

        if summary.failed > 0 {
            warn!(
                replayed = summary.replayed,
                failed = summary.failed,
                total = summary.total,
                "Replay finished with failures"
            );
            return Err(SagaError::ReplayIncomplete {
                replayed: summary.replayed,
                failed: summary.failed,
                total: summary.total,
            });
        }

        info!(replayed = summary.replayed, total = summary.total, "Replay finished");
        Ok(summary)
    }

    async fn replay_record(&self, record: &EventRecord) -> RecordOutcome {
        let id = record.id;
        match self.store.mark_replaying(id).await {
            Ok(_) => {}
            Err(EventStoreError::InvalidStatusTransition { from, .. }) => {
                info!(record_id = %id, status = %from, "Record already claimed, skipping");
                return RecordOutcome::Skipped;
            }
            Err(e) => warn!(record_id = %id, error = %e, "Failed to mark record replaying"),
        }

        let Some(event_type) = EventType::from_routing_key(&record.event_type) else {
            error!(
                record_id = %id,
                event_type = %record.event_type,
                "Unknown event type, cannot replay"
            );
            self.settle(id, false).await;
            return RecordOutcome::Failed;
        };

        let routing_key = event_type.as_str();
        let published = self
            .retry
            .retry(routing_key, |_| self.publisher.publish(routing_key, &record.payload))
            .await;

        match published {
            Ok(()) => {
                counter!("events_replayed_total", "event_type" => routing_key).increment(1);
                info!(record_id = %id, order_id = %record.order_id, event_type = routing_key, "Event replayed");
                self.settle(id, true).await;
                RecordOutcome::Replayed
            }
            Err(e) => {
                counter!("events_replay_failed_total", "event_type" => routing_key).increment(1);
                error!(
                    record_id = %id,
                    order_id = %record.order_id,
                    event_type = routing_key,
                    error = %e,
                    "Replay exhausted retries"
                );
                self.settle(id, false).await;
                RecordOutcome::Failed
            }
        }
    }

    async fn settle(&self, id: RecordId, replayed: bool) {
        let result = if replayed {
            self.store.mark_completed(id).await
        } else {
            self.store.mark_failed(id).await
        };
        if let Err(e) = result {
            error!(record_id = %id, error = %e, "Failed to update record status");
        }
    }
}
