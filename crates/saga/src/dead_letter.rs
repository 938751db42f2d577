//! Persists dead-lettered messages for audit and replay.

use std::sync::Arc;

use async_trait::async_trait;
use common::{EventType, OrderId};
use domain::extract_correlation_id;
use event_store::{EventStore, EventStoreExt, UNKNOWN_ORDER_ID};
use messaging::{Disposition, EventHandler, HandlerRegistry, ReceivedMessage};
use metrics::counter;
use tracing::{error, info};

/// Consumes a dead-letter queue and stores every message as a `failed`
/// record. Never touches order or inventory state.
///
/// A message is only acknowledged once its record is stored; a store error
/// requeues it on the dead-letter queue.
pub struct DeadLetterCapture {
    store: Arc<dyn EventStore>,
}

impl DeadLetterCapture {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// The routing key a replay should use for this message.
    ///
    /// Per-type dead-letter queues carry `<type>.dlq` as routing key;
    /// messages rejected into the shared queue keep their original key.
    pub fn replay_event_type(message: &ReceivedMessage) -> String {
        EventType::from_routing_key(&message.routing_key)
            .or_else(|| EventType::from_routing_key(&message.queue))
            .map(|t| t.as_str().to_string())
            .unwrap_or_else(|| {
                if message.routing_key.is_empty() {
                    message.queue.clone()
                } else {
                    message.routing_key.clone()
                }
            })
    }
}

/// Registers one capture handler per dead-letter queue.
pub fn register_capture<I, Q>(registry: &mut HandlerRegistry, store: Arc<dyn EventStore>, queues: I)
where
    I: IntoIterator<Item = Q>,
    Q: Into<String>,
{
    let capture: Arc<dyn EventHandler> = Arc::new(DeadLetterCapture::new(store));
    for queue in queues {
        registry.register(queue, capture.clone());
    }
}

#[async_trait]
impl EventHandler for DeadLetterCapture {
    #[tracing::instrument(skip_all, fields(queue = %message.queue))]
    async fn handle(&self, message: &ReceivedMessage) -> Disposition {
        let event_type = Self::replay_event_type(message);
        let order_id = extract_correlation_id(&message.payload)
            .unwrap_or_else(|| OrderId::new(UNKNOWN_ORDER_ID));

        match self
            .store
            .store_failed(order_id.clone(), &event_type, message.payload.clone())
            .await
        {
            Ok(record) => {
                counter!("events_captured_total", "event_type" => event_type.clone()).increment(1);
                info!(
                    record_id = %record.id,
                    order_id = %order_id,
                    event_type = %event_type,
                    "Captured dead-lettered event"
                );
                Disposition::Ack
            }
            Err(e) => {
                error!(
                    order_id = %order_id,
                    event_type = %event_type,
                    error = %e,
                    "Failed to store dead-lettered event, requeueing"
                );
                Disposition::Requeue
            }
        }
    }
}
