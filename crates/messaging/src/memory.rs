//! In-process broker for tests and broker-less runs.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::{
    Acknowledger, Delivery, DeliveryStream, EventPublisher, MessageSource, MessagingError,
    ReceivedMessage, Result, publisher::check_publish_args,
};

/// A message accepted by [`InMemoryBroker::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub routing_key: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone)]
struct QueuedMessage {
    routing_key: String,
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Default)]
struct QueueState {
    messages: Mutex<VecDeque<QueuedMessage>>,
    notify: Notify,
    interrupted: AtomicBool,
}

#[derive(Default)]
struct Inner {
    queues: Mutex<HashMap<String, Arc<QueueState>>>,
    published: Mutex<Vec<PublishedMessage>>,
    acked: Mutex<Vec<ReceivedMessage>>,
    rejected: Mutex<Vec<ReceivedMessage>>,
    dead_letter_queue: Option<String>,
    disconnected: AtomicBool,
    fail_all_publishes: AtomicBool,
    failing_publishes: AtomicUsize,
    failing_consumes: AtomicUsize,
    consume_attempts: AtomicUsize,
}

impl Inner {
    async fn queue(&self, name: &str) -> Arc<QueueState> {
        self.queues
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    async fn enqueue(&self, queue: &str, message: QueuedMessage) {
        let state = self.queue(queue).await;
        state.messages.lock().await.push_back(message);
        state.notify.notify_one();
    }
}

/// In-memory broker implementing both sides of the broker seam.
///
/// Every routing key is bound to the queue of the same name, which matches
/// how the topic exchange is laid out. Rejected messages go to the
/// configured dead-letter queue, standing in for the dead-letter exchange.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a broker that routes messages rejected without requeue to
    /// `queue`.
    pub fn with_dead_letter_queue(queue: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                dead_letter_queue: Some(queue.into()),
                ..Inner::default()
            }),
        }
    }

    /// Puts a raw message on `queue` without the publish checks.
    pub async fn enqueue(&self, queue: &str, routing_key: &str, payload: impl Into<Vec<u8>>) {
        self.inner
            .enqueue(
                queue,
                QueuedMessage {
                    routing_key: routing_key.to_string(),
                    payload: payload.into(),
                    redelivered: false,
                },
            )
            .await;
    }

    /// Every message accepted so far, in publish order.
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.inner.published.lock().await.clone()
    }

    /// Payloads accepted under `routing_key`, in publish order.
    pub async fn published_to(&self, routing_key: &str) -> Vec<Vec<u8>> {
        self.inner
            .published
            .lock()
            .await
            .iter()
            .filter(|m| m.routing_key == routing_key)
            .map(|m| m.payload.clone())
            .collect()
    }

    pub async fn acked(&self) -> Vec<ReceivedMessage> {
        self.inner.acked.lock().await.clone()
    }

    pub async fn rejected(&self) -> Vec<ReceivedMessage> {
        self.inner.rejected.lock().await.clone()
    }

    /// Messages waiting on `queue`.
    pub async fn queue_depth(&self, queue: &str) -> usize {
        self.inner.queue(queue).await.messages.lock().await.len()
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.disconnected.store(!connected, Ordering::SeqCst);
    }

    /// Makes every publish fail until reset.
    pub fn set_fail_publishes(&self, fail: bool) {
        self.inner.fail_all_publishes.store(fail, Ordering::SeqCst);
    }

    /// Makes the next `n` publishes fail.
    pub fn fail_next_publishes(&self, n: usize) {
        self.inner.failing_publishes.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` consume calls fail.
    pub fn fail_next_consumes(&self, n: usize) {
        self.inner.failing_consumes.store(n, Ordering::SeqCst);
    }

    pub fn consume_attempts(&self) -> usize {
        self.inner.consume_attempts.load(Ordering::SeqCst)
    }

    /// Ends the open delivery stream on `queue`, as a dropped channel would.
    pub async fn interrupt(&self, queue: &str) {
        let state = self.inner.queue(queue).await;
        state.interrupted.store(true, Ordering::SeqCst);
        state.notify.notify_one();
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl EventPublisher for InMemoryBroker {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<()> {
        check_publish_args(routing_key, payload)?;

        if self.inner.disconnected.load(Ordering::SeqCst) {
            return Err(MessagingError::ConnectionClosed);
        }
        if self.inner.fail_all_publishes.load(Ordering::SeqCst)
            || take_one(&self.inner.failing_publishes)
        {
            return Err(MessagingError::Publish(format!(
                "simulated failure publishing to {routing_key}"
            )));
        }

        self.inner.published.lock().await.push(PublishedMessage {
            routing_key: routing_key.to_string(),
            payload: payload.to_vec(),
        });
        self.inner
            .enqueue(
                routing_key,
                QueuedMessage {
                    routing_key: routing_key.to_string(),
                    payload: payload.to_vec(),
                    redelivered: false,
                },
            )
            .await;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.inner.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSource for InMemoryBroker {
    async fn consume(&self, queue: &str, _prefetch: u16) -> Result<DeliveryStream> {
        self.inner.consume_attempts.fetch_add(1, Ordering::SeqCst);

        if take_one(&self.inner.failing_consumes) {
            return Err(MessagingError::Consume(format!(
                "simulated failure consuming {queue}"
            )));
        }
        if self.inner.disconnected.load(Ordering::SeqCst) {
            return Err(MessagingError::ConnectionClosed);
        }

        let state = self.inner.queue(queue).await;
        state.interrupted.store(false, Ordering::SeqCst);

        let seed = (self.inner.clone(), state, queue.to_string());
        let stream = futures_util::stream::unfold(seed, |(inner, state, queue)| async move {
            loop {
                if state.interrupted.load(Ordering::SeqCst) {
                    return None;
                }

                let next = state.messages.lock().await.pop_front();
                if let Some(queued) = next {
                    let message = ReceivedMessage {
                        queue: queue.clone(),
                        routing_key: queued.routing_key,
                        payload: queued.payload,
                        redelivered: queued.redelivered,
                    };
                    let acker = InMemoryAcker {
                        inner: inner.clone(),
                        message: message.clone(),
                    };
                    let delivery = Delivery::new(message, Box::new(acker));
                    return Some((Ok(delivery), (inner, state, queue)));
                }

                state.notify.notified().await;
            }
        });

        Ok(Box::pin(stream))
    }
}

struct InMemoryAcker {
    inner: Arc<Inner>,
    message: ReceivedMessage,
}

#[async_trait]
impl Acknowledger for InMemoryAcker {
    async fn ack(&self) -> Result<()> {
        self.inner.acked.lock().await.push(self.message.clone());
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> Result<()> {
        self.inner.rejected.lock().await.push(self.message.clone());

        let target = if requeue {
            Some(self.message.queue.clone())
        } else {
            self.inner.dead_letter_queue.clone()
        };

        if let Some(queue) = target {
            self.inner
                .enqueue(
                    &queue,
                    QueuedMessage {
                        routing_key: self.message.routing_key.clone(),
                        payload: self.message.payload.clone(),
                        redelivered: requeue,
                    },
                )
                .await;
        }
        Ok(())
    }
}
