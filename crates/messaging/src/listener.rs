//! Per-queue consumer loops with a bounded worker pool.
//!
//! Each registered queue runs its own loop:
//! ```text
//! Connecting ──► Consuming ──┬──► Draining      (shutdown)
//!     ▲                      └──► Reconnecting  (stream ended)
//!     └───────────────────────────────┘
//! ```
//! A delivery is settled only after its handler returns, as the handler's
//! [`Disposition`] says. A handler that panics gets its delivery rejected
//! without requeue, which sends it through the dead-letter exchange.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{FutureExt, StreamExt};
use metrics::{counter, histogram};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::{
    Delivery, DeliveryStream, Disposition, EventHandler, HandlerRegistry, MessageSource,
    RetryPolicy, ShutdownSignal,
};

/// Tuning for consumer loops.
#[derive(Debug, Clone, Copy)]
pub struct ListenerConfig {
    /// Maximum handler tasks running at once per queue. Also used as the
    /// broker prefetch count.
    pub max_in_flight: usize,
    /// Policy for opening a consumer. Exhausting it abandons the queue.
    pub connect_retry: RetryPolicy,
    /// Pause before reopening a consumer whose stream ended.
    pub reconnect_delay: Duration,
    /// How long shutdown waits for in-flight handlers before aborting them.
    pub drain_timeout: Duration,
    /// Pause before handing a [`Disposition::Requeue`] delivery back to the
    /// broker. The worker slot stays taken meanwhile.
    pub requeue_delay: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 16,
            connect_retry: RetryPolicy::connect_default(),
            reconnect_delay: Duration::from_secs(2),
            drain_timeout: Duration::from_secs(30),
            requeue_delay: Duration::from_secs(1),
        }
    }
}

/// Runs one consumer loop per registered queue.
pub struct EventListener {
    source: Arc<dyn MessageSource>,
    registry: HandlerRegistry,
    config: ListenerConfig,
}

impl EventListener {
    pub fn new(
        source: Arc<dyn MessageSource>,
        registry: HandlerRegistry,
        config: ListenerConfig,
    ) -> Self {
        Self {
            source,
            registry,
            config,
        }
    }

    /// Spawns [`EventListener::run`] onto the runtime.
    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Consumes every registered queue until `shutdown` trips.
    ///
    /// Returns once every loop has stopped and drained. A queue whose
    /// consumer cannot be opened is abandoned without affecting the others.
    pub async fn run(self, shutdown: ShutdownSignal) {
        let mut loops = JoinSet::new();

        for queue in self.registry.queues() {
            let Some(handler) = self.registry.get(&queue) else {
                continue;
            };
            let consumer = QueueConsumer {
                queue,
                handler,
                source: self.source.clone(),
                config: self.config,
            };
            loops.spawn(consumer.run(shutdown.clone()));
        }

        info!(queues = loops.len(), "Event listener started");

        while let Some(result) = loops.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Consumer loop task failed");
            }
        }

        info!("Event listener stopped");
    }
}

enum StreamEnd {
    Shutdown,
    Interrupted,
}

struct QueueConsumer {
    queue: String,
    handler: Arc<dyn EventHandler>,
    source: Arc<dyn MessageSource>,
    config: ListenerConfig,
}

impl QueueConsumer {
    async fn run(self, shutdown: ShutdownSignal) {
        let policy = self.config.connect_retry;
        let max_attempts = policy.max_attempts.max(1);
        let prefetch = u16::try_from(self.config.max_in_flight).unwrap_or(u16::MAX);
        let mut failed_attempts = 0;

        while !shutdown.is_triggered() {
            let stream = match self.source.consume(&self.queue, prefetch).await {
                Ok(stream) => stream,
                Err(e) => {
                    failed_attempts += 1;
                    if failed_attempts >= max_attempts {
                        error!(
                            queue = %self.queue,
                            attempts = failed_attempts,
                            error = %e,
                            "Could not start consumer, abandoning queue"
                        );
                        return;
                    }

                    let delay = policy.delay_for(failed_attempts);
                    warn!(
                        queue = %self.queue,
                        attempt = failed_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Failed to start consumer, retrying"
                    );
                    if sleep_unless_shutdown(delay, &shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            failed_attempts = 0;
            info!(
                queue = %self.queue,
                max_in_flight = self.config.max_in_flight,
                "Consuming queue"
            );

            match self.consume(stream, &shutdown).await {
                StreamEnd::Shutdown => break,
                StreamEnd::Interrupted => {
                    warn!(queue = %self.queue, "Consumer interrupted, reconnecting");
                    if sleep_unless_shutdown(self.config.reconnect_delay, &shutdown).await {
                        break;
                    }
                }
            }
        }

        info!(queue = %self.queue, "Consumer stopped");
    }

    async fn consume(&self, mut stream: DeliveryStream, shutdown: &ShutdownSignal) -> StreamEnd {
        let permits = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut in_flight = JoinSet::new();

        let end = loop {
            while let Some(result) = in_flight.try_join_next() {
                log_join_result(&self.queue, result);
            }

            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break StreamEnd::Shutdown,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break StreamEnd::Interrupted,
                },
            };

            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break StreamEnd::Shutdown,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    debug!(
                        queue = %self.queue,
                        routing_key = %delivery.message.routing_key,
                        redelivered = delivery.message.redelivered,
                        "Dispatching message"
                    );
                    in_flight.spawn(dispatch(
                        self.handler.clone(),
                        delivery,
                        self.config.requeue_delay,
                        permit,
                    ));
                }
                Some(Err(e)) => {
                    error!(queue = %self.queue, error = %e, "Consumer stream failed");
                    break StreamEnd::Interrupted;
                }
                None => break StreamEnd::Interrupted,
            }
        };

        self.drain(in_flight).await;
        end
    }

    async fn drain(&self, mut in_flight: JoinSet<()>) {
        if in_flight.is_empty() {
            return;
        }

        info!(
            queue = %self.queue,
            pending = in_flight.len(),
            "Draining in-flight handlers"
        );

        let drained = tokio::time::timeout(self.config.drain_timeout, async {
            while let Some(result) = in_flight.join_next().await {
                log_join_result(&self.queue, result);
            }
        })
        .await;

        if drained.is_err() {
            // Unacknowledged deliveries are redelivered by the broker.
            warn!(
                queue = %self.queue,
                remaining = in_flight.len(),
                "Drain timeout reached, aborting handlers"
            );
            in_flight.abort_all();
        }
    }
}

/// Runs the handler and settles the delivery. Holds `_permit` until done.
async fn dispatch(
    handler: Arc<dyn EventHandler>,
    delivery: Delivery,
    requeue_delay: Duration,
    _permit: OwnedSemaphorePermit,
) {
    let queue = delivery.message.queue.clone();
    let started = Instant::now();

    let outcome = AssertUnwindSafe(handler.handle(&delivery.message))
        .catch_unwind()
        .await;

    histogram!("handler_duration_seconds", "queue" => queue.clone())
        .record(started.elapsed().as_secs_f64());

    match outcome {
        Ok(Disposition::Ack) => {
            if let Err(e) = delivery.ack().await {
                error!(queue = %queue, error = %e, "Failed to acknowledge message");
            }
        }
        Ok(Disposition::Requeue) => {
            counter!("handler_requeued_total", "queue" => queue.clone()).increment(1);
            warn!(queue = %queue, "Handler asked for redelivery, requeueing message");
            tokio::time::sleep(requeue_delay).await;
            if let Err(e) = delivery.reject(true).await {
                error!(queue = %queue, error = %e, "Failed to requeue message");
            }
        }
        Ok(Disposition::DeadLetter) => {
            warn!(queue = %queue, "Handler gave up, dead-lettering message");
            if let Err(e) = delivery.reject(false).await {
                error!(queue = %queue, error = %e, "Failed to reject message");
            }
        }
        Err(panic) => {
            counter!("handler_panics_total", "queue" => queue.clone()).increment(1);
            error!(
                queue = %queue,
                panic = panic_message(panic.as_ref()),
                "Handler panicked, dead-lettering message"
            );
            if let Err(e) = delivery.reject(false).await {
                error!(queue = %queue, error = %e, "Failed to reject message");
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn log_join_result(queue: &str, result: Result<(), JoinError>) {
    if let Err(e) = result
        && !e.is_cancelled()
    {
        error!(queue = %queue, error = %e, "Handler task failed");
    }
}

/// Sleeps for `delay`. Returns true if shutdown tripped first.
async fn sleep_unless_shutdown(delay: Duration, shutdown: &ShutdownSignal) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
