use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::ReceivedMessage;

/// How the consumer loop settles a delivery once its handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Fully handled, including any dead-lettering the handler did itself.
    Ack,
    /// Not handled; return it to its queue for another attempt.
    Requeue,
    /// Cannot be handled here; reject it into the dead-letter exchange.
    DeadLetter,
}

/// Business logic attached to a queue.
///
/// The consumer loop settles the delivery according to the returned
/// [`Disposition`] only after `handle` completes, and dead-letters it if
/// `handle` panics.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, message: &ReceivedMessage) -> Disposition;
}

/// Maps queue names to the handler consuming them.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `queue`, replacing any previous handler.
    pub fn register(&mut self, queue: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(queue.into(), handler);
    }

    pub fn get(&self, queue: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(queue).cloned()
    }

    /// Registered queue names, sorted.
    pub fn queues(&self) -> Vec<String> {
        let mut queues: Vec<_> = self.handlers.keys().cloned().collect();
        queues.sort();
        queues
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Counting(AtomicUsize);

    #[async_trait]
    impl EventHandler for Counting {
        async fn handle(&self, _message: &ReceivedMessage) -> Disposition {
            self.0.fetch_add(1, Ordering::SeqCst);
            Disposition::Ack
        }
    }

    #[tokio::test]
    async fn dispatches_to_registered_handler() {
        let handler = Arc::new(Counting(AtomicUsize::new(0)));
        let mut registry = HandlerRegistry::new();
        registry.register("order.created", handler.clone());

        let message = ReceivedMessage {
            queue: "order.created".into(),
            routing_key: "order.created".into(),
            payload: b"{}".to_vec(),
            redelivered: false,
        };
        let disposition = registry.get("order.created").unwrap().handle(&message).await;

        assert_eq!(disposition, Disposition::Ack);

        assert_eq!(handler.0.load(Ordering::SeqCst), 1);
        assert!(registry.get("order.cancelled").is_none());
    }

    #[test]
    fn register_replaces_and_lists_sorted() {
        let mut registry = HandlerRegistry::new();
        registry.register("b", Arc::new(Counting(AtomicUsize::new(0))));
        registry.register("a", Arc::new(Counting(AtomicUsize::new(0))));
        registry.register("b", Arc::new(Counting(AtomicUsize::new(0))));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.queues(), vec!["a".to_string(), "b".to_string()]);
    }
}
