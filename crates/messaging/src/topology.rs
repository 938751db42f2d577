//! Exchange, queue and binding layout.
//!
//! ```text
//!                       ┌──► order.requested ──(reject)──┐
//! order_events (topic) ─┼──► ...                          ├──► order_events.dlx (fanout) ──► <queue>.dlq
//!                       ├──► order.created.dlq            │
//!                       └──► ...                        ──┘
//! ```
//! Every event type gets a durable queue bound under its own name and
//! wired to the dead-letter exchange, plus a `<type>.dlq` queue bound under
//! its own name that saga steps publish failed input to directly.

use common::EventType;
use common::event_type::DEAD_LETTER_SUFFIX;

/// Kind of exchange to declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Topic,
    Fanout,
}

/// One element of the broker topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    Exchange {
        name: String,
        kind: ExchangeKind,
    },
    Queue {
        name: String,
        dead_letter_exchange: Option<String>,
    },
    Binding {
        queue: String,
        exchange: String,
        routing_key: String,
    },
}

/// The complete broker topology for the choreography.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    exchange: String,
    queue_name: String,
}

impl Topology {
    /// `exchange` is the topic exchange; `queue_name` names the shared
    /// dead-letter queue (`<queue_name>.dlq`).
    pub fn new(exchange: impl Into<String>, queue_name: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            queue_name: queue_name.into(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// The fanout exchange rejected messages are routed through.
    pub fn dead_letter_exchange(&self) -> String {
        format!("{}.dlx", self.exchange)
    }

    /// The queue collecting everything routed through the dead-letter exchange.
    pub fn shared_dead_letter_queue(&self) -> String {
        format!("{}{}", self.queue_name, DEAD_LETTER_SUFFIX)
    }

    /// Every queue that dead-letter capture consumes from.
    pub fn dead_letter_queues(&self) -> Vec<String> {
        EventType::ALL
            .iter()
            .map(EventType::dead_letter_queue)
            .chain(std::iter::once(self.shared_dead_letter_queue()))
            .collect()
    }

    /// Declarations in the order they must be applied.
    pub fn declarations(&self) -> Vec<Declaration> {
        let dlx = self.dead_letter_exchange();
        let shared_dlq = self.shared_dead_letter_queue();

        let mut declarations = vec![
            Declaration::Exchange {
                name: self.exchange.clone(),
                kind: ExchangeKind::Topic,
            },
            Declaration::Exchange {
                name: dlx.clone(),
                kind: ExchangeKind::Fanout,
            },
            Declaration::Queue {
                name: shared_dlq.clone(),
                dead_letter_exchange: None,
            },
            Declaration::Binding {
                queue: shared_dlq,
                exchange: dlx.clone(),
                routing_key: String::new(),
            },
        ];

        for event_type in EventType::ALL {
            let queue = event_type.as_str().to_string();
            let dlq = event_type.dead_letter_queue();

            declarations.push(Declaration::Queue {
                name: queue.clone(),
                dead_letter_exchange: Some(dlx.clone()),
            });
            declarations.push(Declaration::Binding {
                queue: queue.clone(),
                exchange: self.exchange.clone(),
                routing_key: queue,
            });
            declarations.push(Declaration::Queue {
                name: dlq.clone(),
                dead_letter_exchange: None,
            });
            declarations.push(Declaration::Binding {
                queue: dlq.clone(),
                exchange: self.exchange.clone(),
                routing_key: dlq,
            });
        }

        declarations
    }
}
