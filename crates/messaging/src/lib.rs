//! Messaging plumbing for the order-fulfillment choreography.
//!
//! This crate provides:
//! - Broker topology (topic exchange, per-type queues, dead-letter wiring)
//! - Publisher seam with typed, validated publishing
//! - Consumer loops with a bounded worker pool and ack-after-handle
//! - RabbitMQ (lapin) and in-memory brokers

pub mod delivery;
pub mod error;
pub mod listener;
pub mod memory;
pub mod publisher;
pub mod rabbitmq;
pub mod registry;
pub mod retry;
pub mod shutdown;
pub mod topology;

pub use delivery::{Acknowledger, Delivery, DeliveryStream, MessageSource, ReceivedMessage};
pub use error::{MessagingError, Result};
pub use listener::{EventListener, ListenerConfig};
pub use memory::{InMemoryBroker, PublishedMessage};
pub use publisher::{EventPublisher, EventPublisherExt, encode_event};
pub use rabbitmq::RabbitMqBroker;
pub use registry::{Disposition, EventHandler, HandlerRegistry};
pub use retry::{Backoff, RetryPolicy};
pub use shutdown::ShutdownSignal;
pub use topology::{Declaration, ExchangeKind, Topology};
