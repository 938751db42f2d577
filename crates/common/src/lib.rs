//! Shared identifiers and the closed set of event types exchanged over the broker.

pub mod event_type;
pub mod types;

pub use event_type::{EventType, UnknownEventType};
pub use types::{OrderId, ProductId, RecordId};
