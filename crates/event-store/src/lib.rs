//! Durable storage for events that were dead-lettered or could not be
//! published, plus the bookkeeping the replay coordinator needs.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod status;
pub mod store;

pub use error::{EventStoreError, Result};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use record::{EventRecord, NewEventRecord, UNKNOWN_ORDER_ID};
pub use status::EventStatus;
pub use store::{EventStore, EventStoreExt};
