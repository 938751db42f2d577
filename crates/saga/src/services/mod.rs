//! External collaborators consumed by the saga steps, with in-memory and
//! PostgreSQL implementations.

pub mod inventory;
pub mod notification;
pub mod orders;
pub mod postgres;

pub use inventory::{InMemoryInventoryService, InventoryService, seed_catalog};
pub use notification::{
    Channel, InMemoryNotificationService, LogNotificationService, NotificationKind,
    NotificationRequest, NotificationService, NotificationServiceExt,
};
pub use orders::{InMemoryOrderRepository, OrderRepository};
pub use postgres::{PostgresInventoryService, PostgresOrderRepository};
