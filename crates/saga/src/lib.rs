//! Choreographed order fulfillment.
//!
//! There is no coordinator driving the workflow: each step reacts to one
//! event and publishes the next. This crate provides:
//! - The five saga step handlers and their shared publish/dead-letter policy
//! - Dead-letter capture into the event store
//! - The on-demand replay coordinator
//! - Order intake, the client-facing start of the chain
//! - Collaborator traits (orders, inventory, notifications) with in-memory
//!   and PostgreSQL implementations

pub mod dead_letter;
pub mod error;
pub mod intake;
pub mod replay;
pub mod services;
pub mod steps;

pub use dead_letter::{DeadLetterCapture, register_capture};
pub use error::{Result, SagaError};
pub use intake::{CreateOrderRequest, OrderIntake};
pub use replay::{DEFAULT_BATCH_SIZE, ReplayCoordinator, ReplaySummary};
pub use services::{
    Channel, InMemoryInventoryService, InMemoryNotificationService, InMemoryOrderRepository,
    InventoryService, LogNotificationService, NotificationKind, NotificationRequest,
    NotificationService, NotificationServiceExt, OrderRepository, PostgresInventoryService,
    PostgresOrderRepository, seed_catalog,
};
pub use steps::{
    Collaborators, InventoryStatusUpdatedStep, NotificationSentStep, OrderCancelledStep,
    OrderCreatedStep, OrderRequestedStep, SagaStep, StepContext, StepHandler, StepOutcome,
    register_steps,
};
