//! Order repository trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::OrderId;
use domain::{Order, OrderUpdate};
use tokio::sync::RwLock;

use crate::error::{Result, SagaError};

/// Persistence for order records. Saga steps only read and patch orders;
/// they never hold one across steps.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts the order unless one with the same id already exists.
    ///
    /// Returns `true` when the order was inserted, so a redelivered
    /// request does not fail.
    async fn create_order(&self, order: &Order) -> Result<bool>;

    /// Looks an order up by id.
    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>>;

    /// Applies a partial update and returns the updated order.
    ///
    /// Fails with `OrderNotFound` for an unknown id and with an order
    /// error when the status change is not an edge of the state machine.
    async fn update_order(&self, id: &OrderId, update: OrderUpdate) -> Result<Order>;
}

/// In-memory order repository for tests and database-less runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    fail: Arc<AtomicBool>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail until reset.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Stores an order as-is, replacing any existing one.
    pub async fn insert(&self, order: Order) {
        self.orders.write().await.insert(order.id.clone(), order);
    }

    fn check_available(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SagaError::OrderRepository(
                "order repository unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create_order(&self, order: &Order) -> Result<bool> {
        self.check_available()?;
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Ok(false);
        }
        orders.insert(order.id.clone(), order.clone());
        Ok(true)
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>> {
        self.check_available()?;
        Ok(self.orders.read().await.get(id).cloned())
    }

    async fn update_order(&self, id: &OrderId, update: OrderUpdate) -> Result<Order> {
        self.check_available()?;
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(id)
            .ok_or_else(|| SagaError::OrderNotFound(id.clone()))?;

        // apply to a copy so a refused transition leaves the record untouched
        let mut updated = order.clone();
        updated.apply_update(update)?;
        *order = updated.clone();
        Ok(updated)
    }
}
