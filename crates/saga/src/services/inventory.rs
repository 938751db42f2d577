//! Inventory service trait and in-memory implementation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::ProductId;
use domain::{Product, sample_catalog};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{Result, SagaError};

/// Stock management consumed by the saga steps and the HTTP surface.
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Atomically moves `quantity` units from available to reserved.
    ///
    /// Returns `false` with no state change when fewer than `quantity`
    /// units are available. An unknown product is `ProductNotFound`.
    async fn reserve(&self, product_id: &ProductId, quantity: i64) -> Result<bool>;

    /// Returns `quantity` reserved units to available stock.
    async fn release(&self, product_id: &ProductId, quantity: i64) -> Result<()>;

    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>>;

    /// All products ordered by id.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Products whose available quantity is below `threshold`.
    async fn low_stock(&self, threshold: i64) -> Result<Vec<Product>>;

    /// Inserts the product unless one with the same id exists.
    async fn add_product(&self, product: Product) -> Result<bool>;
}

/// Loads the sample catalog, skipping products that already exist.
/// Returns how many were inserted.
pub async fn seed_catalog(inventory: &dyn InventoryService) -> Result<usize> {
    let mut inserted = 0;
    for product in sample_catalog() {
        if inventory.add_product(product).await? {
            inserted += 1;
        }
    }
    info!(inserted, "Seeded product catalog");
    Ok(inserted)
}

/// In-memory inventory service for tests and database-less runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryService {
    products: Arc<RwLock<BTreeMap<ProductId, Product>>>,
    fail: Arc<AtomicBool>,
}

impl InMemoryInventoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a service holding `products`.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let products = products.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            products: Arc::new(RwLock::new(products)),
            fail: Arc::default(),
        }
    }

    /// Makes every call fail until reset.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SagaError::InventoryService(
                "inventory service unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryService for InMemoryInventoryService {
    async fn reserve(&self, product_id: &ProductId, quantity: i64) -> Result<bool> {
        self.check_available()?;
        let mut products = self.products.write().await;
        let product = products
            .get_mut(product_id)
            .ok_or_else(|| SagaError::ProductNotFound(product_id.clone()))?;
        Ok(product.reserve(quantity)?)
    }

    async fn release(&self, product_id: &ProductId, quantity: i64) -> Result<()> {
        self.check_available()?;
        let mut products = self.products.write().await;
        let product = products
            .get_mut(product_id)
            .ok_or_else(|| SagaError::ProductNotFound(product_id.clone()))?;
        Ok(product.release(quantity)?)
    }

    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        self.check_available()?;
        Ok(self.products.read().await.get(product_id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        self.check_available()?;
        Ok(self.products.read().await.values().cloned().collect())
    }

    async fn low_stock(&self, threshold: i64) -> Result<Vec<Product>> {
        self.check_available()?;
        Ok(self
            .products
            .read()
            .await
            .values()
            .filter(|p| p.is_low_stock(threshold))
            .cloned()
            .collect())
    }

    async fn add_product(&self, product: Product) -> Result<bool> {
        self.check_available()?;
        let mut products = self.products.write().await;
        if products.contains_key(&product.id) {
            return Ok(false);
        }
        products.insert(product.id.clone(), product);
        Ok(true)
    }
}
