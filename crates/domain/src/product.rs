//! Product aggregate owned by the inventory collaborator.

use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::ProductError;

/// Stock for one product.
///
/// `quantity` is what can still be reserved; `reserved` is held for orders.
/// Reserve and release move units between the two and never change their sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub quantity: i64,
    pub reserved: i64,
}

impl Product {
    pub fn new(id: impl Into<ProductId>, name: impl Into<String>, quantity: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            quantity,
            reserved: 0,
        }
    }

    /// Reserves `n` units if at least `n` are available.
    ///
    /// Returns `Ok(false)` without touching state on insufficient stock.
    pub fn reserve(&mut self, n: i64) -> Result<bool, ProductError> {
        if n <= 0 {
            return Err(ProductError::InvalidQuantity(n));
        }
        if self.quantity < n {
            return Ok(false);
        }
        self.quantity -= n;
        self.reserved += n;
        Ok(true)
    }

    /// Returns `n` reserved units to available stock.
    pub fn release(&mut self, n: i64) -> Result<(), ProductError> {
        if n <= 0 {
            return Err(ProductError::InvalidQuantity(n));
        }
        if self.reserved < n {
            return Err(ProductError::ReleaseExceedsReserved {
                product_id: self.id.clone(),
                requested: n,
                reserved: self.reserved,
            });
        }
        self.reserved -= n;
        self.quantity += n;
        Ok(())
    }

    /// Returns true if available stock is below `threshold`.
    pub fn is_low_stock(&self, threshold: i64) -> bool {
        self.quantity < threshold
    }
}

/// The sample catalog loaded at startup.
pub fn sample_catalog() -> Vec<Product> {
    vec![
        Product::new("gaming-laptop", "Gaming Laptop", 50),
        Product::new("wireless-mouse", "Wireless Mouse", 100),
        Product::new("mechanical-keyboard", "Mechanical Keyboard", 75),
        Product::new("4k-monitor", "4K Monitor", 30),
        Product::new("usb-c-hub", "USB-C Hub", 80),
    ]
}
