//! PostgreSQL-backed order repository and inventory service.

use async_trait::async_trait;
use common::{OrderId, ProductId};
use domain::{Order, OrderStatus, OrderUpdate, Product, ProductError, ProductSnapshot};
use sqlx::{PgPool, Row, postgres::PgRow};

use super::{InventoryService, OrderRepository};
use crate::error::{Result, SagaError};

const ORDER_COLUMNS: &str = "id, amount, product_id, product_name, product_quantity, status, \
     notification_status, notification_message, created_at";

const PRODUCT_COLUMNS: &str = "id, name, quantity, reserved";

/// Order repository over the `orders` table.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<OrderStatus>()
            .map_err(|s| SagaError::OrderRepository(format!("unknown order status: {s}")))?;

        Ok(Order {
            id: OrderId::new(row.try_get::<String, _>("id")?),
            amount: row.try_get("amount")?,
            product: ProductSnapshot::new(
                row.try_get::<String, _>("product_id")?,
                row.try_get::<String, _>("product_name")?,
                row.try_get("product_quantity")?,
            ),
            status,
            created_at: row.try_get("created_at")?,
            notification_status: row.try_get("notification_status")?,
            notification_message: row.try_get("notification_message")?,
        })
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn create_order(&self, order: &Order) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (id, amount, product_id, product_name, product_quantity, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(order.id.as_str())
        .bind(order.amount)
        .bind(order.product.id.as_str())
        .bind(&order.product.name)
        .bind(order.product.quantity)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn update_order(&self, id: &OrderId, update: OrderUpdate) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        // lock the row so the transition is checked against the status we overwrite
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| SagaError::OrderNotFound(id.clone()))?;

        let mut order = Self::row_to_order(row)?;
        order.apply_update(update)?;

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, notification_status = $3, notification_message = $4, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .bind(order.status.as_str())
        .bind(&order.notification_status)
        .bind(&order.notification_message)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(order)
    }
}

/// Inventory service over the `products` table.
///
/// Reserve and release are single conditional `UPDATE`s, so concurrent
/// steps can never drive stock negative.
#[derive(Clone)]
pub struct PostgresInventoryService {
    pool: PgPool,
}

impl PostgresInventoryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get::<String, _>("id")?),
            name: row.try_get("name")?,
            quantity: row.try_get("quantity")?,
            reserved: row.try_get("reserved")?,
        })
    }
}

#[async_trait]
impl InventoryService for PostgresInventoryService {
    async fn reserve(&self, product_id: &ProductId, quantity: i64) -> Result<bool> {
        if quantity <= 0 {
            return Err(ProductError::InvalidQuantity(quantity).into());
        }

        let result = sqlx::query(
            r#"
            UPDATE products
            SET quantity = quantity - $2, reserved = reserved + $2, updated_at = now()
            WHERE id = $1 AND quantity >= $2
            "#,
        )
        .bind(product_id.as_str())
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        match self.get_product(product_id).await? {
            Some(_) => Ok(false),
            None => Err(SagaError::ProductNotFound(product_id.clone())),
        }
    }

    async fn release(&self, product_id: &ProductId, quantity: i64) -> Result<()> {
        if quantity <= 0 {
            return Err(ProductError::InvalidQuantity(quantity).into());
        }

        let result = sqlx::query(
            r#"
            UPDATE products
            SET quantity = quantity + $2, reserved = reserved - $2, updated_at = now()
            WHERE id = $1 AND reserved >= $2
            "#,
        )
        .bind(product_id.as_str())
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        match self.get_product(product_id).await? {
            Some(product) => Err(ProductError::ReleaseExceedsReserved {
                product_id: product_id.clone(),
                requested: quantity,
                reserved: product.reserved,
            }
            .into()),
            None => Err(SagaError::ProductNotFound(product_id.clone())),
        }
    }

    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn low_stock(&self, threshold: i64) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE quantity < $1 ORDER BY id"
        ))
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn add_product(&self, product: Product) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO products (id, name, quantity, reserved)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(product.quantity)
        .bind(product.reserved)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
