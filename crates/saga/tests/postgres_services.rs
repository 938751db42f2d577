//! PostgreSQL collaborator tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p saga --test postgres_services
//! ```

use std::sync::Arc;

use common::{OrderId, ProductId};
use domain::{
    Order, OrderRequested, OrderStatus, OrderUpdate, Product, ProductError, ProductSnapshot,
};
use saga::{
    InventoryService, OrderRepository, PostgresInventoryService, PostgresOrderRepository,
    SagaError, seed_catalog,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/002_create_orders_and_products_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh pool with empty tables
async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE orders, products")
        .execute(&pool)
        .await
        .unwrap();

    pool
}

fn order(id: &str) -> Order {
    Order::from_request(&OrderRequested::new(
        OrderId::new(id),
        ProductSnapshot::new("p1", "Widget", 2),
        50.0,
    ))
}

#[tokio::test]
#[serial]
async fn order_create_is_insert_if_absent() {
    let repo = PostgresOrderRepository::new(get_test_pool().await);

    assert!(repo.create_order(&order("o1")).await.unwrap());
    assert!(!repo.create_order(&order("o1")).await.unwrap());

    let stored = repo.get_order(&OrderId::new("o1")).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Processing);
    assert_eq!(stored.product, ProductSnapshot::new("p1", "Widget", 2));
    assert_eq!(stored.amount, 50.0);
    assert!(stored.notification_status.is_none());
}

#[tokio::test]
#[serial]
async fn order_update_follows_state_machine() {
    let repo = PostgresOrderRepository::new(get_test_pool().await);
    repo.create_order(&order("o1")).await.unwrap();
    let id = OrderId::new("o1");

    repo.update_order(&id, OrderUpdate::status(OrderStatus::Confirmed))
        .await
        .unwrap();
    repo.update_order(&id, OrderUpdate::notification_sent("done"))
        .await
        .unwrap();
    repo.update_order(&id, OrderUpdate::status(OrderStatus::Cancelled))
        .await
        .unwrap();

    let refused = repo
        .update_order(&id, OrderUpdate::status(OrderStatus::Confirmed))
        .await;
    assert!(matches!(refused, Err(SagaError::Order(_))));

    let stored = repo.get_order(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
    assert_eq!(stored.notification_status.as_deref(), Some("sent"));
    assert_eq!(stored.notification_message.as_deref(), Some("done"));
}

#[tokio::test]
#[serial]
async fn order_update_unknown_id() {
    let repo = PostgresOrderRepository::new(get_test_pool().await);
    let result = repo
        .update_order(&OrderId::new("missing"), OrderUpdate::notification_sent("x"))
        .await;
    assert!(matches!(result, Err(SagaError::OrderNotFound(_))));
}

#[tokio::test]
#[serial]
async fn reserve_and_release_are_inverse() {
    let inventory = PostgresInventoryService::new(get_test_pool().await);
    inventory
        .add_product(Product::new("p1", "Widget", 10))
        .await
        .unwrap();
    let id = ProductId::new("p1");

    assert!(inventory.reserve(&id, 4).await.unwrap());
    let held = inventory.get_product(&id).await.unwrap().unwrap();
    assert_eq!((held.quantity, held.reserved), (6, 4));

    inventory.release(&id, 4).await.unwrap();
    let restored = inventory.get_product(&id).await.unwrap().unwrap();
    assert_eq!((restored.quantity, restored.reserved), (10, 0));
}

#[tokio::test]
#[serial]
async fn reserve_beyond_stock_changes_nothing() {
    let inventory = PostgresInventoryService::new(get_test_pool().await);
    inventory
        .add_product(Product::new("p1", "Widget", 3))
        .await
        .unwrap();
    let id = ProductId::new("p1");

    assert!(!inventory.reserve(&id, 4).await.unwrap());
    let product = inventory.get_product(&id).await.unwrap().unwrap();
    assert_eq!((product.quantity, product.reserved), (3, 0));

    assert!(matches!(
        inventory.reserve(&ProductId::new("nope"), 1).await,
        Err(SagaError::ProductNotFound(_))
    ));
}

#[tokio::test]
#[serial]
async fn release_more_than_reserved_is_refused() {
    let inventory = PostgresInventoryService::new(get_test_pool().await);
    inventory
        .add_product(Product::new("p1", "Widget", 3))
        .await
        .unwrap();

    let result = inventory.release(&ProductId::new("p1"), 1).await;
    assert!(matches!(
        result,
        Err(SagaError::Product(ProductError::ReleaseExceedsReserved { reserved: 0, .. }))
    ));
}

#[tokio::test]
#[serial]
async fn concurrent_reservations_never_oversell() {
    let inventory = PostgresInventoryService::new(get_test_pool().await);
    inventory
        .add_product(Product::new("p1", "Widget", 5))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let inventory = inventory.clone();
        handles.push(tokio::spawn(async move {
            inventory.reserve(&ProductId::new("p1"), 1).await.unwrap()
        }));
    }

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            granted += 1;
        }
    }
    assert_eq!(granted, 5);

    let product = inventory
        .get_product(&ProductId::new("p1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!((product.quantity, product.reserved), (0, 5));
}

#[tokio::test]
#[serial]
async fn seeding_and_listing() {
    let inventory = PostgresInventoryService::new(get_test_pool().await);

    assert_eq!(seed_catalog(&inventory).await.unwrap(), 5);
    assert_eq!(seed_catalog(&inventory).await.unwrap(), 0);

    let ids: Vec<_> = inventory
        .list_products()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id.to_string())
        .collect();
    assert_eq!(
        ids,
        vec![
            "4k-monitor",
            "gaming-laptop",
            "mechanical-keyboard",
            "usb-c-hub",
            "wireless-mouse"
        ]
    );

    let low: Vec<_> = inventory
        .low_stock(60)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id.to_string())
        .collect();
    assert_eq!(low, vec!["4k-monitor", "gaming-laptop"]);
}
