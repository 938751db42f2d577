//! Integration tests for the HTTP surface.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use common::OrderId;
use domain::{Order, OrderRequested, OrderStatus, ProductSnapshot, sample_catalog};
use event_store::{EventStatus, EventStore, EventStoreExt, InMemoryEventStore};
use messaging::{
    EventListener, HandlerRegistry, InMemoryBroker, ListenerConfig, RetryPolicy, ShutdownSignal,
    encode_event,
};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    Collaborators, InMemoryInventoryService, InMemoryNotificationService,
    InMemoryOrderRepository, OrderIntake, ReplayCoordinator, StepContext, register_steps,
};
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::linear(2, Duration::from_millis(1))
}

struct TestApp {
    app: axum::Router,
    broker: InMemoryBroker,
    store: InMemoryEventStore,
    orders: InMemoryOrderRepository,
    inventory: InMemoryInventoryService,
}

fn setup() -> TestApp {
    let broker = InMemoryBroker::new();
    let store = InMemoryEventStore::new();
    let orders = InMemoryOrderRepository::new();
    let inventory = InMemoryInventoryService::with_products(sample_catalog());

    let state = Arc::new(api::AppState {
        publisher: Arc::new(broker.clone()),
        intake: OrderIntake::new(Arc::new(broker.clone())).with_retry(fast_retry()),
        replay: ReplayCoordinator::new(Arc::new(store.clone()), Arc::new(broker.clone()))
            .with_retry(fast_retry()),
        orders: Arc::new(orders.clone()),
        inventory: Arc::new(inventory.clone()),
    });
    let app = api::create_app(state, get_metrics_handle());

    TestApp {
        app,
        broker,
        store,
        orders,
        inventory,
    }
}

async fn send(app: &axum::Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn get(app: &axum::Router, uri: &str) -> Response {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn post_json(app: &axum::Router, uri: &str, body: Value) -> Response {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

async fn post_empty(app: &axum::Router, uri: &str) -> Response {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn order_body(product_id: &str, quantity: i64) -> Value {
    json!({
        "amount": 99.5,
        "product": { "id": product_id, "name": "Gaming Laptop", "quantity": quantity }
    })
}

fn requested(id: &str) -> OrderRequested {
    OrderRequested::new(
        OrderId::new(id),
        ProductSnapshot::new("gaming-laptop", "Gaming Laptop", 1),
        10.0,
    )
}

#[tokio::test]
async fn test_health_check() {
    let t = setup();

    let response = get(&t.app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["broker_connected"], true);
}

#[tokio::test]
async fn test_health_degraded_when_broker_disconnected() {
    let t = setup();
    t.broker.set_connected(false);

    let response = get(&t.app, "/health").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["status"], "degraded");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = setup();

    let response = get(&t.app, "/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_create_order_publishes_order_requested() {
    let t = setup();

    let response = post_json(
        &t.app,
        "/api/v1/orders/create-order",
        order_body("gaming-laptop", 2),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["status"], "Order created successfully");
    let order_id = json["order_id"].as_str().unwrap().to_string();

    let published = t.broker.published_to("order.requested").await;
    assert_eq!(published.len(), 1);
    let event: OrderRequested = serde_json::from_slice(&published[0]).unwrap();
    assert_eq!(event.id.as_str(), order_id);
    assert_eq!(event.product.quantity, 2);
    assert_eq!(event.status, OrderStatus::Requested);
}

#[tokio::test]
async fn test_create_order_rejects_malformed_body() {
    let t = setup();

    let response = send(
        &t.app,
        Request::builder()
            .method("POST")
            .uri("/api/v1/orders/create-order")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Invalid request");
    assert!(t.broker.published().await.is_empty());
}

#[tokio::test]
async fn test_create_order_rejects_invalid_order() {
    let t = setup();

    let response = post_json(
        &t.app,
        "/api/v1/orders/create-order",
        order_body("gaming-laptop", 0),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json(&t.app, "/api/v1/orders/create-order", order_body("", 1)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(t.broker.published().await.is_empty());
}

#[tokio::test]
async fn test_create_order_unavailable_when_publish_fails() {
    let t = setup();
    t.broker.set_fail_publishes(true);

    let response = post_json(
        &t.app,
        "/api/v1/orders/create-order",
        order_body("gaming-laptop", 1),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn test_get_order() {
    let t = setup();
    t.orders.insert(Order::from_request(&requested("o-1"))).await;

    let response = get(&t.app, "/api/v1/orders/o-1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["id"], "o-1");
    assert_eq!(json["status"], "Processing");
    assert_eq!(json["product"]["id"], "gaming-laptop");
}

#[tokio::test]
async fn test_get_order_not_found() {
    let t = setup();

    let response = get(&t.app, "/api/v1/orders/missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn test_cancel_order_publishes_order_cancelled() {
    let t = setup();
    t.orders.insert(Order::from_request(&requested("o-1"))).await;

    let response = post_empty(&t.app, "/api/v1/orders/o-1/cancel").await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["order_id"], "o-1");
    assert_eq!(t.broker.published_to("order.cancelled").await.len(), 1);
}

#[tokio::test]
async fn test_cancel_unknown_order() {
    let t = setup();

    let response = post_empty(&t.app, "/api/v1/orders/missing/cancel").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(t.broker.published().await.is_empty());
}

#[tokio::test]
async fn test_replay_failed_events() {
    let t = setup();
    let payload = encode_event(&requested("o-1")).unwrap();
    let record = t
        .store
        .store_failed(OrderId::new("o-1"), "order.requested", payload.clone())
        .await
        .unwrap();

    let response = post_empty(&t.app, "/api/v1/orders/replay-failed-events").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "Replay complete");
    assert_eq!(json["replayed"], 1);
    assert_eq!(json["failed"], 0);
    assert_eq!(json["total"], 1);

    assert_eq!(t.broker.published_to("order.requested").await, vec![payload]);
    let stored = t.store.get(record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EventStatus::Completed);
}

#[tokio::test]
async fn test_replay_with_nothing_stored() {
    let t = setup();

    let response = post_empty(&t.app, "/api/v1/orders/replay-failed-events").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["total"], 0);
}

#[tokio::test]
async fn test_replay_reports_failures_with_counts() {
    let t = setup();
    t.store
        .store_pending(
            OrderId::new("o-1"),
            "order.requested",
            encode_event(&requested("o-1")).unwrap(),
        )
        .await
        .unwrap();
    t.broker.set_fail_publishes(true);

    let response = post_empty(&t.app, "/api/v1/orders/replay-failed-events").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(
        json["error"],
        "replay completed with 1 failures out of 1 events"
    );
    assert_eq!(json["replayed"], 0);
    assert_eq!(json["failed"], 1);
    assert_eq!(json["total"], 1);
    assert_eq!(t.store.count_by_status(EventStatus::Failed).await.unwrap(), 1);
}

#[tokio::test]
async fn test_list_products() {
    let t = setup();

    let response = get(&t.app, "/api/v1/inventory/products").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let ids: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
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
}

#[tokio::test]
async fn test_get_product() {
    let t = setup();

    let response = get(&t.app, "/api/v1/inventory/products/4k-monitor").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["quantity"], 30);
    assert_eq!(json["reserved"], 0);

    let response = get(&t.app, "/api/v1/inventory/products/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "Product not found");
}

#[tokio::test]
async fn test_low_stock_products() {
    let t = setup();

    let response = get(&t.app, "/api/v1/inventory/products/low-stock/60").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let ids: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["4k-monitor", "gaming-laptop"]);

    let response = get(&t.app, "/api/v1/inventory/products/low-stock/abc").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Invalid threshold");
}

#[tokio::test]
async fn test_inventory_failure_is_internal_error() {
    let t = setup();
    t.inventory.set_fail(true);

    let response = get(&t.app, "/api/v1/inventory/products").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_order_placed_over_http_is_confirmed_by_the_saga() {
    let t = setup();
    let notifications = InMemoryNotificationService::new();

    let mut registry = HandlerRegistry::new();
    register_steps(
        &mut registry,
        StepContext::new(Arc::new(t.broker.clone()), Arc::new(t.store.clone()))
            .with_retry(fast_retry()),
        &Collaborators {
            orders: Arc::new(t.orders.clone()),
            inventory: Arc::new(t.inventory.clone()),
            notifications: Arc::new(notifications.clone()),
        },
    );
    let config = ListenerConfig {
        max_in_flight: 4,
        connect_retry: RetryPolicy::exponential(5, Duration::from_millis(1)),
        reconnect_delay: Duration::from_millis(1),
        drain_timeout: Duration::from_secs(1),
        requeue_delay: Duration::from_millis(1),
    };
    let shutdown = ShutdownSignal::new();
    let listener =
        EventListener::new(Arc::new(t.broker.clone()), registry, config).spawn(shutdown.clone());

    let response = post_json(
        &t.app,
        "/api/v1/orders/create-order",
        order_body("gaming-laptop", 2),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order_id = body_json(response).await["order_id"]
        .as_str()
        .unwrap()
        .to_string();

    let uri = format!("/api/v1/orders/{order_id}");
    let order = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let response = get(&t.app, &uri).await;
            if response.status() == StatusCode::OK {
                let json = body_json(response).await;
                if json["status"] == "Confirmed" && json["notificationStatus"].is_string() {
                    return json;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("order was not confirmed in time");

    assert_eq!(order["notificationStatus"], "sent");
    let product = body_json(get(&t.app, "/api/v1/inventory/products/gaming-laptop").await).await;
    assert_eq!(product["quantity"], 48);
    assert_eq!(product["reserved"], 2);

    shutdown.trigger();
    listener.await.unwrap();
}
