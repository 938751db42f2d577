//! HTTP surface and process wiring for the order-fulfillment service.
//!
//! Provides the client-facing endpoints (order intake, lookups, replay
//! trigger), health and Prometheus metrics, plus the configuration used by
//! the binary to connect the broker, stores and consumers.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use event_store::EventStore;
use messaging::EventPublisher;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{InventoryService, OrderIntake, OrderRepository, ReplayCoordinator};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub publisher: Arc<dyn EventPublisher>,
    pub intake: OrderIntake,
    pub replay: ReplayCoordinator,
    pub orders: Arc<dyn OrderRepository>,
    pub inventory: Arc<dyn InventoryService>,
}

impl AppState {
    /// Builds the state with default intake and replay policies.
    pub fn new(
        publisher: Arc<dyn EventPublisher>,
        store: Arc<dyn EventStore>,
        orders: Arc<dyn OrderRepository>,
        inventory: Arc<dyn InventoryService>,
        replay_batch_size: usize,
    ) -> Self {
        Self {
            intake: OrderIntake::new(publisher.clone()),
            replay: ReplayCoordinator::new(store, publisher.clone())
                .with_batch_size(replay_batch_size),
            publisher,
            orders,
            inventory,
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let orders = Router::new()
        .route("/create-order", post(routes::orders::create))
        .route("/replay-failed-events", post(routes::orders::replay_failed_events))
        .route("/{id}", get(routes::orders::get))
        .route("/{id}/cancel", post(routes::orders::cancel));

    let inventory = Router::new()
        .route("/products", get(routes::inventory::list))
        .route("/products/{id}", get(routes::inventory::get))
        .route(
            "/products/low-stock/{threshold}",
            get(routes::inventory::low_stock),
        );

    Router::new()
        .route("/health", get(routes::health::check))
        .nest("/api/v1/orders", orders)
        .nest("/api/v1/inventory", inventory)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
