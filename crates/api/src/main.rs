//! Order-fulfillment service entry point.

use std::process::ExitCode;
use std::sync::Arc;

use api::AppState;
use api::config::{Config, LogFormat};
use api::error::StartupError;
use event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use messaging::{
    EventListener, EventPublisher, HandlerRegistry, MessageSource, RabbitMqBroker, RetryPolicy,
    ShutdownSignal,
};
use saga::{
    Collaborators, InMemoryInventoryService, InMemoryOrderRepository, InventoryService,
    LogNotificationService, OrderRepository, PostgresInventoryService, PostgresOrderRepository,
    StepContext, register_capture, register_steps, seed_catalog,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

struct Stores {
    events: Arc<dyn EventStore>,
    orders: Arc<dyn OrderRepository>,
    inventory: Arc<dyn InventoryService>,
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let json = config.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

async fn open_stores(config: &Config) -> Result<Stores, StartupError> {
    let Some(url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, using in-memory stores");
        return Ok(Stores {
            events: Arc::new(InMemoryEventStore::new()),
            orders: Arc::new(InMemoryOrderRepository::new()),
            inventory: Arc::new(InMemoryInventoryService::new()),
        });
    };

    let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
    let events = PostgresEventStore::new(pool.clone());
    events.run_migrations().await?;
    tracing::info!("database migrations applied");

    Ok(Stores {
        events: Arc::new(events),
        orders: Arc::new(PostgresOrderRepository::new(pool.clone())),
        inventory: Arc::new(PostgresInventoryService::new(pool)),
    })
}

async fn run(config: Config) -> Result<(), StartupError> {
    // 1. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 2. Connect to the broker and declare the topology; both are fatal
    let topology = config.topology();
    let broker = RetryPolicy::connect_default()
        .retry("rabbitmq connect", |_| {
            RabbitMqBroker::connect(&config.rabbitmq_url, config.exchange.clone())
        })
        .await?;
    broker.declare_topology(&topology).await?;
    let broker = Arc::new(broker);
    let publisher: Arc<dyn EventPublisher> = broker.clone();
    let source: Arc<dyn MessageSource> = broker.clone();

    // 3. Open stores and seed the catalog
    let stores = open_stores(&config).await?;
    if config.seed_products {
        let inserted = seed_catalog(stores.inventory.as_ref()).await?;
        tracing::info!(inserted, "product catalog seeded");
    }

    // 4. Register saga steps and dead-letter capture, start consuming
    let mut registry = HandlerRegistry::new();
    register_steps(
        &mut registry,
        StepContext::new(publisher.clone(), stores.events.clone()),
        &Collaborators {
            orders: stores.orders.clone(),
            inventory: stores.inventory.clone(),
            notifications: Arc::new(LogNotificationService),
        },
    );
    register_capture(&mut registry, stores.events.clone(), topology.dead_letter_queues());

    let shutdown = ShutdownSignal::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move { shutdown.trigger_on_os_signal().await }
    });

    let consumers =
        EventListener::new(source, registry, config.listener_config()).spawn(shutdown.clone());

    // 5. Serve HTTP until the shutdown signal trips
    let state = Arc::new(AppState::new(
        publisher,
        stores.events,
        stores.orders,
        stores.inventory,
        config.replay_batch_size,
    ));
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "starting API server");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        })
        .await;

    // 6. Stop consumers, then close the connection they share
    shutdown.trigger();
    if let Err(e) = consumers.await {
        tracing::error!(error = %e, "consumer task ended abnormally");
    }
    if let Err(e) = broker.close().await {
        tracing::warn!(error = %e, "error closing broker connection");
    }

    served?;
    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::from_env();
    init_tracing(&config);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "service failed");
            ExitCode::FAILURE
        }
    }
}
