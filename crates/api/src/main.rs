//! Server entry point.

use std::sync::Arc;

use api::routes::orders::AppState;
use clients::{HttpProductGateway, HttpUserDirectory, InventoryClient, ResilienceConfig};
use orders::OrderService;
use outbox::{LogBroker, OutboxPublisher, PublisherConfig};
use sqlx::postgres::PgPoolOptions;
use store::PostgresStore;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = api::Config::from_env();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");
    let store = PostgresStore::new(pool);
    store.run_migrations().await.expect("migrations failed");

    let resilience = ResilienceConfig {
        call_timeout: config.remote_timeout,
        ..ResilienceConfig::default()
    };
    let gateway = HttpProductGateway::new(&config.product_service_url, config.remote_timeout)
        .expect("failed to build product service client");
    let inventory = InventoryClient::new(gateway, resilience);
    let users = HttpUserDirectory::new(&config.user_service_url, config.remote_timeout)
        .expect("failed to build user service client");

    let publisher = Arc::new(OutboxPublisher::with_config(
        store.clone(),
        LogBroker,
        PublisherConfig {
            poll_interval: config.outbox_poll_interval,
            ..PublisherConfig::default()
        },
    ));
    let publisher_task = publisher.spawn();

    let state = Arc::new(AppState {
        orders: OrderService::new(store, inventory, users),
    });
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    publisher_task.abort();
    tracing::info!("server shut down gracefully");
}
