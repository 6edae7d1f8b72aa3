//! HTTP API for the order service.
//!
//! Thin axum layer over the [`orders::OrderService`] workflows, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use clients::{ProductGateway, UserDirectory};
use metrics_exporter_prometheus::PrometheusHandle;
use store::OrderStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use routes::orders::AppState;

/// Creates the axum application router with all routes and shared state.
pub fn create_app<S, G, U>(
    state: Arc<AppState<S, G, U>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    S: OrderStore + 'static,
    G: ProductGateway + 'static,
    U: UserDirectory + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<S, G, U>))
        .route("/orders", get(routes::orders::list::<S, G, U>))
        .route(
            "/orders/user",
            get(routes::orders::list_for_user::<S, G, U>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S, G, U>))
        .route("/orders/{id}", delete(routes::orders::remove::<S, G, U>))
        .route(
            "/orders/{id}/status",
            put(routes::orders::change_status::<S, G, U>),
        )
        .route(
            "/orders/{id}/items",
            get(routes::orders::list_items::<S, G, U>),
        )
        .route(
            "/orders/{id}/items",
            post(routes::orders::add_item::<S, G, U>),
        )
        .route("/items/{id}", put(routes::orders::update_item::<S, G, U>))
        .route(
            "/items/{id}",
            delete(routes::orders::remove_item::<S, G, U>),
        )
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
