//! HTTP API for the storefront.
//!
//! Exposes the order workflow (checkout, payment, shipment, tracking) and
//! product reviews as JSON endpoints, with bearer-token sessions,
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod session;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::{ApiError, StartupError};
pub use state::{AppState, Upstreams};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{catalog, orders, payments, reviews, sessions, shipments, system};

    let metrics_router = Router::new()
        .route("/metrics", get(system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(system::health::<S>))
        .route(
            "/sessions",
            post(sessions::login::<S>).delete(sessions::logout::<S>),
        )
        // Catalog
        .route("/admin/products/{sku}", put(catalog::upsert::<S>))
        .route(
            "/admin/products/{sku}/stock",
            post(catalog::adjust_stock::<S>),
        )
        .route("/products/{sku}", get(catalog::get::<S>))
        // Orders
        .route(
            "/orders",
            post(orders::create::<S>).get(orders::list_mine::<S>),
        )
        .route("/admin/orders", get(orders::list_all::<S>))
        .route("/orders/{id}", get(orders::get::<S>))
        .route("/orders/{id}/history", get(orders::history::<S>))
        .route("/orders/{id}/status", post(orders::update_status::<S>))
        .route("/orders/{id}/cancel", post(orders::cancel::<S>))
        .route("/orders/{id}/address", put(orders::change_address::<S>))
        // Payments
        .route("/orders/{id}/payments", post(payments::initiate::<S>))
        .route("/orders/{id}/payments/verify", post(payments::verify::<S>))
        .route(
            "/admin/payments/{gateway_order_id}",
            get(payments::get::<S>),
        )
        // Shipments
        .route("/orders/{id}/shipment", post(shipments::register::<S>))
        .route("/shipments/{awb}", get(shipments::get::<S>))
        .route("/shipments/{awb}/tracking", post(shipments::tracking::<S>))
        .route("/shipments/{awb}/cancel", post(shipments::cancel::<S>))
        // Reviews
        .route(
            "/products/{sku}/reviews",
            get(reviews::list::<S>).post(reviews::submit::<S>),
        )
        .route("/reviews/{id}/like", post(reviews::like::<S>))
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
