//! HTTP API server with observability for the checkout engine.
//!
//! Exposes cart replacement, checkout, payment and order lookup over REST,
//! with structured logging (tracing) and Prometheus metrics. Caller
//! identity is taken from the `x-user-id` header set by the upstream
//! gateway.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;
pub mod seed;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post, put};
use checkout::CheckoutEngine;
use metrics_exporter_prometheus::PrometheusHandle;
use store::CheckoutStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub engine: CheckoutEngine<S>,
    pub metrics: PrometheusHandle,
    /// Name of the storage backend, reported by `/health`.
    pub backend: &'static str,
}

impl<S> AppState<S> {
    pub fn new(engine: CheckoutEngine<S>, metrics: PrometheusHandle, backend: &'static str) -> Self {
        Self {
            engine,
            metrics,
            backend,
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CheckoutStore + Clone + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/metrics", get(routes::metrics::get::<S>))
        .route("/cart", put(routes::cart::replace::<S>))
        .route("/orders/checkout", post(routes::orders::checkout::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/pay", post(routes::orders::pay::<S>))
        .route(
            "/admin/orders/{id}/status",
            patch(routes::orders::update_status::<S>),
        )
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
