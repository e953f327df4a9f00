pub mod ask;
pub mod documents;
pub mod health;
pub mod upload;

use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

use crate::metrics;
use crate::services::AppState;

/// Maximum concurrent requests (backpressure control)
const MAX_CONCURRENT_REQUESTS: usize = 100;

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub fn create_router(state: AppState, metrics_handle: PrometheusHandle) -> Router {
    let api_routes = Router::new()
        .route("/upload", post(upload::upload_simple))
        .route("/advanced_upload", post(upload::upload_advanced))
        .route("/ask", post(ask::ask))
        .route("/documents", get(documents::list_documents))
        .route("/documents/update", post(documents::update_document))
        .with_state(state);

    Router::new()
        .merge(api_routes)
        .route("/health", get(health::health_check))
        .merge(metrics::router(metrics_handle))
        .layer(
            ServiceBuilder::new()
                .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
                .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS)),
        )
}
