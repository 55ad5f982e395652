//! API routes.

use std::net::IpAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    cancel_job, create_checkout, download_results, get_balance, get_history, get_job_status,
    get_pricing, health, list_jobs, list_pipelines, payment_webhook, process_job, ready,
    upload_images,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    // Uploads are bounded by the outer body limit and per-file checks
    let upload_routes = Router::new()
        .route("/upload", post(upload_images))
        .layer(DefaultBodyLimit::disable());

    let job_routes = Router::new()
        .route("/process", post(process_job))
        .route("/status/:job_id", get(get_job_status))
        .route("/cancel/:job_id", post(cancel_job))
        .route("/download/:job_id", get(download_results))
        .route("/jobs", get(list_jobs));

    let billing_routes = Router::new()
        .route("/credits/balance", get(get_balance))
        .route("/credits/history", get(get_history))
        .route("/create-checkout", post(create_checkout));

    let catalog_routes = Router::new()
        .route("/pipelines", get(list_pipelines))
        .route("/pricing", get(get_pricing));

    let rate_limiter: Arc<RateLimiterCache<IpAddr>> =
        Arc::new(RateLimiterCache::per_second(state.config.rate_limit_rps));

    let api_routes = Router::new()
        .merge(upload_routes)
        .merge(job_routes)
        .merge(billing_routes)
        .merge(catalog_routes)
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    // Processor redeliveries must not be throttled
    let webhook_routes = Router::new().route("/webhook", post(payment_webhook));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(api_routes)
        .merge(webhook_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
