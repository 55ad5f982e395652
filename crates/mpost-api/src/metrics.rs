//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Install the Prometheus recorder and return its render handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "mpost_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "mpost_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "mpost_http_requests_in_flight";

    // Job intake
    pub const UPLOADS_TOTAL: &str = "mpost_uploads_total";
    pub const UPLOADED_IMAGES_TOTAL: &str = "mpost_uploaded_images_total";
    pub const JOBS_SUBMITTED_TOTAL: &str = "mpost_jobs_submitted_total";
    pub const CREDIT_REJECTIONS_TOTAL: &str = "mpost_credit_rejections_total";

    // Payments
    pub const CHECKOUTS_CREATED_TOTAL: &str = "mpost_checkouts_created_total";
    pub const WEBHOOK_EVENTS_TOTAL: &str = "mpost_webhook_events_total";

    // Rate limiting
    pub const RATE_LIMIT_HITS_TOTAL: &str = "mpost_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record an accepted upload.
pub fn record_upload(images: usize) {
    counter!(names::UPLOADS_TOTAL).increment(1);
    counter!(names::UPLOADED_IMAGES_TOTAL).increment(images as u64);
}

/// Record a job handed to the executor.
pub fn record_job_submitted(tier: &str, pipeline: &str) {
    let labels = [("tier", tier.to_string()), ("pipeline", pipeline.to_string())];
    counter!(names::JOBS_SUBMITTED_TOTAL, &labels).increment(1);
}

/// Record a process request refused for lack of credits.
pub fn record_credit_rejection(tier: &str) {
    counter!(names::CREDIT_REJECTIONS_TOTAL, "tier" => tier.to_string()).increment(1);
}

/// Record a created checkout session.
pub fn record_checkout_created(pack: &str) {
    counter!(names::CHECKOUTS_CREATED_TOTAL, "pack" => pack.to_string()).increment(1);
}

/// Record a webhook delivery by event type and outcome.
pub fn record_webhook_event(event_type: &str, outcome: &str) {
    let labels = [
        ("event", event_type.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::WEBHOOK_EVENTS_TOTAL, &labels).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    counter!(names::RATE_LIMIT_HITS_TOTAL, "endpoint" => sanitize_path(endpoint)).increment(1);
}

static UUID_SEGMENT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").ok()
});

static JOB_SEGMENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^/(status|cancel)/[^/]+$").ok());

/// Replace ids in a path so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    let mut path = path.to_string();
    if let Some(re) = UUID_SEGMENT.as_ref() {
        path = re.replace_all(&path, ":id").into_owned();
    }
    if let Some(re) = JOB_SEGMENT.as_ref() {
        path = re.replace(&path, "/$1/:job_id").into_owned();
    }
    path
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    record_http_request(&method, &path, status, start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/status/550e8400-e29b-41d4-a716-446655440000"),
            "/status/:job_id"
        );
        assert_eq!(sanitize_path("/cancel/not-a-uuid"), "/cancel/:job_id");
        assert_eq!(sanitize_path("/pricing"), "/pricing");
    }
}
