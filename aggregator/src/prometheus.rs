use std::time::Instant;

use axum::{body::Body, extract::MatchedPath, http::Request, middleware::Next, response::Response};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

const METRICS_PATH: &str = "/metrics";
const UNMATCHED_PATH: &str = "unmatched";

pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(EXPONENTIAL_SECONDS)?
        .install_recorder()
}

/// Label for the `path` of a request, or `None` when it should not be
/// recorded. Unrouted paths share one label so 404 scans stay bounded.
fn path_label(req: &Request<Body>) -> Option<String> {
    match req.extensions().get::<MatchedPath>() {
        Some(matched) if matched.as_str() == METRICS_PATH => None,
        Some(matched) => Some(matched.as_str().to_owned()),
        None if req.uri().path() == METRICS_PATH => None,
        None => Some(UNMATCHED_PATH.to_owned()),
    }
}

/// Request count and latency per method, route and status. Prometheus
/// scrapes are not counted.
pub async fn track_metrics(req: Request<Body>, next: Next) -> Response {
    let Some(path) = path_label(&req) else {
        return next.run(req).await;
    };

    let start = Instant::now();
    let method = req.method().to_string();
    let response = next.run(req).await;

    let labels = [
        ("method", method),
        ("path", path),
        ("status", response.status().as_u16().to_string()),
    ];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());

    response
}
