use std::future::ready;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::consumer::ConsumerStatus;
use crate::gateway::PublishGateway;
use crate::handlers;
use crate::pipeline::Pipeline;
use crate::prometheus::{setup_metrics_recorder, track_metrics};
use crate::store::DedupStore;
use crate::time::TimeSource;

#[derive(Clone)]
pub struct State {
    pub gateway: PublishGateway,
    pub store: Arc<dyn DedupStore + Send + Sync>,
    pub consumer: ConsumerStatus,
    pub timesource: Arc<dyn TimeSource + Send + Sync>,
}

pub fn router<TZ: TimeSource + Send + Sync + 'static>(
    timesource: TZ,
    pipeline: &Pipeline,
    metrics: bool,
) -> Router {
    let state = State {
        gateway: pipeline.gateway.clone(),
        store: pipeline.store.clone(),
        consumer: pipeline.consumer_status(),
        timesource: Arc::new(timesource),
    };

    let router = Router::new()
        .route("/", get(handlers::index))
        .route("/publish", post(handlers::publish))
        .route("/events", get(handlers::events))
        .route("/stats", get(handlers::stats))
        .route("/_readiness", get(handlers::readiness))
        .route("/_liveness", get(handlers::liveness))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when used as a library (during tests etc)
    // does not work well.
    if !metrics {
        return router;
    }

    match setup_metrics_recorder() {
        Ok(recorder_handle) => {
            router.route("/metrics", get(move || ready(recorder_handle.render())))
        }
        Err(e) => {
            warn!("failed to install prometheus recorder, /metrics disabled: {}", e);
            router
        }
    }
}
