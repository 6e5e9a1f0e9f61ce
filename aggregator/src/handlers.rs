use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use metrics::counter;
use tracing::instrument;

use crate::api::{AggregatorError, EventsQuery, IndexResponse, PublishResponse};
use crate::consumer::ConsumerState;
use crate::event::{Event, RawEvent};
use crate::router;
use crate::stats::StatsSnapshot;

pub const ENDPOINTS: &[&str] = &[
    "POST /publish",
    "GET /events?topic=",
    "GET /stats",
    "GET /_readiness",
    "GET /_liveness",
];

pub async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        message: "event aggregator".to_string(),
        available_endpoints: ENDPOINTS.iter().map(|e| e.to_string()).collect(),
    })
}

/// Validate the whole request before anything is enqueued: one bad event
/// rejects the batch.
#[instrument(skip_all, fields(batch_size))]
pub async fn publish(
    state: State<router::State>,
    body: Bytes,
) -> Result<Json<PublishResponse>, AggregatorError> {
    let raw = RawEvent::from_bytes(&body).map_err(reject)?;
    if raw.is_empty() {
        return Err(reject(AggregatorError::EmptyBatch));
    }
    tracing::Span::current().record("batch_size", raw.len());

    let now = state.timesource.current_time();
    let events = raw
        .into_iter()
        .map(|raw| raw.into_event(now))
        .collect::<Result<Vec<Event>, AggregatorError>>()
        .map_err(reject)?;

    let accepted = state.gateway.publish(events).await?;

    Ok(Json(PublishResponse { accepted }))
}

fn reject(err: AggregatorError) -> AggregatorError {
    counter!("aggregator_requests_invalid_total").increment(1);
    tracing::debug!("rejected publish request: {}", err);
    err
}

pub async fn events(
    state: State<router::State>,
    query: Query<EventsQuery>,
) -> Result<Json<Vec<Event>>, AggregatorError> {
    let topic = query.topic.as_deref().filter(|topic| !topic.is_empty());
    let events = state.store.list(topic).await?;

    Ok(Json(events))
}

pub async fn stats(state: State<router::State>) -> Json<StatsSnapshot> {
    Json(state.gateway.stats().snapshot())
}

pub async fn readiness(state: State<router::State>) -> (StatusCode, &'static str) {
    match state.consumer.state() {
        ConsumerState::Stopped => (StatusCode::SERVICE_UNAVAILABLE, "consumer stopped"),
        ConsumerState::Running if !state.gateway.is_accepting() => {
            (StatusCode::SERVICE_UNAVAILABLE, "ingestion queue closed")
        }
        ConsumerState::Running => (StatusCode::OK, "ready"),
    }
}

pub async fn liveness() -> &'static str {
    "alive"
}
