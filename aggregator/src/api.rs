use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PublishResponse {
    pub accepted: usize,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct IndexResponse {
    pub message: String,
    pub available_endpoints: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub topic: Option<String>,
}

#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("invalid event schema: {0}")]
    InvalidEvent(String),
    #[error("request holds no event")]
    EmptyBatch,
    #[error("event submitted with an empty topic")]
    MissingTopic,
    #[error("event submitted with an empty event_id")]
    MissingEventId,

    #[error("ingestion queue is closed")]
    QueueClosed,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for AggregatorError {
    fn into_response(self) -> Response {
        match self {
            AggregatorError::InvalidEvent(_)
            | AggregatorError::EmptyBatch
            | AggregatorError::MissingTopic
            | AggregatorError::MissingEventId => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }

            AggregatorError::QueueClosed => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),

            AggregatorError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        }
        .into_response()
    }
}
