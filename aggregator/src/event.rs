use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::api::AggregatorError;

pub const UNKNOWN_SOURCE: &str = "unknown";

/// An event accepted by the pipeline. Everything but `topic` and `event_id`
/// is opaque to deduplication.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub topic: String,
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub payload: Map<String, Value>,
}

impl Event {
    pub fn key(&self) -> EventKey {
        EventKey {
            topic: self.topic.clone(),
            event_id: self.event_id.clone(),
        }
    }
}

/// The dedup identity of an event.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct EventKey {
    pub topic: String,
    pub event_id: String,
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.topic, self.event_id)
    }
}

/// An event as submitted by a publisher, before defaults are applied.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RawEvent {
    pub topic: String,
    pub event_id: String,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub payload: Option<Map<String, Value>>,
}

/// Parse an ISO 8601 timestamp. An offset is optional: timestamps without
/// one, such as `2025-10-23T10:00:00.123456`, are read as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    value
        .parse::<NaiveDateTime>()
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| format!("invalid timestamp `{}`: {}", value, e))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(value) => parse_timestamp(&value)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

impl RawEvent {
    /// A publish body holds either one event object or an array of them.
    /// Decoding errors name the failing field and, for batches, the index.
    pub fn from_bytes(bytes: &Bytes) -> Result<Vec<RawEvent>, AggregatorError> {
        tracing::debug!(len = bytes.len(), "decoding publish request");

        let request: Value = serde_json::from_slice(bytes).map_err(invalid_event)?;

        if request.is_object() {
            return Ok(vec![serde_json::from_value(request).map_err(invalid_event)?]);
        }
        let Value::Array(items) = request else {
            return Err(AggregatorError::InvalidEvent(
                "expected an event object or an array of events".to_string(),
            ));
        };

        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                serde_json::from_value(item).map_err(|e| {
                    tracing::debug!(index, "failed to decode event in batch: {}", e);
                    AggregatorError::InvalidEvent(format!("event {}: {}", index, e))
                })
            })
            .collect()
    }

    pub fn into_event(self, now: DateTime<Utc>) -> Result<Event, AggregatorError> {
        if self.topic.is_empty() {
            return Err(AggregatorError::MissingTopic);
        }
        if self.event_id.is_empty() {
            return Err(AggregatorError::MissingEventId);
        }

        Ok(Event {
            topic: self.topic,
            event_id: self.event_id,
            timestamp: self.timestamp.unwrap_or(now),
            source: self.source.unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
            payload: self.payload.unwrap_or_default(),
        })
    }
}

fn invalid_event(e: serde_json::Error) -> AggregatorError {
    tracing::debug!("failed to decode publish request: {}", e);
    AggregatorError::InvalidEvent(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 23, 10, 0, 0).unwrap()
    }

    #[test]
    fn decodes_single_object_and_batch() {
        let one = Bytes::from(r#"{"topic":"system","event_id":"abc123"}"#);
        let events = RawEvent::from_bytes(&one).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic, "system");

        let batch = Bytes::from(
            r#"[{"topic":"multi","event_id":"0"},{"topic":"multi","event_id":"1","source":"pytest"}]"#,
        );
        let events = RawEvent::from_bytes(&batch).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].source.as_deref(), Some("pytest"));
    }

    #[test]
    fn rejects_missing_required_fields() {
        let body = Bytes::from(r#"{"topic":"bad"}"#);
        let err = RawEvent::from_bytes(&body).unwrap_err();
        assert!(matches!(err, AggregatorError::InvalidEvent(_)));

        let body = Bytes::from("not json");
        assert!(RawEvent::from_bytes(&body).is_err());
    }

    #[test]
    fn accepts_timestamps_without_offset() {
        let body = Bytes::from(
            r#"[{"topic":"t","event_id":"1","timestamp":"2025-10-23T10:00:00"},{"topic":"t","event_id":"2","timestamp":"2025-10-23T10:00:00.123456"}]"#,
        );
        let events = RawEvent::from_bytes(&body).unwrap();

        assert_eq!(events[0].timestamp, Some(now()));
        assert_eq!(
            events[1].timestamp,
            Some(now() + chrono::Duration::microseconds(123456))
        );

        let offset = parse_timestamp("2025-10-23T12:00:00+02:00").unwrap();
        assert_eq!(offset, now());
    }

    #[test]
    fn rejects_malformed_timestamp() {
        let body = Bytes::from(r#"{"topic":"t","event_id":"1","timestamp":"yesterday"}"#);
        let AggregatorError::InvalidEvent(message) = RawEvent::from_bytes(&body).unwrap_err() else {
            panic!("expected an invalid event error");
        };
        assert!(message.contains("yesterday"), "{}", message);
    }

    #[test]
    fn decode_errors_name_field_and_index() {
        let body = Bytes::from(r#"{"topic":"bad"}"#);
        let AggregatorError::InvalidEvent(message) = RawEvent::from_bytes(&body).unwrap_err() else {
            panic!("expected an invalid event error");
        };
        assert!(message.contains("event_id"), "{}", message);

        let body = Bytes::from(r#"[{"topic":"ok","event_id":"1"},{"event_id":"2"}]"#);
        let AggregatorError::InvalidEvent(message) = RawEvent::from_bytes(&body).unwrap_err() else {
            panic!("expected an invalid event error");
        };
        assert!(message.starts_with("event 1:"), "{}", message);
        assert!(message.contains("topic"), "{}", message);

        let body = Bytes::from("42");
        assert!(matches!(
            RawEvent::from_bytes(&body),
            Err(AggregatorError::InvalidEvent(_))
        ));
    }

    #[test]
    fn applies_defaults() {
        let raw = RawEvent {
            topic: "t".to_string(),
            event_id: "1".to_string(),
            ..Default::default()
        };

        let event = raw.into_event(now()).unwrap();
        assert_eq!(event.timestamp, now());
        assert_eq!(event.source, UNKNOWN_SOURCE);
        assert!(event.payload.is_empty());
    }

    #[test]
    fn keeps_provided_fields() {
        let body = Bytes::from(
            r#"{"topic":"system","event_id":"abc123","timestamp":"2025-10-23T10:00:00Z","source":"pytest","payload":{"msg":"Hello World"}}"#,
        );
        let raw = RawEvent::from_bytes(&body).unwrap().remove(0);
        let event = raw.into_event(Utc::now()).unwrap();

        assert_eq!(event.timestamp, now());
        assert_eq!(event.source, "pytest");
        assert_eq!(event.payload.get("msg"), Some(&json!("Hello World")));
    }

    #[test]
    fn rejects_empty_identity() {
        let raw = RawEvent {
            topic: String::new(),
            event_id: "1".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            raw.into_event(now()),
            Err(AggregatorError::MissingTopic)
        ));

        let raw = RawEvent {
            topic: "t".to_string(),
            event_id: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            raw.into_event(now()),
            Err(AggregatorError::MissingEventId)
        ));
    }

    #[test]
    fn key_ignores_payload() {
        let a = RawEvent {
            topic: "t".to_string(),
            event_id: "1".to_string(),
            payload: Some(Map::from_iter([("a".to_string(), json!(1))])),
            ..Default::default()
        }
        .into_event(now())
        .unwrap();
        let b = RawEvent {
            topic: "t".to_string(),
            event_id: "1".to_string(),
            source: Some("other".to_string()),
            ..Default::default()
        }
        .into_event(now())
        .unwrap();

        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().to_string(), "t:1");
    }
}
