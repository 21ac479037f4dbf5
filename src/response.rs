//! Response normalization
//!
//! The upstream service answers with JSON of varying quality: most bodies
//! parse cleanly, some arrive with unquoted object keys or raw control
//! characters and need a bounded repair pass, and error payloads range from
//! structured objects to bare numbers. This module folds all of that into a
//! single success value or a typed error.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{Result, VisualplatformError};
use crate::transport::TransportEvent;

/// Endpoint whose responses carry per-section photo lists to merge.
const CONCATENATE_ENDPOINT: &str = "/api/concatenate";

/// Generic reason used when an error payload cannot be parsed at all.
const PARSE_FAILURE_REASON: &str = "Error parsing response";

/// Unquoted keys of the form `section_42:` produced by the upstream
/// serializer.
static BARE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-z]+_[0-9]+):").expect("Failed to compile bare key regex")
});

/// Raw ASCII control characters embedded in string values.
static CONTROL_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x00-\x1F]+").expect("Failed to compile control char regex")
});

/// Fold one terminal transport event into the call outcome.
pub fn normalize(event: TransportEvent) -> Result<Value> {
    match event {
        TransportEvent::Success(body) => normalize_success(&body),
        TransportEvent::Fail(body) => Err(normalize_failure(&body)),
        TransportEvent::Error(message) => Err(normalize_failure(&message)),
        TransportEvent::Timeout(millis) => Err(normalize_failure(&format!("{millis}"))),
    }
}

/// Parse (repairing once if needed), check the payload status, and merge
/// concatenate responses.
fn normalize_success(body: &str) -> Result<Value> {
    let payload = match serde_json::from_str::<Value>(body) {
        Ok(payload) => payload,
        Err(e) => {
            let trimmed = body.trim();
            if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
                return Err(VisualplatformError::Parse(e.to_string()));
            }
            tracing::warn!(error = %e, "response body is not strict JSON, attempting repair");
            serde_json::from_str(&repair(trimmed))
                .map_err(|e| VisualplatformError::Parse(e.to_string()))?
        }
    };

    if let Some(status) = payload.get("status") {
        let ok = status.as_str().is_some_and(|s| s.eq_ignore_ascii_case("ok"));
        if !ok {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            return Err(VisualplatformError::Api(message.to_string()));
        }
    }

    if payload.get("endpoint").and_then(Value::as_str) == Some(CONCATENATE_ENDPOINT) {
        return Ok(merge_section_photos(payload));
    }
    Ok(payload)
}

/// Bounded repair pass for near-JSON bodies: quote bare keys, strip raw
/// control characters, normalize en/em dashes. The key regex can also match
/// inside string values; that risk is accepted, the pass only runs on bodies
/// that already failed strict parsing.
fn repair(body: &str) -> String {
    let quoted = BARE_KEY.replace_all(body, "\"${1}\":");
    let stripped = CONTROL_CHARS.replace_all(&quoted, "");
    stripped.replace('\u{2013}', "-").replace('\u{2014}', "-")
}

/// Map an error payload onto the error taxonomy: objects carry a message,
/// bare numbers mark timeouts, other scalars pass through verbatim and
/// unparseable payloads get the generic reason.
fn normalize_failure(payload: &str) -> VisualplatformError {
    let parsed: Value = match serde_json::from_str(payload) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!(error = %e, "error payload is not JSON");
            return VisualplatformError::Parse(PARSE_FAILURE_REASON.to_string());
        }
    };

    match parsed {
        Value::Object(map) => {
            let message = map
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            VisualplatformError::Network(message.to_string())
        }
        Value::Number(number) => VisualplatformError::Timeout(number.as_f64().unwrap_or(0.0)),
        Value::String(text) => VisualplatformError::Network(text),
        other => VisualplatformError::Network(other.to_string()),
    }
}

/// Build a fresh object keeping every non-photo-bearing property and
/// collapsing all `photos` arrays, in document order, under one `photos`
/// key.
fn merge_section_photos(payload: Value) -> Value {
    let Value::Object(map) = payload else {
        return payload;
    };

    let mut merged = Map::new();
    let mut photos = Vec::new();
    for (key, value) in map {
        match value.get("photos").and_then(Value::as_array) {
            Some(list) => photos.extend(list.iter().cloned()),
            None => {
                merged.insert(key, value);
            }
        }
    }
    merged.insert("photos".to_string(), Value::Array(photos));
    Value::Object(merged)
}
