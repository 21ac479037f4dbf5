//! Request classification and argument assembly
//!
//! Every call takes one of three wire shapes: an unauthenticated cacheable
//! GET, a signed POST, or a signed multipart upload. Classification looks
//! only at endpoint metadata plus the caller's routing flags; assembly works
//! on a shallow copy so the caller's map is never mutated.

use serde_json::{json, Map, Value};
use url::Url;

use crate::endpoints::EndpointDescriptor;
use crate::error::{Result, VisualplatformError};

/// Wire shape of one classified call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestShape {
    /// Unauthenticated GET, eligible for upstream caching.
    CachedGet,
    /// OAuth-signed POST carrying its arguments in the query string.
    SignedPost,
    /// OAuth-signed POST streaming `file_field` as a multipart body part.
    MultipartUpload { file_field: String },
}

/// One classified, assembled request, ready for signing and dispatch.
#[derive(Debug)]
pub struct PreparedRequest {
    pub shape: RequestShape,
    pub url: Url,
    /// Raw caller value of the upload field, held back from the query.
    pub upload_value: Option<Value>,
}

/// Decide the wire shape for `endpoint` given the caller's data.
pub fn classify(endpoint: &EndpointDescriptor, data: &Map<String, Value>) -> RequestShape {
    let wants_get = data.get("requestMethod").and_then(Value::as_str) == Some("GET");
    let published_only = data.get("include_unpublished_p").map_or(true, is_zero_like);
    if wants_get && published_only && endpoint.cacheable() {
        return RequestShape::CachedGet;
    }

    if let Some(field) = endpoint.upload_field() {
        if data.contains_key(field) {
            return RequestShape::MultipartUpload { file_field: field.to_string() };
        }
        // Declared upload field not supplied: send as a plain signed POST.
        tracing::debug!(path = endpoint.path(), field, "upload field absent, sending without body");
    }

    RequestShape::SignedPost
}

/// Assemble the outgoing URL and argument set for one call against
/// `base_url` (scheme and host, no trailing slash).
pub fn prepare(
    base_url: &str,
    endpoint: &EndpointDescriptor,
    data: &Map<String, Value>,
    access_token: &str,
) -> Result<PreparedRequest> {
    let shape = classify(endpoint, data);

    let mut args = data.clone();
    args.insert("format".to_string(), json!("json"));
    args.insert("raw".to_string(), json!("1"));

    let mut upload_value = None;
    match &shape {
        RequestShape::CachedGet => {
            // Routing metadata, not an API parameter. Cacheable GETs are
            // also unauthenticated, so no token is added.
            args.remove("requestMethod");
        }
        RequestShape::SignedPost => {
            args.insert("oauth_token".to_string(), json!(access_token));
        }
        RequestShape::MultipartUpload { file_field } => {
            upload_value = args.remove(file_field);
            args.insert("oauth_token".to_string(), json!(access_token));
        }
    }

    let mut url = Url::parse(&format!("{base_url}{}", endpoint.path()))
        .map_err(|e| VisualplatformError::InvalidConfig(format!("request url: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        for (name, value) in &args {
            query.append_pair(name, &param_value(value));
        }
    }

    Ok(PreparedRequest { shape, url, upload_value })
}

/// `include_unpublished_p` counts as unset for any zero-like value.
fn is_zero_like(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty() || text == "0",
        _ => false,
    }
}

/// Wire encoding of one argument value. Strings go bare, scalars and
/// containers as their JSON text.
fn param_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
