//! Transport invoker
//!
//! Issues exactly one wire operation per call and resolves exactly one
//! terminal [`TransportEvent`] for it. The request runs on a detached task
//! and reports through a oneshot channel, so a single resolution is
//! guaranteed by construction and the operation cannot be aborted from
//! outside once issued.

use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;

use crate::error::{Result, VisualplatformError};
use crate::request::{PreparedRequest, RequestShape};

/// Terminal transport events. Exactly one fires per issued request.
#[derive(Debug)]
pub enum TransportEvent {
    /// 2xx response, with its raw body.
    Success(String),
    /// Non-2xx response, with its raw body.
    Fail(String),
    /// Connection-level failure, with the underlying message.
    Error(String),
    /// The configured deadline elapsed; carries the timeout in milliseconds.
    Timeout(f64),
}

/// Issue one prepared request and await its terminal event.
///
/// Pre-wire failures (bad upload source, unencodable header) surface as
/// errors; everything after the request is issued comes back as an event.
pub async fn invoke(
    client: &Client,
    prepared: PreparedRequest,
    authorization: Option<String>,
    timeout: Duration,
) -> Result<TransportEvent> {
    let builder = build_request(client, prepared, authorization, timeout).await?;
    Ok(dispatch(builder, timeout).await)
}

/// Assemble the reqwest request for a prepared call.
async fn build_request(
    client: &Client,
    prepared: PreparedRequest,
    authorization: Option<String>,
    timeout: Duration,
) -> Result<RequestBuilder> {
    let builder = match &prepared.shape {
        RequestShape::CachedGet => client.get(prepared.url),
        RequestShape::SignedPost => client.post(prepared.url),
        RequestShape::MultipartUpload { file_field } => {
            let value = prepared.upload_value.as_ref().ok_or_else(|| {
                VisualplatformError::UploadSource(format!("upload field '{file_field}' has no value"))
            })?;
            let part = file_part(file_field, value).await?;
            client
                .post(prepared.url)
                .multipart(Form::new().part(file_field.clone(), part))
        }
    };

    let builder = builder.timeout(timeout);
    Ok(match authorization {
        Some(header) => builder.header(AUTHORIZATION, HeaderValue::from_str(&header)?),
        None => builder,
    })
}

/// Resolve an upload field value into a streamed multipart part.
///
/// The value must be a path to a readable file; its MIME type is guessed
/// from the extension and the part is streamed rather than buffered.
async fn file_part(field: &str, value: &Value) -> Result<Part> {
    let path_text = value.as_str().ok_or_else(|| {
        VisualplatformError::UploadSource(format!("upload field '{field}' must be a file path string"))
    })?;
    let path = Path::new(path_text);

    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| VisualplatformError::UploadSource(format!("cannot open '{path_text}': {e}")))?;
    let length = file
        .metadata()
        .await
        .map_err(|e| VisualplatformError::UploadSource(format!("cannot stat '{path_text}': {e}")))?
        .len();

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), length)
        .file_name(file_name)
        .mime_str(mime.as_ref())
        .map_err(|e| VisualplatformError::UploadSource(format!("invalid MIME type: {e}")))
}

/// Send the request on a detached task and await its single terminal event.
async fn dispatch(builder: RequestBuilder, timeout: Duration) -> TransportEvent {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let event = perform(builder, timeout).await;
        // A dropped receiver means the caller went away; the operation has
        // still run to its terminal event.
        let _ = tx.send(event);
    });
    match rx.await {
        Ok(event) => event,
        Err(_) => TransportEvent::Error("transport task ended before resolving".to_string()),
    }
}

async fn perform(builder: RequestBuilder, timeout: Duration) -> TransportEvent {
    let timeout_ms = timeout.as_millis() as f64;
    let response = match builder.send().await {
        Ok(response) => response,
        Err(e) if e.is_timeout() => return TransportEvent::Timeout(timeout_ms),
        Err(e) => return TransportEvent::Error(e.to_string()),
    };

    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) if e.is_timeout() => return TransportEvent::Timeout(timeout_ms),
        Err(e) => return TransportEvent::Error(e.to_string()),
    };

    if status.is_success() {
        TransportEvent::Success(body)
    } else {
        tracing::debug!(status = %status, "non-success response");
        TransportEvent::Fail(body)
    }
}
