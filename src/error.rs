//! Client error types
//!
//! Single error enum shared by every layer of the client: endpoint table
//! loading, request assembly, signing, transport and response normalization.

use thiserror::Error;

/// Common error type for all Visualplatform API calls.
#[derive(Debug, Error)]
pub enum VisualplatformError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Timeout: {0}")]
    Timeout(f64),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Upload source error: {0}")]
    UploadSource(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),
}

pub type Result<T> = std::result::Result<T, VisualplatformError>;

impl From<reqwest::Error> for VisualplatformError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for VisualplatformError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for VisualplatformError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}
