//! Visualplatform HTTP Client
//!
//! One client per site: construction binds the service domain and consumer
//! credential pair, compiles the endpoint tables into a call surface, and
//! every call is then addressed by literal path or dotted alias.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use visualplatform::{Params, Visualplatform};
//!
//! # async fn example() -> Result<(), visualplatform::VisualplatformError> {
//! let client = Visualplatform::new("mysite.23video.com", "consumer-key", "consumer-secret")?;
//!
//! let mut data = Params::new();
//! data.insert("album_id".to_string(), json!("12345"));
//! data.insert("requestMethod".to_string(), json!("GET"));
//!
//! let photos = client.call("photo.list", &data, "access-token", "access-secret").await?;
//! println!("{photos}");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::Client;
use serde_json::{Map, Value};
use url::Url;

use crate::endpoints::{CallSurface, EndpointTable};
use crate::error::{Result, VisualplatformError};
use crate::request::{self, RequestShape};
use crate::response;
use crate::signer::Signer;
use crate::transport;

/// Caller-supplied parameters for one call.
pub type Params = Map<String, Value>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one Visualplatform site.
#[derive(Debug)]
pub struct Visualplatform {
    base_url: String,
    callback_url: String,
    timeout: Duration,
    signer: Signer,
    surface: CallSurface,
    client: Client,
}

impl Visualplatform {
    /// Create a client over the standard bundled endpoint tables.
    pub fn new(
        service_domain: impl Into<String>,
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
    ) -> Result<Self> {
        Self::with_endpoint_table(service_domain, consumer_key, consumer_secret, &EndpointTable::bundled()?)
    }

    /// Create a client over caller-supplied endpoint tables.
    ///
    /// `service_domain` is a bare domain (`https://` is assumed) or a full
    /// `http(s)://` origin.
    pub fn with_endpoint_table(
        service_domain: impl Into<String>,
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        table: &EndpointTable,
    ) -> Result<Self> {
        let domain = service_domain.into();
        let domain = domain.trim_end_matches('/');
        if domain.is_empty() {
            return Err(VisualplatformError::InvalidConfig(
                "service domain must not be empty".to_string(),
            ));
        }
        let base_url = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        };
        Url::parse(&base_url)
            .map_err(|e| VisualplatformError::InvalidConfig(format!("service domain: {e}")))?;

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("visualplatform/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url,
            callback_url: String::new(),
            timeout: DEFAULT_TIMEOUT,
            signer: Signer::new(consumer_key, consumer_secret),
            surface: CallSurface::build(table)?,
            client,
        })
    }

    /// Origin the client was constructed against, e.g.
    /// `https://mysite.23video.com`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Store the OAuth callback URL used by the site's authentication flow.
    pub fn set_callback_url(&mut self, url: impl Into<String>) {
        self.callback_url = url.into();
    }

    /// The stored OAuth callback URL, empty unless set.
    #[must_use]
    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// Override the per-request timeout (default 30 seconds).
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// The compiled call surface.
    #[must_use]
    pub fn surface(&self) -> &CallSurface {
        &self.surface
    }

    /// Grouping handle for one namespace prefix, e.g. `photo`.
    pub fn namespace(&self, segment: &str) -> Result<Namespace<'_>> {
        if !self.surface.has_namespace(segment) {
            return Err(VisualplatformError::UnknownMethod(segment.to_string()));
        }
        Ok(Namespace { client: self, prefix: segment.to_string() })
    }

    /// Invoke one endpoint by literal path or dotted alias.
    ///
    /// Cacheable GETs go out unauthenticated; every other shape is signed
    /// with the consumer pair plus the supplied access pair. Pass empty
    /// token strings for calls made before any user is authorized.
    pub async fn call(
        &self,
        method: &str,
        data: &Params,
        access_token: &str,
        access_secret: &str,
    ) -> Result<Value> {
        let endpoint = self
            .surface
            .resolve(method)
            .ok_or_else(|| VisualplatformError::UnknownMethod(method.to_string()))?;

        let prepared = request::prepare(&self.base_url, endpoint, data, access_token)?;
        tracing::debug!(path = endpoint.path(), shape = ?prepared.shape, "dispatching call");

        let authorization = match &prepared.shape {
            RequestShape::CachedGet => None,
            RequestShape::SignedPost => Some(self.signer.authorization_header(
                &prepared.url,
                &[],
                access_token,
                access_secret,
            )?),
            RequestShape::MultipartUpload { .. } => {
                // Only the token rides outside the URL; file bytes never
                // enter the signature.
                let body_params = vec![("oauth_token".to_string(), access_token.to_string())];
                Some(self.signer.authorization_header(
                    &prepared.url,
                    &body_params,
                    access_token,
                    access_secret,
                )?)
            }
        };

        let event = transport::invoke(&self.client, prepared, authorization, self.timeout).await?;
        response::normalize(event)
    }
}

/// Grouping handle for one namespace prefix of the call surface.
///
/// Handles are cheap, borrow the client, and nest: `photo` yields
/// `photo.section`, and `call("list")` on a handle resolves
/// `photo.section.list`.
#[derive(Debug, Clone)]
pub struct Namespace<'a> {
    client: &'a Visualplatform,
    prefix: String,
}

impl<'a> Namespace<'a> {
    /// Descend into a nested namespace.
    pub fn namespace(&self, segment: &str) -> Result<Namespace<'a>> {
        let prefix = format!("{}.{segment}", self.prefix);
        if !self.client.surface.has_namespace(&prefix) {
            return Err(VisualplatformError::UnknownMethod(prefix));
        }
        Ok(Namespace { client: self.client, prefix })
    }

    /// The dotted prefix this handle is bound to.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Invoke `method` relative to this namespace.
    pub async fn call(
        &self,
        method: &str,
        data: &Params,
        access_token: &str,
        access_secret: &str,
    ) -> Result<Value> {
        let key = format!("{}.{method}", self.prefix);
        self.client.call(&key, data, access_token, access_secret).await
    }
}
