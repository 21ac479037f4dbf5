//! One-legged OAuth 1.0a request signing
//!
//! Visualplatform authenticates POST requests with an OAuth 1.0a
//! `Authorization` header signed via HMAC-SHA1. There is no token
//! acquisition dance here: the caller already holds both credential pairs,
//! and every signed request is self-contained proof of them.

use std::collections::BTreeMap;

use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::{distributions::Alphanumeric, Rng};
use sha1::Sha1;
use url::{Position, Url};

use crate::error::{Result, VisualplatformError};

/// RFC 3986 unreserved characters stay bare; everything else is escaped.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const OAUTH_VERSION: &str = "1.0";
const NONCE_LENGTH: usize = 32;

/// Signs requests with the consumer credential pair fixed at construction.
#[derive(Debug, Clone)]
pub struct Signer {
    consumer_key: String,
    consumer_secret: String,
}

impl Signer {
    /// Create a signer for one consumer key/secret pair.
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
        }
    }

    /// Build the `Authorization` header value for a POST to `url`.
    ///
    /// `body_params` are the parameters transmitted outside the URL query.
    /// For multipart uploads that is only the access token again, never the
    /// file payload, so file bytes stay out of the signature.
    pub fn authorization_header(
        &self,
        url: &Url,
        body_params: &[(String, String)],
        access_token: &str,
        access_secret: &str,
    ) -> Result<String> {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LENGTH)
            .map(char::from)
            .collect();
        let timestamp = chrono::Utc::now().timestamp();
        self.authorization_header_at(url, body_params, access_token, access_secret, &nonce, timestamp)
    }

    /// [`Self::authorization_header`] with a caller-fixed nonce and
    /// timestamp, so signatures are reproducible under test.
    pub fn authorization_header_at(
        &self,
        url: &Url,
        body_params: &[(String, String)],
        access_token: &str,
        access_secret: &str,
        nonce: &str,
        timestamp: i64,
    ) -> Result<String> {
        let mut oauth_params = vec![
            ("oauth_consumer_key".to_string(), self.consumer_key.clone()),
            ("oauth_nonce".to_string(), nonce.to_string()),
            ("oauth_signature_method".to_string(), SIGNATURE_METHOD.to_string()),
            ("oauth_timestamp".to_string(), timestamp.to_string()),
            ("oauth_token".to_string(), access_token.to_string()),
            ("oauth_version".to_string(), OAUTH_VERSION.to_string()),
        ];

        let base = signature_base_string(url, body_params, &oauth_params);
        let key = signing_key(&self.consumer_secret, access_secret);
        let signature = hmac_sha1_base64(key.as_bytes(), base.as_bytes())?;

        oauth_params.push(("oauth_signature".to_string(), signature));
        oauth_params.sort();

        let fields: Vec<String> = oauth_params
            .iter()
            .map(|(name, value)| format!("{name}=\"{}\"", percent(value)))
            .collect();

        // The upstream service wants the bare access token as an explicit
        // trailing field, on top of the signed oauth_token.
        Ok(format!("OAuth {}, oauth_token=\"{access_token}\"", fields.join(", ")))
    }
}

/// Percent-encode per the signing scheme's strict unreserved set.
fn percent(value: &str) -> String {
    utf8_percent_encode(value, UNRESERVED).to_string()
}

/// Signing key: `percent(consumer_secret)&percent(token_secret)`.
fn signing_key(consumer_secret: &str, token_secret: &str) -> String {
    format!("{}&{}", percent(consumer_secret), percent(token_secret))
}

/// Keyed SHA-1 HMAC with a base64 digest.
fn hmac_sha1_base64(key: &[u8], message: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key)
        .map_err(|e| VisualplatformError::InvalidConfig(format!("Failed to create HMAC: {e}")))?;
    mac.update(message);
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// `POST&percent(base_url)&percent(normalized_params)` over the union of URL
/// query parameters, body parameters and the oauth protocol parameters.
/// Parameters are deduplicated by name (protocol parameters win), then
/// percent-encoded and sorted.
fn signature_base_string(
    url: &Url,
    body_params: &[(String, String)],
    oauth_params: &[(String, String)],
) -> String {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in url.query_pairs() {
        merged.insert(name.into_owned(), value.into_owned());
    }
    for (name, value) in body_params {
        merged.insert(name.clone(), value.clone());
    }
    for (name, value) in oauth_params {
        merged.insert(name.clone(), value.clone());
    }

    let mut encoded: Vec<(String, String)> = merged
        .into_iter()
        .map(|(name, value)| (percent(&name), percent(&value)))
        .collect();
    encoded.sort();

    let normalized: Vec<String> = encoded
        .into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    let base_url = &url[..Position::AfterPath];

    format!("POST&{}&{}", percent(base_url), percent(&normalized.join("&")))
}
