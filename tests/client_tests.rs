//! Integration tests for the Visualplatform client
//!
//! Every test runs against a local wiremock server standing in for the
//! upstream API, so wire shapes (methods, query strings, signatures,
//! multipart bodies) are asserted on real requests.
//!
//! Run with: cargo test --test client_tests

use std::collections::HashMap;
use std::io::Write;
use std::sync::Once;
use std::time::Duration;

use anyhow::Result;
use serde_json::{json, Value};
use visualplatform::{EndpointTable, Params, Signer, UploadDescriptor, Visualplatform, VisualplatformError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

static TRACING: Once = Once::new();

/// Install a test subscriber once so `RUST_LOG=debug` surfaces client logs.
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Endpoint tables covering all three request shapes.
fn test_table() -> EndpointTable {
    EndpointTable::new(
        vec![
            "/api/album/create".to_string(),
            "/api/album/delete".to_string(),
            "/api/album/list".to_string(),
            "/api/album/update".to_string(),
            "/api/concatenate".to_string(),
            "/api/photo/upload".to_string(),
        ],
        vec!["/api/album/list".to_string()],
        vec![UploadDescriptor {
            name: "/api/photo/upload".to_string(),
            property: "file".to_string(),
        }],
    )
}

/// Client pointed at the mock server.
fn client_for(server: &MockServer) -> Visualplatform {
    init_tracing();
    Visualplatform::with_endpoint_table(server.uri(), "ckey", "csecret", &test_table())
        .expect("Failed to build test client")
}

/// Build a Params map from literal pairs.
fn params(pairs: &[(&str, Value)]) -> Params {
    pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
}

fn ok_body() -> Value {
    json!({"status": "ok"})
}

fn query_of(request: &Request) -> Vec<(String, String)> {
    request
        .url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn has(query: &[(String, String)], name: &str, value: &str) -> bool {
    query.iter().any(|(k, v)| k == name && v == value)
}

/// Split an `OAuth a="b", c="d"` header into its fields.
fn parse_oauth_fields(header: &str) -> HashMap<String, String> {
    header
        .trim_start_matches("OAuth ")
        .split(", ")
        .filter_map(|field| {
            let (name, value) = field.split_once('=')?;
            Some((name.to_string(), value.trim_matches('"').to_string()))
        })
        .collect()
}

#[tokio::test]
async fn cached_get_is_unsigned_and_strips_request_method() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/album/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let data = params(&[("requestMethod", json!("GET")), ("album_id", json!(12345))]);
    let outcome = client.call("album.list", &data, "tok", "sec").await?;
    assert_eq!(outcome["status"], "ok");

    let requests = server.received_requests().await.expect("recording enabled");
    let request = &requests[0];
    assert!(request.headers.get("authorization").is_none());

    let query = query_of(request);
    assert!(has(&query, "format", "json"));
    assert!(has(&query, "raw", "1"));
    assert!(has(&query, "album_id", "12345"));
    assert!(!query.iter().any(|(k, _)| k == "requestMethod"));
    assert!(!query.iter().any(|(k, _)| k == "oauth_token"));
    Ok(())
}

#[tokio::test]
async fn unpublished_flag_forces_signed_post() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/album/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let data = params(&[
        ("requestMethod", json!("GET")),
        ("include_unpublished_p", json!(1)),
    ]);
    client.call("album.list", &data, "tok", "sec").await?;

    let requests = server.received_requests().await.expect("recording enabled");
    let request = &requests[0];
    assert_eq!(request.method.as_str(), "POST");

    let header = request.headers.get("authorization").expect("signed").to_str()?;
    assert!(header.starts_with("OAuth "));

    let query = query_of(request);
    assert!(has(&query, "oauth_token", "tok"));
    // only cacheable GETs strip the routing flag
    assert!(has(&query, "requestMethod", "GET"));
    assert!(has(&query, "include_unpublished_p", "1"));
    Ok(())
}

#[tokio::test]
async fn path_and_alias_produce_identical_requests() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/album/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let by_path = client.surface().resolve("/api/album/list").expect("path key");
    let by_alias = client.surface().resolve("album.list").expect("alias key");
    assert!(std::ptr::eq(by_path, by_alias));

    let data = params(&[("requestMethod", json!("GET"))]);
    client.call("/api/album/list", &data, "", "").await?;
    client.call("album.list", &data, "", "").await?;

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].url, requests[1].url);
    assert_eq!(requests[0].method, requests[1].method);
    Ok(())
}

#[tokio::test]
async fn signed_post_carries_verifiable_signature() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/album/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let data = params(&[("title", json!("Holiday 2026"))]);
    client.call("album.create", &data, "atoken", "asecret").await?;

    let requests = server.received_requests().await.expect("recording enabled");
    let request = &requests[0];
    let header = request.headers.get("authorization").expect("signed").to_str()?;
    let fields = parse_oauth_fields(header);

    assert_eq!(fields["oauth_signature_method"], "HMAC-SHA1");
    assert_eq!(fields["oauth_version"], "1.0");
    assert_eq!(fields["oauth_consumer_key"], "ckey");

    // recompute the signature from the header's own nonce/timestamp over
    // the URL that actually hit the wire
    let signer = Signer::new("ckey", "csecret");
    let expected = signer.authorization_header_at(
        &request.url,
        &[],
        "atoken",
        "asecret",
        &fields["oauth_nonce"],
        fields["oauth_timestamp"].parse()?,
    )?;
    let expected_fields = parse_oauth_fields(&expected);
    assert_eq!(fields["oauth_signature"], expected_fields["oauth_signature"]);
    Ok(())
}

#[tokio::test]
async fn upload_streams_file_as_multipart_part() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/photo/upload"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "ok", "photo_id": "p1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut media = tempfile::Builder::new().suffix(".png").tempfile()?;
    media.write_all(b"\x89PNG fake image bytes")?;
    let media_path = media.path().to_string_lossy().into_owned();

    let client = client_for(&server);
    let data = params(&[
        ("album_id", json!("a1")),
        ("title", json!("Upload test")),
        ("file", json!(media_path)),
    ]);
    let outcome = client.call("photo.upload", &data, "atoken", "asecret").await?;
    assert_eq!(outcome["photo_id"], "p1");

    let requests = server.received_requests().await.expect("recording enabled");
    let request = &requests[0];

    // the file field is held out of the query string
    let query = query_of(request);
    assert!(!query.iter().any(|(k, _)| k == "file"));
    assert!(has(&query, "oauth_token", "atoken"));
    assert!(has(&query, "album_id", "a1"));

    // the body is a multipart part streamed from the file
    let body = String::from_utf8_lossy(&request.body);
    assert!(body.contains("name=\"file\""));
    assert!(body.contains("filename="));
    assert!(body.to_lowercase().contains("content-type: image/png"));
    assert!(body.contains("PNG fake image bytes"));

    // the signature covers the token but never the file bytes: recomputing
    // with only oauth_token as the out-of-query parameter must match
    let header = request.headers.get("authorization").expect("signed").to_str()?;
    let fields = parse_oauth_fields(header);
    let signer = Signer::new("ckey", "csecret");
    let expected = signer.authorization_header_at(
        &request.url,
        &[("oauth_token".to_string(), "atoken".to_string())],
        "atoken",
        "asecret",
        &fields["oauth_nonce"],
        fields["oauth_timestamp"].parse()?,
    )?;
    let expected_fields = parse_oauth_fields(&expected);
    assert_eq!(fields["oauth_signature"], expected_fields["oauth_signature"]);
    Ok(())
}

#[tokio::test]
async fn upload_with_missing_file_is_an_upload_source_error() -> Result<()> {
    let server = MockServer::start().await;
    let client = client_for(&server);
    let data = params(&[("file", json!("/no/such/file.png"))]);
    let err = client.call("photo.upload", &data, "t", "s").await.unwrap_err();
    assert!(matches!(err, VisualplatformError::UploadSource(_)));

    let requests = server.received_requests().await.expect("recording enabled");
    assert!(requests.is_empty(), "nothing should hit the wire");
    Ok(())
}

#[tokio::test]
async fn api_error_status_surfaces_message() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/album/delete"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "error", "message": "Album not found"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .call("album.delete", &params(&[("album_id", json!("missing"))]), "t", "s")
        .await
        .unwrap_err();
    match err {
        VisualplatformError::Api(message) => assert_eq!(message, "Album not found"),
        other => panic!("expected Api error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn concatenate_endpoint_merges_section_photos() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/concatenate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "endpoint": "/api/concatenate",
            "section_a": {"photos": [{"photo_id": "1"}, {"photo_id": "2"}]},
            "section_b": {"photos": [{"photo_id": "3"}]}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let outcome = client.call("concatenate", &Params::new(), "t", "s").await?;

    assert_eq!(
        outcome["photos"],
        json!([{"photo_id": "1"}, {"photo_id": "2"}, {"photo_id": "3"}])
    );
    assert_eq!(outcome["status"], "ok");
    assert!(outcome.get("section_a").is_none());
    assert!(outcome.get("section_b").is_none());
    Ok(())
}

#[tokio::test]
async fn near_json_response_is_repaired() -> Result<()> {
    let server = MockServer::start().await;
    let body = "{\"status\":\"ok\",section_42:{\"photos\":[1]},\"note\":\"a\u{1}b\"}";
    Mock::given(method("GET"))
        .and(path("/api/album/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let data = params(&[("requestMethod", json!("GET"))]);
    let outcome = client.call("album.list", &data, "", "").await?;

    assert_eq!(outcome["section_42"]["photos"][0], 1);
    assert_eq!(outcome["note"], "ab");
    Ok(())
}

#[tokio::test]
async fn html_response_fails_with_parse_error() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/album/update"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.call("album.update", &Params::new(), "t", "s").await.unwrap_err();
    assert!(matches!(err, VisualplatformError::Parse(_)));
    Ok(())
}

#[tokio::test]
async fn numeric_error_body_is_timeout_tagged() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/album/update"))
        .respond_with(ResponseTemplate::new(500).set_body_string("30000"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.call("album.update", &Params::new(), "t", "s").await.unwrap_err();
    assert!(matches!(err, VisualplatformError::Timeout(millis) if millis == 30000.0));
    assert_eq!(err.to_string(), "Timeout: 30000");
    Ok(())
}

#[tokio::test]
async fn object_error_body_surfaces_its_message() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/album/update"))
        .respond_with(
            ResponseTemplate::new(502).set_body_json(json!({"message": "upstream gone"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.call("album.update", &Params::new(), "t", "s").await.unwrap_err();
    match err {
        VisualplatformError::Network(message) => assert_eq!(message, "upstream gone"),
        other => panic!("expected Network error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn slow_response_resolves_as_timeout() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/album/create"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(ok_body())
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    client.set_timeout(Duration::from_millis(100));
    let err = client.call("album.create", &Params::new(), "t", "s").await.unwrap_err();
    assert!(matches!(err, VisualplatformError::Timeout(millis) if millis == 100.0));
    Ok(())
}

#[tokio::test]
async fn caller_data_map_is_never_mutated() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/album/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let data = params(&[("requestMethod", json!("GET")), ("album_id", json!("a1"))]);
    let before = data.clone();
    client.call("album.list", &data, "tok", "sec").await?;
    assert_eq!(data, before);
    Ok(())
}

#[tokio::test]
async fn album_lifecycle_against_mock_service() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/album/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "album": {"album_id": "a77", "title": "Lifecycle"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/album/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "albums": [{"album_id": "a77", "title": "Lifecycle"}],
            "total_count": "1"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/album/update"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/album/delete"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let album = client.namespace("album")?;

    let created = album
        .call("create", &params(&[("title", json!("Lifecycle"))]), "tok", "sec")
        .await?;
    let album_id = created["album"]["album_id"].as_str().expect("album_id");

    let listed = client
        .call(
            "/api/album/list",
            &params(&[("requestMethod", json!("GET")), ("album_id", json!(album_id))]),
            "",
            "",
        )
        .await?;
    assert_eq!(listed["albums"][0]["title"], "Lifecycle");

    album
        .call(
            "update",
            &params(&[("album_id", json!(album_id)), ("title", json!("Renamed"))]),
            "tok",
            "sec",
        )
        .await?;

    let deleted = album
        .call("delete", &params(&[("album_id", json!(album_id))]), "tok", "sec")
        .await?;
    assert_eq!(deleted["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn unknown_method_never_reaches_the_wire() -> Result<()> {
    let server = MockServer::start().await;
    let client = client_for(&server);
    let err = client.call("nosuch.method", &Params::new(), "t", "s").await.unwrap_err();
    assert!(matches!(err, VisualplatformError::UnknownMethod(_)));

    let requests = server.received_requests().await.expect("recording enabled");
    assert!(requests.is_empty());
    Ok(())
}
