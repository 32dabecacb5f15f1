//! Shared harness for dispatcher integration tests
//!
//! Spins up one wiremock server playing all three collaborators (IPFS
//! gateway, pinning service, AI jury) and drives the real router
//! in-process. The pinning mock derives its CID from the uploaded content
//! so content-addressing behaves like the real service.

#![allow(dead_code)]

use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use ciborium::value::Value;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

use verdikta_adapter::{create_adapter_router, AppState, Config, LogLevel};

pub struct Harness {
    pub mock: MockServer,
    app: Router,
}

impl Harness {
    pub async fn start() -> Self {
        Self::start_with_pinning(true).await
    }

    /// `pinning: false` leaves the pin endpoint unmocked (404) to exercise
    /// publish failures
    pub async fn start_with_pinning(pinning: bool) -> Self {
        Self::build(pinning, Duration::from_secs(30)).await
    }

    /// Short total deadline for deadline-expiry tests
    pub async fn start_with_deadline(deadline: Duration) -> Self {
        Self::build(true, deadline).await
    }

    async fn build(pinning: bool, deadline: Duration) -> Self {
        let mock = MockServer::start().await;
        if pinning {
            Mock::given(method("POST"))
                .and(path("/pin"))
                .respond_with(ContentAddressedPin)
                .mount(&mock)
                .await;
        }

        let config = Config {
            host: "127.0.0.1".into(),
            port: 0,
            ai_node_url: mock.uri(),
            ipfs_gateways: vec![mock.uri()],
            pinning_service_url: Some(format!("{}/pin", mock.uri())),
            pinning_key: Some("test-key".into()),
            reveal_ttl: Duration::from_secs(600),
            request_deadline: deadline,
            log_level: LogLevel::Info,
            log_dir: None,
        };
        let state = AppState::with_http_jury(config).expect("state wiring");
        let app = create_adapter_router(state);
        Harness { mock, app }
    }

    /// Serve a tar.gz archive for `GET /ipfs/<cid>`
    pub async fn mount_archive(&self, cid: &str, files: &[(&str, &[u8])]) {
        let blob = build_tar_gz(files);
        Mock::given(method("GET"))
            .and(path(format!("/ipfs/{cid}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(blob))
            .mount(&self.mock)
            .await;
    }

    pub async fn mount_jury(&self, scores: &[u64], justification: &str) {
        Mock::given(method("POST"))
            .and(path("/api/rank-and-justify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "scores": scores,
                "justification": justification,
            })))
            .mount(&self.mock)
            .await;
    }

    /// Like `mount_jury` but verifies the exact call count on teardown
    pub async fn mount_jury_expect(&self, scores: &[u64], justification: &str, calls: u64) {
        Mock::given(method("POST"))
            .and(path("/api/rank-and-justify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "scores": scores,
                "justification": justification,
            })))
            .expect(calls)
            .mount(&self.mock)
            .await;
    }

    pub async fn post_oracle(&self, body: &str) -> (u16, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn get(&self, uri: &str) -> (u16, serde_json::Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (u16, serde_json::Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status().as_u16();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    /// JSON body of the most recent call to the jury endpoint
    pub async fn last_jury_request(&self) -> serde_json::Value {
        let requests = self.mock.received_requests().await.unwrap_or_default();
        requests
            .iter()
            .rev()
            .find(|r| r.url.path() == "/api/rank-and-justify")
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .expect("jury endpoint was never called")
    }
}

/// Pin responder whose CID is a digest of the uploaded file content, so
/// identical archives pin to identical CIDs
struct ContentAddressedPin;

impl Respond for ContentAddressedPin {
    fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
        let content = multipart_content(&request.body);
        let digest = Sha256::digest(&content);
        let cid = format!("bafy{}", hex::encode(&digest[..8]));
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "cid": cid,
            "size": content.len(),
        }))
    }
}

/// Strip the multipart framing (random boundary, part headers) and return
/// the file bytes
fn multipart_content(body: &[u8]) -> Vec<u8> {
    let start = find(body, b"\r\n\r\n").map(|i| i + 4).unwrap_or(0);
    let end = rfind(body, b"\r\n--").unwrap_or(body.len());
    body[start..end.max(start)].to_vec()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

pub fn build_tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn hex_bytes(result: &str) -> Vec<u8> {
    hex::decode(result.trim_start_matches("0x")).unwrap()
}

pub fn decode_result(result: &str) -> Value {
    ciborium::de::from_reader(hex_bytes(result).as_slice()).unwrap()
}

pub fn as_array(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        other => panic!("expected CBOR array, got {other:?}"),
    }
}

pub fn as_text(value: &Value) -> String {
    match value {
        Value::Text(text) => text.clone(),
        other => panic!("expected CBOR text, got {other:?}"),
    }
}

pub fn as_scores(value: &Value) -> Vec<u64> {
    as_array(value)
        .iter()
        .map(|v| match v {
            Value::Integer(i) => u64::try_from(i128::from(*i)).unwrap(),
            other => panic!("expected CBOR integer, got {other:?}"),
        })
        .collect()
}
