//! End-to-end: session → HTTP transport → relay server → mock gateway.

#![cfg(feature = "server")]

mod common;

use std::sync::Arc;

use chatrelay::config::{ChatConfig, RelayConfig};
use chatrelay::error::ChatRelayError;
use chatrelay::relay::{server, RelayService};
use chatrelay::session::{ChatSession, HttpTransport, TurnOutcome};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::sse_body;

async fn start_relay(config: RelayConfig) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(RelayService::new(config), listener));
    format!("http://{addr}")
}

async fn gateway_with(template: ResponseTemplate) -> MockServer {
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(template)
        .mount(&gateway)
        .await;
    gateway
}

#[tokio::test]
async fn session_streams_through_the_relay() {
    let gateway = gateway_with(
        ResponseTemplate::new(200)
            .insert_header("content-type", "text/event-stream")
            .set_body_bytes(sse_body(&["Scope ", "first, ", "then test."])),
    )
    .await;
    let relay = start_relay(
        RelayConfig::default()
            .with_api_key("k")
            .with_base_url(gateway.uri()),
    )
    .await;

    let transport = Arc::new(HttpTransport::new(format!("{relay}/chat"), None).unwrap());
    let session = ChatSession::new(transport, ChatConfig::default()).unwrap();

    let outcome = session.send_turn("How do you run an assessment?").await;
    assert!(
        matches!(outcome, TurnOutcome::Completed { ref text, .. } if text == "Scope first, then test."),
        "unexpected outcome: {outcome:?}"
    );
}

#[tokio::test]
async fn relay_response_is_an_event_stream() {
    let body = sse_body(&["x"]);
    let gateway = gateway_with(ResponseTemplate::new(200).set_body_bytes(body.clone())).await;
    let relay = start_relay(
        RelayConfig::default()
            .with_api_key("k")
            .with_base_url(gateway.uri()),
    )
    .await;

    let resp = reqwest::Client::new()
        .post(format!("{relay}/chat"))
        .json(&json!({ "messages": [{ "role": "user", "content": "hi" }] }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    assert_eq!(resp.bytes().await.unwrap().to_vec(), body);
}

#[tokio::test]
async fn rate_limit_reaches_the_session_as_text() {
    let gateway = gateway_with(
        ResponseTemplate::new(429).set_body_json(json!({ "error": "Too many requests" })),
    )
    .await;
    let relay = start_relay(
        RelayConfig::default()
            .with_api_key("k")
            .with_base_url(gateway.uri()),
    )
    .await;

    let transport = Arc::new(HttpTransport::new(format!("{relay}/chat"), None).unwrap());
    let session = ChatSession::new(transport, ChatConfig::default()).unwrap();

    let outcome = session.send_turn("hi").await;
    let TurnOutcome::Failed { error, notice } = outcome else {
        panic!("expected failure");
    };
    assert!(matches!(error, ChatRelayError::RateLimited { .. }));
    assert_eq!(notice, "Too many requests");
}

#[tokio::test]
async fn missing_key_answers_500_with_json_error() {
    let relay = start_relay(RelayConfig::default()).await;

    let resp = reqwest::Client::new()
        .post(format!("{relay}/chat"))
        .json(&json!({ "messages": [{ "role": "user", "content": "hi" }] }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("AI_GATEWAY_API_KEY"));
}

#[tokio::test]
async fn access_token_is_enforced() {
    let gateway = gateway_with(ResponseTemplate::new(200).set_body_bytes(sse_body(&["ok"]))).await;
    let relay = start_relay(
        RelayConfig::default()
            .with_api_key("k")
            .with_base_url(gateway.uri())
            .with_access_token("site-token"),
    )
    .await;
    let request = json!({ "messages": [{ "role": "user", "content": "hi" }] });
    let client = reqwest::Client::new();

    let denied = client
        .post(format!("{relay}/chat"))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 401);

    let transport = Arc::new(
        HttpTransport::new(format!("{relay}/chat"), Some("site-token".into())).unwrap(),
    );
    let session = ChatSession::new(transport, ChatConfig::default()).unwrap();
    assert!(session.send_turn("hi").await.is_completed());
}

#[tokio::test]
async fn malformed_request_is_400_and_health_is_ok() {
    let relay = start_relay(RelayConfig::default().with_api_key("k")).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{relay}/chat"))
        .header("content-type", "application/json")
        .body("{\"messages\": 5}")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let health: Value = client
        .get(format!("{relay}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({ "status": "ok" }));
}
