//! Relay service against a mock upstream gateway.

mod common;

use chatrelay::config::RelayConfig;
use chatrelay::error::ChatRelayError;
use chatrelay::relay::http::MAX_ERROR_BODY;
use chatrelay::relay::RelayService;
use chatrelay::types::WireMessage;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::sse_body;

fn service_for(server: &MockServer) -> RelayService {
    let mut config = RelayConfig::default()
        .with_api_key("test-key")
        .with_base_url(server.uri());
    config.system_prompt = "You are a security assistant.".into();
    config.model = "test-model".into();
    RelayService::new(config)
}

async fn collect(service: &RelayService, messages: Vec<WireMessage>) -> Vec<u8> {
    let mut stream = service.relay(messages).await.expect("relay should succeed");
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk.expect("chunk"));
    }
    body
}

#[tokio::test]
async fn upstream_body_is_passed_through_unchanged() {
    let server = MockServer::start().await;
    let mut upstream = b": keep-alive\n\n".to_vec();
    upstream.extend_from_slice(&sse_body(&["Hi", " there"]));
    upstream.extend_from_slice(b"data: {broken\n");

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_bytes(upstream.clone()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let body = collect(&service_for(&server), vec![WireMessage::user("hello")]).await;
    assert_eq!(body, upstream);
}

#[tokio::test]
async fn request_carries_system_prompt_model_and_stream_flag() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "model": "test-model", "stream": true })))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(sse_body(&["ok"])))
        .expect(1)
        .mount(&server)
        .await;

    let service = service_for(&server);
    collect(
        &service,
        vec![WireMessage::user("q1"), WireMessage::assistant("a1"), WireMessage::user("q2")],
    )
    .await;

    let requests = server.received_requests().await.expect("recording enabled");
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let messages = sent["messages"].as_array().unwrap();
    assert_eq!(
        messages[0],
        json!({ "role": "system", "content": "You are a security assistant." })
    );
    let rest: Vec<(&str, &str)> = messages[1..]
        .iter()
        .map(|m| (m["role"].as_str().unwrap(), m["content"].as_str().unwrap()))
        .collect();
    assert_eq!(rest, vec![("user", "q1"), ("assistant", "a1"), ("user", "q2")]);
}

#[tokio::test]
async fn rate_limit_status_maps_to_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "Rate limit exceeded, slow down." }
        })))
        .mount(&server)
        .await;

    let err = service_for(&server)
        .relay(vec![WireMessage::user("hi")])
        .await
        .err()
        .expect("429 should fail");
    assert!(matches!(err, ChatRelayError::RateLimited { ref message } if message == "Rate limit exceeded, slow down."));
    assert_eq!(err.http_status(), 429);
    assert_eq!(err.public_message(), "Rate limit exceeded, slow down.");
}

#[tokio::test]
async fn payment_required_maps_to_quota_exceeded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(402).set_body_string("no credits"))
        .mount(&server)
        .await;

    let err = service_for(&server)
        .relay(vec![WireMessage::user("hi")])
        .await
        .err()
        .expect("402 should fail");
    assert!(matches!(err, ChatRelayError::QuotaExceeded { .. }));
    assert_eq!(err.http_status(), 402);
}

#[tokio::test]
async fn other_failures_are_generic() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("internal details"))
        .mount(&server)
        .await;

    let err = service_for(&server)
        .relay(vec![WireMessage::user("hi")])
        .await
        .err()
        .expect("503 should fail");
    assert!(matches!(err, ChatRelayError::Upstream { status: 503, .. }));
    assert_eq!(err.http_status(), 500);
    assert_eq!(err.public_message(), "AI gateway error");
}

#[tokio::test]
async fn oversized_error_body_is_capped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("e".repeat(256 * 1024)))
        .mount(&server)
        .await;

    let err = service_for(&server)
        .relay(vec![WireMessage::user("hi")])
        .await
        .err()
        .expect("500 should fail");
    let ChatRelayError::Upstream { status, message } = err else {
        panic!("expected upstream error");
    };
    assert_eq!(status, 500);
    assert_eq!(message.len(), MAX_ERROR_BODY);
}

#[tokio::test]
async fn missing_key_never_contacts_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let service = RelayService::new(RelayConfig::default().with_base_url(server.uri()));
    let err = service
        .relay(vec![WireMessage::user("hi")])
        .await
        .err()
        .expect("missing key should fail");
    assert!(matches!(err, ChatRelayError::Configuration(_)));
    assert_eq!(err.http_status(), 500);
}

#[tokio::test]
async fn history_beyond_max_is_truncated_from_the_front() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(sse_body(&[])))
        .mount(&server)
        .await;

    let mut config = RelayConfig::default()
        .with_api_key("test-key")
        .with_base_url(server.uri());
    config.max_history = 3;
    let service = RelayService::new(config);

    let messages = (0..8).map(|i| WireMessage::user(format!("m{i}"))).collect();
    collect(&service, messages).await;

    let requests = server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let contents: Vec<&str> = sent["messages"]
        .as_array()
        .unwrap()
        .iter()
        .skip(1)
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["m5", "m6", "m7"]);
}

#[tokio::test]
async fn blank_messages_are_rejected_before_forwarding() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = service_for(&server)
        .relay(vec![WireMessage::user("  ")])
        .await
        .err()
        .expect("blank history should fail");
    assert!(matches!(err, ChatRelayError::InvalidArgument(_)));
    assert_eq!(err.http_status(), 400);
}
