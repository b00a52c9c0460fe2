//! HTTP surface for the relay (axum).

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::RelayConfig;
use crate::error::{ChatRelayError, Result};
use crate::types::ChatRequest;

use super::{RelayService, EVENT_STREAM};

#[derive(serde::Serialize)]
struct Health {
    status: &'static str,
}

/// Build the relay router: `POST /chat`, `GET /health`.
pub fn router(service: RelayService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .layer(cors)
        .with_state(service)
}

/// Serve the relay on an already-bound listener until the task is dropped.
pub async fn serve(service: RelayService, listener: tokio::net::TcpListener) -> Result<()> {
    axum::serve(listener, router(service)).await?;
    Ok(())
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn chat(State(service): State<RelayService>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(err) = authorize(service.config(), &headers) {
        return error_response(&err);
    }

    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => return error_response(&ChatRelayError::from(err)),
    };

    tracing::info!(messages = request.messages.len(), "relaying chat turn");

    match service.relay(request.messages).await {
        Ok(stream) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, EVENT_STREAM)
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from_stream(stream))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(err) => error_response(&err),
    }
}

fn authorize(config: &RelayConfig, headers: &HeaderMap) -> Result<()> {
    let Some(expected) = config.access_token.as_deref() else {
        return Ok(());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(token) if token == expected => Ok(()),
        _ => Err(ChatRelayError::Unauthorized(
            "missing or invalid bearer token".into(),
        )),
    }
}

fn error_response(err: &ChatRelayError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(error = %err, "relay request failed");
    } else {
        tracing::warn!(error = %err, status = status.as_u16(), "relay request rejected");
    }
    (status, Json(serde_json::json!({ "error": err.public_message() }))).into_response()
}
