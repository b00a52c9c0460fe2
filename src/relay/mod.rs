//! Relay service: forwards a chat history upstream and streams the reply back.
//!
//! The relay is the only component holding the upstream credential. It adds
//! the system instruction, asks for a streamed completion, and returns the
//! upstream body untouched. Only failure statuses are translated:
//!
//! - 429 → [`ChatRelayError::RateLimited`]
//! - 402 → [`ChatRelayError::QuotaExceeded`]
//! - anything else → [`ChatRelayError::Upstream`]

pub mod http;

#[cfg(feature = "server")]
pub mod server;

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{debug, error};

use crate::config::RelayConfig;
use crate::error::{ChatRelayError, Result};
use crate::types::WireMessage;

use self::http::{bearer_headers, error_message_from_body, isolated_client, read_capped};

/// Content type of a successful relay response.
pub const EVENT_STREAM: &str = "text/event-stream";

const DEFAULT_RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded, please try again later.";
const DEFAULT_QUOTA_MESSAGE: &str = "AI usage quota exhausted, please try again later.";

/// Raw upstream body chunks.
pub type RelayStream = BoxStream<'static, Result<Bytes>>;

/// Stateless relay. Cloning is cheap; every call is independent.
#[derive(Debug, Clone)]
pub struct RelayService {
    config: Arc<RelayConfig>,
}

impl RelayService {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Forward `messages` upstream and return the streamed body.
    pub async fn relay(&self, messages: Vec<WireMessage>) -> Result<RelayStream> {
        let api_key = self.config.require_api_key()?;

        let messages: Vec<WireMessage> = messages
            .into_iter()
            .filter(|m| !m.content.trim().is_empty())
            .collect();
        if messages.is_empty() {
            return Err(ChatRelayError::InvalidArgument(
                "messages must contain at least one non-empty message".into(),
            ));
        }

        let body = self.build_request_body(&messages);
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        debug!(model = %self.config.model, messages = messages.len(), "relay request");

        let resp = isolated_client()?
            .post(&url)
            .headers(bearer_headers(Some(api_key)))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body_text = read_capped(resp.bytes_stream()).await;
            return Err(upstream_status_to_error(status, &body_text));
        }

        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(ChatRelayError::from))
            .boxed())
    }

    /// Upstream request body: system instruction, bounded history, `stream: true`.
    pub fn build_request_body(&self, messages: &[WireMessage]) -> serde_json::Value {
        let skip = messages.len().saturating_sub(self.config.max_history);
        let mut upstream = Vec::with_capacity(messages.len() - skip + 1);
        upstream.push(serde_json::json!({
            "role": "system",
            "content": self.config.system_prompt,
        }));
        upstream.extend(
            messages[skip..]
                .iter()
                .map(|m| serde_json::to_value(m).unwrap_or(serde_json::Value::Null)),
        );

        serde_json::json!({
            "model": self.config.model,
            "messages": upstream,
            "stream": true,
        })
    }
}

/// Translate a non-success upstream status.
pub fn upstream_status_to_error(status: u16, body: &str) -> ChatRelayError {
    match status {
        429 => ChatRelayError::RateLimited {
            message: error_message_from_body(body)
                .unwrap_or_else(|| DEFAULT_RATE_LIMIT_MESSAGE.to_string()),
        },
        402 => ChatRelayError::QuotaExceeded {
            message: error_message_from_body(body)
                .unwrap_or_else(|| DEFAULT_QUOTA_MESSAGE.to_string()),
        },
        _ => {
            error!(status, body, "upstream returned an error");
            ChatRelayError::upstream(status, body)
        }
    }
}
