//! How a session reaches the relay.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::debug;

use crate::error::ChatRelayError;
use crate::relay::http::{bearer_headers, isolated_client};
use crate::types::ChatRequest;

/// Response body as raw chunks, in arrival order.
pub type ByteStream = BoxStream<'static, Result<Bytes, ChatRelayError>>;

/// Status and body of a relay response. The body has not been read yet.
pub struct TransportResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Opens one chat request. Dropping the returned body aborts the read.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, request: &ChatRequest) -> Result<TransportResponse, ChatRelayError>;
}

/// Posts chat requests to a relay endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Result<Self, ChatRelayError> {
        Ok(Self {
            client: isolated_client()?,
            endpoint: endpoint.into(),
            token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<TransportResponse, ChatRelayError> {
        debug!(endpoint = %self.endpoint, messages = request.messages.len(), "opening chat stream");

        let resp = self
            .client
            .post(&self.endpoint)
            .headers(bearer_headers(self.token.as_deref()))
            .json(request)
            .send()
            .await?;

        Ok(TransportResponse {
            status: resp.status().as_u16(),
            body: resp
                .bytes_stream()
                .map(|chunk| chunk.map_err(ChatRelayError::from))
                .boxed(),
        })
    }
}
