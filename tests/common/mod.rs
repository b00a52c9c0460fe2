//! Shared test helpers: scripted transport and SSE body builders.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use chatrelay::error::ChatRelayError;
use chatrelay::session::{ChatTransport, TransportResponse};
use chatrelay::types::ChatRequest;

/// One scripted reply.
#[derive(Clone)]
pub enum Script {
    /// Respond with `status` and deliver `chunks`, optionally hanging afterwards.
    Reply {
        status: u16,
        chunks: Vec<Vec<u8>>,
        stall: bool,
    },
    /// Fail before any response, as a refused connection does.
    Refused,
}

impl Script {
    pub fn ok(chunks: Vec<Vec<u8>>) -> Self {
        Self::Reply {
            status: 200,
            chunks,
            stall: false,
        }
    }

    pub fn ok_then_stall(chunks: Vec<Vec<u8>>) -> Self {
        Self::Reply {
            status: 200,
            chunks,
            stall: true,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self::Reply {
            status,
            chunks: vec![body.as_bytes().to_vec()],
            stall: false,
        }
    }
}

/// A [`ChatTransport`] that plays back queued scripts and records requests.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<Vec<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> ChatRequest {
        self.requests().pop().expect("no request recorded")
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn open(&self, request: &ChatRequest) -> Result<TransportResponse, ChatRelayError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                panic!("no scripted response left");
            }
            scripts.remove(0)
        };

        match script {
            Script::Refused => Err(ChatRelayError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
            Script::Reply {
                status,
                chunks,
                stall,
            } => {
                let head = futures::stream::iter(
                    chunks
                        .into_iter()
                        .map(|c| Ok::<_, ChatRelayError>(Bytes::from(c))),
                );
                let body = if stall {
                    head.chain(futures::stream::pending()).boxed()
                } else {
                    head.boxed()
                };
                Ok(TransportResponse { status, body })
            }
        }
    }
}

/// A transport whose body trickles chunks with a delay, for cancellation tests.
pub struct SlowTransport {
    pub chunks: Vec<Vec<u8>>,
    pub delay: Duration,
}

#[async_trait]
impl ChatTransport for SlowTransport {
    async fn open(&self, _request: &ChatRequest) -> Result<TransportResponse, ChatRelayError> {
        let delay = self.delay;
        let body = futures::stream::iter(self.chunks.clone())
            .then(move |chunk| async move {
                tokio::time::sleep(delay).await;
                Ok::<_, ChatRelayError>(Bytes::from(chunk))
            })
            .boxed();
        Ok(TransportResponse { status: 200, body })
    }
}

/// `data: {"choices":[{"delta":{"content":...}}]}` line, newline-terminated.
pub fn delta_line(text: &str) -> String {
    let payload = serde_json::json!({ "choices": [{ "delta": { "content": text } }] });
    format!("data: {payload}\n")
}

/// Full SSE body: one delta frame per piece, blank separators, then `[DONE]`.
pub fn sse_body(pieces: &[&str]) -> Vec<u8> {
    let mut body = String::new();
    for piece in pieces {
        body.push_str(&delta_line(piece));
        body.push('\n');
    }
    body.push_str("data: [DONE]\n\n");
    body.into_bytes()
}

/// Split `body` into chunks of at most `size` bytes.
pub fn chunked(body: &[u8], size: usize) -> Vec<Vec<u8>> {
    body.chunks(size).map(<[u8]>::to_vec).collect()
}
