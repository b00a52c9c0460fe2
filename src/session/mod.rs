//! Stream consumer: one chat panel's request/stream lifecycle.
//!
//! A [`ChatSession`] owns a [`Conversation`] and at most one in-flight turn.
//! [`ChatSession::send_turn`] appends the user message and an empty assistant
//! placeholder, opens the request through a [`ChatTransport`], and grows the
//! placeholder as deltas arrive, notifying subscribers after each chunk.
//!
//! All public methods take `&self`; clones share the same session, so one
//! task can stream while another calls [`ChatSession::cancel`].
//!
//! # Example
//!
//! ```ignore
//! let transport = Arc::new(HttpTransport::new("http://127.0.0.1:8787/chat", None)?);
//! let session = ChatSession::new(transport, ChatConfig::default())?;
//! session.subscribe(Arc::new(|event| {
//!     if let ChatEvent::Delta { text, .. } = event {
//!         print!("{text}");
//!     }
//! }));
//! let outcome = session.send_turn("What does a pentest cover?").await;
//! ```

pub mod transport;

pub use transport::{ByteStream, ChatTransport, HttpTransport, TransportResponse};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{ChatConfig, InFlightPolicy};
use crate::conversation::Conversation;
use crate::error::{ChatRelayError, Result};
use crate::relay::http::{error_message_from_body, MAX_ERROR_BODY};
use crate::sse::{ChatCompletionDeltas, DeltaExtractor, DeltaParser};
use crate::types::{ChatEvent, ChatMessage, ChatRequest};
use crate::util::timeout::{next_within, with_timeout};

const CONNECTION_LOST: &str =
    "Sorry, I couldn't reach the assistant. Please check your connection and try again.";
const STILL_OFFLINE: &str =
    "Still unable to connect to the assistant. Please try again in a moment.";
const RATE_LIMITED_FALLBACK: &str = "Too many requests right now. Please wait a moment and try again.";
const QUOTA_FALLBACK: &str = "The assistant is temporarily unavailable. Please try again later.";

/// Messages a turn may add: user, assistant placeholder, and a trailing error notice.
const TURN_MESSAGES: usize = 3;

/// Callback invoked for every [`ChatEvent`], on the streaming task.
pub type ChatEventSink = Arc<dyn Fn(ChatEvent) + Send + Sync>;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No turn in flight; ready to accept input.
    Idle,
    /// A turn is streaming.
    Streaming,
    /// Cancellation was requested; the turn is winding down.
    Cancelling,
}

/// Why a turn was not started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EmptyInput,
    Busy,
}

/// How a turn ended.
#[derive(Debug)]
pub enum TurnOutcome {
    Completed { message_id: Uuid, text: String },
    Cancelled,
    /// `notice` is the text appended to the conversation.
    Failed { error: ChatRelayError, notice: String },
    Rejected(RejectReason),
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// One chat panel's session. Cheap to clone.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    transport: Arc<dyn ChatTransport>,
    extractor: Arc<dyn DeltaExtractor>,
    config: ChatConfig,
    conversation: Mutex<Conversation>,
    state_tx: watch::Sender<SessionState>,
    active: Mutex<Option<CancellationToken>>,
    connection_error: AtomicBool,
    sinks: RwLock<Vec<ChatEventSink>>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("state", &*self.inner.state_tx.borrow())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Create a session with an empty conversation.
    pub fn new(transport: Arc<dyn ChatTransport>, config: ChatConfig) -> Result<Self> {
        Self::assemble(transport, config, Vec::new(), Arc::new(ChatCompletionDeltas))
    }

    /// Create a session over previously displayed messages.
    ///
    /// History beyond the cap is pruned when the next turn starts.
    pub fn with_history(
        transport: Arc<dyn ChatTransport>,
        config: ChatConfig,
        history: Vec<ChatMessage>,
    ) -> Result<Self> {
        Self::assemble(transport, config, history, Arc::new(ChatCompletionDeltas))
    }

    /// Create a session for a provider whose frames need a different delta path.
    pub fn with_extractor(
        transport: Arc<dyn ChatTransport>,
        config: ChatConfig,
        extractor: Arc<dyn DeltaExtractor>,
    ) -> Result<Self> {
        Self::assemble(transport, config, Vec::new(), extractor)
    }

    fn assemble(
        transport: Arc<dyn ChatTransport>,
        config: ChatConfig,
        history: Vec<ChatMessage>,
        extractor: Arc<dyn DeltaExtractor>,
    ) -> Result<Self> {
        config.limits.validate()?;
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Ok(Self {
            inner: Arc::new(SessionInner {
                transport,
                extractor,
                conversation: Mutex::new(Conversation::restore(config.limits, history)),
                config,
                state_tx,
                active: Mutex::new(None),
                connection_error: AtomicBool::new(false),
                sinks: RwLock::new(Vec::new()),
            }),
        })
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to state transitions.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Snapshot of the conversation.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.inner.conversation.lock().await.messages().to_vec()
    }

    /// Whether the last transport-level failure has not yet been followed by a successful turn.
    pub fn has_connection_error(&self) -> bool {
        self.inner.connection_error.load(Ordering::SeqCst)
    }

    /// Register a callback for session events.
    pub fn subscribe(&self, sink: ChatEventSink) {
        if let Ok(mut sinks) = self.inner.sinks.write() {
            sinks.push(sink);
        }
    }

    /// Register a channel that receives every session event.
    pub fn events(&self) -> mpsc::UnboundedReceiver<ChatEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(Arc::new(move |event: ChatEvent| {
            let _ = tx.send(event);
        }));
        rx
    }

    /// Cancel the in-flight turn.
    ///
    /// Returns `false` if nothing was streaming. The cancelled turn appends no
    /// error message.
    pub async fn cancel(&self) -> bool {
        let active = self.inner.active.lock().await;
        match active.as_ref() {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                self.inner.state_tx.send_replace(SessionState::Cancelling);
                debug!("chat turn cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Wait until no turn is in flight.
    pub async fn wait_for_idle(&self) {
        let mut rx = self.inner.state_tx.subscribe();
        let _ = rx.wait_for(|state| *state == SessionState::Idle).await;
    }

    /// Send one user turn and stream the assistant reply.
    ///
    /// Failures never escape: they are turned into an assistant message in
    /// the conversation and reported through [`TurnOutcome::Failed`].
    pub async fn send_turn(&self, user_text: impl Into<String>) -> TurnOutcome {
        let text = user_text.into();
        if text.trim().is_empty() {
            return TurnOutcome::Rejected(RejectReason::EmptyInput);
        }

        let token = match self.begin_turn().await {
            Some(token) => token,
            None => return TurnOutcome::Rejected(RejectReason::Busy),
        };

        let (request, user_id, assistant_id, dropped) = {
            let mut conversation = self.inner.conversation.lock().await;
            let dropped = conversation.make_room(TURN_MESSAGES);
            let user_id = conversation.push(ChatMessage::user(text));
            let request = ChatRequest {
                messages: conversation.request_window(),
            };
            let assistant_id = conversation.push(ChatMessage::assistant_placeholder());
            (request, user_id, assistant_id, dropped)
        };

        if let Some(dropped) = dropped {
            warn!(dropped, "conversation exceeded its cap; oldest messages pruned");
            self.emit(ChatEvent::HistoryPruned { dropped });
        }
        self.emit(ChatEvent::TurnStarted {
            user_message_id: user_id,
            assistant_message_id: assistant_id,
        });
        debug!(window = request.messages.len(), "chat turn started");

        let result = self.stream_reply(&request, assistant_id, &token).await;
        let outcome = self.settle(result, assistant_id).await;

        let mut active = self.inner.active.lock().await;
        *active = None;
        self.inner.state_tx.send_replace(SessionState::Idle);
        outcome
    }

    /// Claim the session for a new turn, honouring the in-flight policy.
    async fn begin_turn(&self) -> Option<CancellationToken> {
        if let Some(token) = self.try_begin().await {
            return Some(token);
        }
        match self.inner.config.in_flight {
            InFlightPolicy::Reject => {
                debug!("chat turn rejected; another turn is in flight");
                None
            }
            InFlightPolicy::Preempt => {
                self.cancel().await;
                self.wait_for_idle().await;
                self.try_begin().await
            }
        }
    }

    async fn try_begin(&self) -> Option<CancellationToken> {
        let mut active = self.inner.active.lock().await;
        if active.is_some() {
            return None;
        }
        let token = CancellationToken::new();
        *active = Some(token.clone());
        self.inner.state_tx.send_replace(SessionState::Streaming);
        Some(token)
    }

    async fn stream_reply(
        &self,
        request: &ChatRequest,
        assistant_id: Uuid,
        token: &CancellationToken,
    ) -> Result<String> {
        let idle = self.inner.config.idle_timeout;

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ChatRelayError::Cancelled),
            opened = with_timeout(idle, self.inner.transport.open(request)) => opened?,
        };

        if !(200..300).contains(&response.status) {
            let body = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(ChatRelayError::Cancelled),
                body = read_error_body(response.body, idle) => body,
            };
            return Err(classify_status(response.status, &body));
        }

        let mut body = response.body;
        let mut parser = DeltaParser::new(self.inner.extractor.clone());
        let mut text = String::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(ChatRelayError::Cancelled),
                next = next_within(idle, &mut body) => next,
            };
            match next {
                Ok(Some(Ok(chunk))) => {
                    // After [DONE] the parser ignores input; keep draining to a natural close.
                    let deltas = parser.feed(&chunk);
                    self.apply_deltas(assistant_id, deltas, &mut text).await?;
                }
                Ok(None) => break,
                // The reply is already complete; a stalled or broken close is not a failure.
                Ok(Some(Err(err))) | Err(err) if parser.is_done() => {
                    debug!(error = %err, "stream ended uncleanly after [DONE]");
                    break;
                }
                Ok(Some(Err(err))) | Err(err) => return Err(err),
            }
        }

        let deltas = parser.finish();
        self.apply_deltas(assistant_id, deltas, &mut text).await?;

        if parser.dropped_frames() > 0 {
            debug!(dropped = parser.dropped_frames(), "stream finished with dropped frames");
        }
        Ok(text)
    }

    async fn apply_deltas(&self, assistant_id: Uuid, deltas: Vec<String>, text: &mut String) -> Result<()> {
        if deltas.is_empty() {
            return Ok(());
        }
        {
            let mut conversation = self.inner.conversation.lock().await;
            for delta in &deltas {
                conversation.append_delta(assistant_id, delta)?;
            }
        }
        for delta in deltas {
            text.push_str(&delta);
            self.emit(ChatEvent::Delta {
                message_id: assistant_id,
                text: delta,
            });
        }
        Ok(())
    }

    async fn settle(&self, result: Result<String>, assistant_id: Uuid) -> TurnOutcome {
        match result {
            Ok(text) => {
                self.inner.conversation.lock().await.seal(assistant_id);
                self.inner.connection_error.store(false, Ordering::SeqCst);
                self.emit(ChatEvent::Completed {
                    message_id: assistant_id,
                });
                debug!(chars = text.len(), "chat turn completed");
                TurnOutcome::Completed {
                    message_id: assistant_id,
                    text,
                }
            }
            Err(err) if err.is_cancellation() => {
                self.inner.conversation.lock().await.seal(assistant_id);
                self.emit(ChatEvent::Cancelled);
                debug!("chat turn cancelled");
                TurnOutcome::Cancelled
            }
            Err(err) => {
                let notice = self.failure_notice(&err);
                self.inner
                    .conversation
                    .lock()
                    .await
                    .record_failure(assistant_id, &notice);
                warn!(error = %err, "chat turn failed");
                self.emit(ChatEvent::Failed {
                    message: notice.clone(),
                });
                TurnOutcome::Failed { error: err, notice }
            }
        }
    }

    fn failure_notice(&self, err: &ChatRelayError) -> String {
        match err {
            ChatRelayError::RateLimited { message } | ChatRelayError::QuotaExceeded { message } => {
                message.clone()
            }
            _ => {
                let already_failing = self.inner.connection_error.swap(true, Ordering::SeqCst);
                if already_failing {
                    STILL_OFFLINE.to_string()
                } else {
                    CONNECTION_LOST.to_string()
                }
            }
        }
    }

    fn emit(&self, event: ChatEvent) {
        let sinks = match self.inner.sinks.read() {
            Ok(sinks) => sinks.clone(),
            Err(_) => return,
        };
        for sink in sinks {
            sink(event.clone());
        }
    }
}

/// Map a non-success relay status to an error.
///
/// 429 and 402 carry the relay's `{ "error": ... }` text; everything else is
/// a generic connection failure.
pub fn classify_status(status: u16, body: &str) -> ChatRelayError {
    match status {
        429 => ChatRelayError::RateLimited {
            message: error_message_from_body(body)
                .unwrap_or_else(|| RATE_LIMITED_FALLBACK.to_string()),
        },
        402 => ChatRelayError::QuotaExceeded {
            message: error_message_from_body(body).unwrap_or_else(|| QUOTA_FALLBACK.to_string()),
        },
        _ => ChatRelayError::ConnectionFailed { status },
    }
}

async fn read_error_body(mut body: ByteStream, idle: Duration) -> String {
    let mut bytes = Vec::new();
    while let Ok(Some(Ok(chunk))) = next_within(idle, &mut body).await {
        bytes.extend_from_slice(&chunk);
        if bytes.len() >= MAX_ERROR_BODY {
            bytes.truncate(MAX_ERROR_BODY);
            break;
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
