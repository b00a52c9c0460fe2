//! Convenience re-exports for common use.

pub use crate::config::{ChatConfig, HistoryLimits, InFlightPolicy, RelayConfig};
pub use crate::conversation::Conversation;
pub use crate::error::{ChatRelayError, Result};
pub use crate::relay::RelayService;
pub use crate::session::{
    ChatSession, ChatTransport, HttpTransport, RejectReason, SessionState, TurnOutcome,
};
pub use crate::sse::{ChatCompletionDeltas, DeltaExtractor, DeltaParser};
pub use crate::types::{ChatEvent, ChatMessage, ChatRequest, Role, WireMessage};
