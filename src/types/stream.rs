//! Streaming types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A transport-level unit recovered from the response byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// Empty line (event separator).
    Blank,
    /// `:`-prefixed keep-alive or comment.
    Comment(String),
    /// Payload of a `data: ` line, prefix stripped.
    Data(String),
    /// The `data: [DONE]` sentinel.
    Done,
    /// Any other line, e.g. `event:` or `id:` fields. Ignored.
    Other(String),
}

/// Notification pushed to session subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    TurnStarted {
        user_message_id: Uuid,
        assistant_message_id: Uuid,
    },
    Delta {
        message_id: Uuid,
        text: String,
    },
    HistoryPruned {
        dropped: usize,
    },
    Completed {
        message_id: Uuid,
    },
    Failed {
        message: String,
    },
    Cancelled,
}
