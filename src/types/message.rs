//! Message types for chat sessions and the relay wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message held in a chat session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Notices and error texts produced locally; never sent upstream.
    #[serde(default)]
    pub synthetic: bool,
    /// Set once the message can no longer change.
    #[serde(default)]
    pub sealed: bool,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            synthetic: false,
            sealed: true,
        }
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create a complete assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Create an empty, unsealed assistant message that a stream will fill.
    pub fn assistant_placeholder() -> Self {
        Self {
            sealed: false,
            ..Self::new(Role::Assistant, String::new())
        }
    }

    /// Create a locally generated system notice.
    pub fn notice(text: impl Into<String>) -> Self {
        Self {
            synthetic: true,
            ..Self::new(Role::System, text)
        }
    }

    /// Create a locally generated assistant message describing a failure.
    pub fn assistant_error(text: impl Into<String>) -> Self {
        Self {
            synthetic: true,
            ..Self::new(Role::Assistant, text)
        }
    }

    /// Whether this message belongs in the history sent upstream.
    pub fn is_forwardable(&self) -> bool {
        !self.synthetic && self.role != Role::System && !self.content.trim().is_empty()
    }

    /// Convert to the relay wire format. Returns `None` for system-role messages.
    pub fn to_wire(&self) -> Option<WireMessage> {
        let role = match self.role {
            Role::User => WireRole::User,
            Role::Assistant => WireRole::Assistant,
            Role::System => return None,
        };
        Some(WireMessage {
            role,
            content: self.content.clone(),
        })
    }
}

/// Roles accepted from chat clients. System instructions are added by the relay only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    User,
    Assistant,
}

/// A message as carried between client, relay and upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireMessage {
    pub role: WireRole,
    pub content: String,
}

impl WireMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::Assistant,
            content: content.into(),
        }
    }
}

/// Body of a client request to the relay endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub messages: Vec<WireMessage>,
}
