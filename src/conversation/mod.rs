//! Bounded conversation history.

use uuid::Uuid;

use crate::config::HistoryLimits;
use crate::error::{ChatRelayError, Result};
use crate::types::{ChatMessage, Role, WireMessage};

const PRUNE_NOTICE: &str = "Earlier messages were removed to keep this conversation short.";

/// Ordered chat history for one session.
///
/// Retains up to `max_retained` messages for display; only the trailing
/// `window` forwardable messages are sent upstream.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    limits: HistoryLimits,
}

impl Conversation {
    pub fn new(limits: HistoryLimits) -> Self {
        Self {
            messages: Vec::new(),
            limits,
        }
    }

    /// Restore previously displayed history, pruning it if it is over the cap.
    pub fn restore(limits: HistoryLimits, messages: Vec<ChatMessage>) -> Self {
        let mut conversation = Self { messages, limits };
        conversation.make_room(0);
        conversation
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn limits(&self) -> HistoryLimits {
        self.limits
    }

    pub fn get(&self, id: Uuid) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Make room for `incoming` more messages.
    ///
    /// If they would push the history past the cap, keeps the last
    /// `retain_after_prune` messages and appends a notice. Returns how many
    /// messages were dropped.
    pub fn make_room(&mut self, incoming: usize) -> Option<usize> {
        if self.messages.len() + incoming <= self.limits.max_retained {
            return None;
        }
        let keep = self.limits.retain_after_prune.min(self.messages.len());
        let dropped = self.messages.len() - keep;
        self.messages.drain(..dropped);
        self.messages.push(ChatMessage::notice(PRUNE_NOTICE));
        tracing::debug!(dropped, retained = self.messages.len(), "pruned conversation history");
        Some(dropped)
    }

    /// Append a message and return its id.
    pub fn push(&mut self, message: ChatMessage) -> Uuid {
        let id = message.id;
        self.messages.push(message);
        id
    }

    /// The trailing window sent upstream, oldest first.
    pub fn request_window(&self) -> Vec<WireMessage> {
        let mut window: Vec<WireMessage> = self
            .messages
            .iter()
            .rev()
            .filter(|m| m.is_forwardable())
            .filter_map(ChatMessage::to_wire)
            .take(self.limits.window)
            .collect();
        window.reverse();
        window
    }

    /// Append `text` to an unsealed assistant message.
    pub fn append_delta(&mut self, id: Uuid, text: &str) -> Result<()> {
        let message = self.open_assistant(id)?;
        message.content.push_str(text);
        Ok(())
    }

    /// Replace the content of an unsealed assistant message with a failure text.
    pub fn fail_in_place(&mut self, id: Uuid, text: &str) -> Result<()> {
        let message = self.open_assistant(id)?;
        message.content = text.to_string();
        message.synthetic = true;
        message.sealed = true;
        Ok(())
    }

    /// Show a failure for the turn whose reply is `id`.
    ///
    /// An empty placeholder is replaced by the failure text. Otherwise the
    /// reply is sealed as-is and the text follows as a separate message.
    pub fn record_failure(&mut self, id: Uuid, text: &str) {
        let empty = self.get(id).is_some_and(|m| m.content.is_empty());
        if empty && self.fail_in_place(id, text).is_ok() {
            return;
        }
        self.seal(id);
        self.push(ChatMessage::assistant_error(text));
    }

    /// Mark a message as final.
    pub fn seal(&mut self, id: Uuid) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            message.sealed = true;
        }
    }

    fn open_assistant(&mut self, id: Uuid) -> Result<&mut ChatMessage> {
        let message = self
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| ChatRelayError::InvalidState(format!("message {id} not found")))?;
        if message.role != Role::Assistant || message.sealed {
            return Err(ChatRelayError::InvalidState(format!(
                "message {id} is not an open assistant message"
            )));
        }
        Ok(message)
    }
}
