//! ConversationLog: the append-only message history of one session.

use uuid::Uuid;

use super::types::{ChatMessage, RevealState};

/// Ordered chat messages. Entries are never removed or reordered.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    messages: Vec<ChatMessage>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bot message in the `Typing` state and return its id.
    pub fn push_bot(&mut self, text: impl Into<String>) -> Uuid {
        self.push(ChatMessage::bot(text))
    }

    /// Append a user message.
    pub fn push_user(&mut self, text: impl Into<String>) -> Uuid {
        self.push(ChatMessage::user(text))
    }

    pub fn push(&mut self, message: ChatMessage) -> Uuid {
        let id = message.id;
        tracing::debug!(
            message_id = %id,
            is_bot = message.is_bot,
            chars = message.text.chars().count(),
            "message appended"
        );
        self.messages.push(message);
        id
    }

    /// Mark a message fully revealed. Returns false for unknown ids.
    pub fn complete(&mut self, id: Uuid) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.reveal = RevealState::Complete;
                true
            }
            None => false,
        }
    }

    /// Mark every message fully revealed (e.g. when the view unmounts).
    pub fn complete_all(&mut self) {
        for message in &mut self.messages {
            message.reveal = RevealState::Complete;
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of bot messages; tests use it to assert nothing extra was said.
    pub fn bot_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_bot).count()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
