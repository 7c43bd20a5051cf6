//! Shared types for the chat flow.
//!
//! Conversation messages, the orchestrator's awaiting-state, and the UI
//! side effects the shell drains after each transition.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::ChatOption;

// ─── Conversation Messages ──────────────────────────────────────────────────

/// Lifecycle of a message's text reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealState {
    /// Still being revealed character by character.
    Typing,
    /// Fully shown.
    Complete,
}

/// A single entry in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    /// Text after placeholder substitution; may contain inline markup.
    pub text: String,
    pub is_bot: bool,
    /// Optional icon name shown next to bot messages.
    pub icon: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub reveal: RevealState,
}

impl ChatMessage {
    /// A bot message, starting its reveal.
    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            is_bot: true,
            icon: None,
            timestamp: Utc::now(),
            reveal: RevealState::Typing,
        }
    }

    /// A user message. User text is never animated.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            is_bot: false,
            icon: None,
            timestamp: Utc::now(),
            reveal: RevealState::Complete,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

// ─── Flow State ─────────────────────────────────────────────────────────────

/// What the conversation is waiting for.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowState {
    /// Nothing loaded yet.
    Idle,
    /// A step definition is being fetched or resolved.
    Loading { step: u32 },
    /// Clickable options are shown.
    AwaitingOptions { step: u32, options: Vec<ChatOption> },
    /// A free-text or amount field is shown; `submit` resolves it.
    AwaitingInput {
        step: u32,
        input_type: Option<String>,
        placeholder: Option<String>,
        submit: ChatOption,
    },
    /// The upload widget is shown.
    FileUploadPrompt { step: u32, next_step: Option<u32> },
}

impl FlowState {
    /// Step the state belongs to.
    pub fn step_number(&self) -> Option<u32> {
        match self {
            FlowState::Idle => None,
            FlowState::Loading { step }
            | FlowState::AwaitingOptions { step, .. }
            | FlowState::AwaitingInput { step, .. }
            | FlowState::FileUploadPrompt { step, .. } => Some(*step),
        }
    }

    /// Short name for logs and views.
    pub fn kind(&self) -> &'static str {
        match self {
            FlowState::Idle => "idle",
            FlowState::Loading { .. } => "loading",
            FlowState::AwaitingOptions { .. } => "options",
            FlowState::AwaitingInput { .. } => "input",
            FlowState::FileUploadPrompt { .. } => "file_upload",
        }
    }
}

/// Where a resolution leaves the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Load this step next.
    Goto(u32),
    /// Stay in the current awaiting-state.
    Stay,
}

// ─── UI Effects ─────────────────────────────────────────────────────────────

/// Fire-and-forget presentation side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEffect {
    /// Scroll the named anchor into view once `delay` has passed.
    ScrollToAnchor { anchor: String, delay: Duration },
}
