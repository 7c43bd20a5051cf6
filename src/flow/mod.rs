//! Chat flow: the conversation engine that walks the user through the
//! tax, dividend and signature questions.
//!
//! Submodules:
//! - `orchestrator`: `ChatFlow` state machine and three-tier option resolution
//! - `navigation`: named options, fallback steps, tax-related steps, scroll anchors
//! - `recalc`: override application (with the no-op guard) and tax sync
//! - `substitution`: `{name}` placeholders and sv-SE amount formatting
//! - `typewriter`: character-by-character reveal pacing
//! - `conversation`: append-only message log
//! - `types`: messages, flow states, UI effects
//! - `errors`: `FlowError`

pub mod conversation;
pub mod errors;
pub mod navigation;
pub mod orchestrator;
pub mod recalc;
pub mod substitution;
pub mod typewriter;
pub mod types;

// Re-exports for convenience
pub use conversation::ConversationLog;
pub use errors::FlowError;
pub use orchestrator::ChatFlow;
pub use substitution::{format_sek, render};
pub use types::{ChatMessage, FlowState, RevealState, Transition, UiEffect};
