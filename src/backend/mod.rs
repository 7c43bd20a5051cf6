//! Backend: HTTP access to the report service.
//!
//! This module handles all communication with the backend:
//! - Chat-flow step definitions and choice resolution
//! - INK2 tax recalculation and the tax sync into the statements
//! - SIE file uploads
//! - Client configuration loading from `config/arsflow.yaml`
//!
//! The chat flow only sees the [`FlowBackend`] trait, so the orchestrator can
//! be driven by a scripted backend in tests.

pub mod client;
pub mod config;
pub mod errors;
#[cfg(test)]
pub(crate) mod mock;
pub mod types;

// Re-exports for convenience
pub use client::{BackendClient, FlowBackend};
pub use config::{ApiConfig, ClientConfig, RevealPacing, UiConfig};
pub use errors::BackendError;
pub use types::{
    ActionType, ChatOption, ChatStep, ChoiceOutcome, ChoiceRequest, FileRole, QuestionType,
    RecalculateRequest, RecalculateResponse, TaxSyncRequest, TaxSyncResponse, UploadFile,
};
