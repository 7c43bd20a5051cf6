//! Bridge between the UI shell and the chat engine.
//!
//! Every entry point takes the shared [`FlowHandle`] and returns a
//! camelCase-serialized view, or the error text as `Err(String)`.

pub mod flow;
pub mod settings;
pub mod upload;

// Re-exports for convenience
pub use flow::{
    complete_reveal, flow_snapshot, select_option, start_flow, submit_input, take_ui_effects,
    EffectView, FlowHandle, FlowSnapshot, MessageView, OptionView,
};
pub use settings::{get_client_config, ClientConfigInfo};
pub use upload::{upload_files, UploadOutcome};
