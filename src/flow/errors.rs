//! Chat-flow error types.

use thiserror::Error;

use super::substitution::format_sek;
use crate::backend::BackendError;

/// Errors that can occur while moving through the conversation.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A previous selection is still being resolved.
    #[error("a step transition is already in progress")]
    Busy,

    /// The selected option is not offered by the current step.
    #[error("option '{option_value}' is not offered at step {step}")]
    StaleOption { step: u32, option_value: String },

    /// Input was submitted while no input field is shown.
    #[error("the current step does not accept input")]
    NotAwaitingInput,

    /// Typed input is not a number.
    #[error("'{input}' is not a valid amount")]
    InvalidAmount { input: String },

    /// Dividend larger than free equity (or negative).
    #[error("dividend {requested} is outside 0..={available}")]
    DividendExceedsFreeEquity { requested: f64, available: f64 },

    /// Automatic continuations chained beyond the configured limit.
    #[error("step {step} auto-advanced more than {limit} times in a row")]
    AutoAdvanceLoop { step: u32, limit: u32 },

    /// Network or backend failure.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl FlowError {
    /// Whether the error was already posted as a bot message.
    ///
    /// Busy, stale and out-of-place submissions are UI-level rejections;
    /// everything else is reported in the conversation.
    pub fn is_reported_in_chat(&self) -> bool {
        !matches!(
            self,
            FlowError::Busy | FlowError::StaleOption { .. } | FlowError::NotAwaitingInput
        )
    }

    /// Swedish bot-message text for this error.
    pub fn user_message(&self) -> String {
        match self {
            FlowError::Busy => "Vänta lite, ditt förra val behandlas fortfarande.".to_string(),
            FlowError::StaleOption { .. } => "Det valet är inte längre tillgängligt.".to_string(),
            FlowError::NotAwaitingInput => "Det finns inget att skicka in just nu.".to_string(),
            FlowError::InvalidAmount { .. } => {
                "Ange ett giltigt belopp, till exempel 40 000.".to_string()
            }
            FlowError::DividendExceedsFreeEquity {
                requested,
                available,
            } => format!(
                "Utdelningen ({} kr) måste vara mellan 0 och det fria egna kapitalet ({} kr).",
                format_sek(*requested),
                format_sek(*available)
            ),
            FlowError::AutoAdvanceLoop { .. } => {
                "Konversationen kunde inte fortsätta automatiskt. Ladda om sidan och försök igen."
                    .to_string()
            }
            FlowError::Backend(_) => {
                "Något gick fel när nästa steg skulle hämtas. Ladda om sidan och försök igen."
                    .to_string()
            }
        }
    }
}
