//! Wire types for the report backend.
//!
//! Request bodies are snake_case JSON. Every response field carries a default
//! so responses from older or newer backend versions still decode: unknown
//! fields are ignored and missing ones fall back to empty values.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::model::FinancialFact;

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ─── Chat-flow steps ────────────────────────────────────────────────────────

/// How a step expects the user to respond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Informational text, usually followed by an automatic continuation.
    Message,
    /// Free-form input paired with a `submit` option.
    Input,
    #[default]
    #[serde(other)]
    Options,
}

/// What the client should do once an option is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SetVariable,
    ApiCall,
    EnableEditing,
    SaveManualTax,
    ResetTaxEdits,
    ShowInput,
    ShowFileUpload,
    #[default]
    Navigate,
    /// An action this client version does not know; treated as navigation.
    #[serde(other)]
    Unknown,
}

/// One selectable answer of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOption {
    /// `0` is reserved for the automatic continuation ("no_option").
    #[serde(default, deserialize_with = "null_as_default")]
    pub option_order: u32,
    #[serde(default)]
    pub option_text: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub option_value: String,
    #[serde(default)]
    pub next_step: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub action_type: ActionType,
    #[serde(default)]
    pub action_data: Option<serde_json::Value>,
}

impl ChatOption {
    /// Whether this is the automatic continuation of its step.
    pub fn is_auto_advance(&self) -> bool {
        self.option_order == 0
    }

    /// Whether this option is the submit half of an input step.
    pub fn is_submit(&self) -> bool {
        self.option_value == "submit"
    }

    /// `action_data.<key>` as a string, if present.
    pub fn action_str(&self, key: &str) -> Option<&str> {
        self.action_data.as_ref()?.get(key)?.as_str()
    }
}

/// A step of the server-defined conversation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatStep {
    pub step_number: u32,
    #[serde(default)]
    pub block: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub question_text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub input_type: Option<String>,
    #[serde(default)]
    pub input_placeholder: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: Vec<ChatOption>,
}

impl ChatStep {
    /// The automatic continuation, if the step has one.
    pub fn auto_advance_option(&self) -> Option<&ChatOption> {
        self.options.iter().find(|o| o.is_auto_advance())
    }

    /// The `submit` option of an input step.
    pub fn submit_option(&self) -> Option<&ChatOption> {
        self.options.iter().find(|o| o.is_submit())
    }

    /// Options the user can click: neither the automatic continuation nor `submit`.
    pub fn visible_options(&self) -> Vec<ChatOption> {
        let mut options: Vec<ChatOption> = self
            .options
            .iter()
            .filter(|o| !o.is_auto_advance() && !o.is_submit())
            .cloned()
            .collect();
        options.sort_by_key(|o| o.option_order);
        options
    }
}

// ─── process-choice ─────────────────────────────────────────────────────────

/// Request body for `POST /chat-flow/process-choice`.
#[derive(Debug, Clone, Serialize)]
pub struct ChoiceRequest {
    pub step_number: u32,
    pub option_value: String,
    pub context: serde_json::Map<String, serde_json::Value>,
}

/// What the backend decided for a choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceOutcome {
    #[serde(default, deserialize_with = "null_as_default")]
    pub action_type: ActionType,
    #[serde(default)]
    pub action_data: Option<serde_json::Value>,
    #[serde(default)]
    pub next_step: Option<u32>,
}

impl ChoiceOutcome {
    /// `action_data.<key>` as a string, if present.
    pub fn action_str(&self, key: &str) -> Option<&str> {
        self.action_data.as_ref()?.get(key)?.as_str()
    }
}

// ─── recalculate-tax ────────────────────────────────────────────────────────

/// Request body for `POST /recalculate-tax`.
#[derive(Debug, Clone, Serialize)]
pub struct RecalculateRequest {
    pub accounts: BTreeMap<String, f64>,
    pub fiscal_year: Option<i32>,
    pub rr_rows: Vec<FinancialFact>,
    pub br_rows: Vec<FinancialFact>,
    /// Positive magnitudes, keyed by INK2 variable name.
    pub manual_amounts: BTreeMap<String, f64>,
    /// Optional hints (e.g. `is_first_recalculation`, api_call parameters).
    #[serde(flatten)]
    pub hints: serde_json::Map<String, serde_json::Value>,
}

/// Response of `POST /recalculate-tax`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecalculateResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub success: bool,
    #[serde(
        default,
        alias = "ink2_data",
        alias = "ink2Rows",
        deserialize_with = "null_as_default"
    )]
    pub ink2_rows: Vec<FinancialFact>,
}

// ─── update-tax-in-financial-data ───────────────────────────────────────────

/// Request body for `POST /update-tax-in-financial-data`.
#[derive(Debug, Clone, Serialize)]
pub struct TaxSyncRequest {
    pub calculated_tax: f64,
    pub booked_tax: f64,
    pub tax_difference: f64,
    pub rr_rows: Vec<FinancialFact>,
    pub br_rows: Vec<FinancialFact>,
    pub org_number: Option<String>,
    pub fiscal_year: Option<i32>,
    pub payroll_tax_amount: Option<f64>,
}

/// Updated statements returned by the tax sync.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaxSyncResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub success: bool,
    #[serde(default, alias = "rr_rows")]
    pub rr_data: Option<Vec<FinancialFact>>,
    #[serde(default, alias = "br_rows")]
    pub br_data: Option<Vec<FinancialFact>>,
}

// ─── Uploads ────────────────────────────────────────────────────────────────

/// Which fiscal year an uploaded export covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    CurrentYear,
    PreviousYear,
}

impl FileRole {
    /// Multipart field name for the two-file endpoint.
    pub fn field_name(self) -> &'static str {
        match self {
            FileRole::CurrentYear => "current_year_file",
            FileRole::PreviousYear => "previous_year_file",
        }
    }
}

/// An export file ready to be uploaded.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub role: FileRole,
    pub bytes: Vec<u8>,
}

// ─── Tests ──────────────────────────────────────────────────────────────────
