//! Scripted in-memory backend for tests.
//!
//! Steps are served from a map; choice outcomes, recalculation and tax-sync
//! responses are queued per call. Every call is recorded so tests can assert
//! exactly which network requests a flow produced.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::client::FlowBackend;
use super::errors::BackendError;
use super::types::{
    ActionType, ChatOption, ChatStep, ChoiceOutcome, ChoiceRequest, QuestionType,
    RecalculateRequest, RecalculateResponse, TaxSyncRequest, TaxSyncResponse, UploadFile,
};
use crate::model::FinancialFact;

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    FetchStep(u32),
    ProcessChoice { step_number: u32, option_value: String },
    Recalculate { manual_amounts: Vec<(String, f64)> },
    TaxSync { tax_difference: f64 },
    Upload { file_count: usize },
}

#[derive(Default)]
pub struct MockBackend {
    steps: Mutex<HashMap<u32, ChatStep>>,
    choices: Mutex<VecDeque<Result<ChoiceOutcome, BackendError>>>,
    recalculations: Mutex<VecDeque<Result<RecalculateResponse, BackendError>>>,
    tax_syncs: Mutex<VecDeque<Result<TaxSyncResponse, BackendError>>>,
    uploads: Mutex<VecDeque<Result<serde_json::Value, BackendError>>>,
    calls: Mutex<Vec<Call>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(self, step: ChatStep) -> Self {
        self.steps.lock().unwrap().insert(step.step_number, step);
        self
    }

    pub fn push_choice(&self, outcome: Result<ChoiceOutcome, BackendError>) {
        self.choices.lock().unwrap().push_back(outcome);
    }

    pub fn push_recalculation(&self, rows: Vec<FinancialFact>) {
        self.recalculations.lock().unwrap().push_back(Ok(RecalculateResponse {
            success: true,
            ink2_rows: rows,
        }));
    }

    pub fn push_tax_sync(&self, result: Result<TaxSyncResponse, BackendError>) {
        self.tax_syncs.lock().unwrap().push_back(result);
    }

    pub fn push_upload(&self, result: Result<serde_json::Value, BackendError>) {
        self.uploads.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn not_scripted(what: &str) -> BackendError {
    BackendError::HttpError {
        status: 500,
        body: format!("mock: no scripted {what}"),
    }
}

impl FlowBackend for MockBackend {
    async fn fetch_step(&self, step_number: u32) -> Result<ChatStep, BackendError> {
        self.record(Call::FetchStep(step_number));
        self.steps
            .lock()
            .unwrap()
            .get(&step_number)
            .cloned()
            .ok_or(BackendError::HttpError {
                status: 404,
                body: format!("step {step_number} not found"),
            })
    }

    async fn process_choice(&self, request: &ChoiceRequest) -> Result<ChoiceOutcome, BackendError> {
        self.record(Call::ProcessChoice {
            step_number: request.step_number,
            option_value: request.option_value.clone(),
        });
        self.choices
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(not_scripted("choice")))
    }

    async fn recalculate_tax(
        &self,
        request: &RecalculateRequest,
    ) -> Result<RecalculateResponse, BackendError> {
        self.record(Call::Recalculate {
            manual_amounts: request
                .manual_amounts
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        });
        self.recalculations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(not_scripted("recalculation")))
    }

    async fn update_tax_in_financial_data(
        &self,
        request: &TaxSyncRequest,
    ) -> Result<TaxSyncResponse, BackendError> {
        self.record(Call::TaxSync {
            tax_difference: request.tax_difference,
        });
        self.tax_syncs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(not_scripted("tax sync")))
    }

    async fn upload_files(&self, files: &[UploadFile]) -> Result<serde_json::Value, BackendError> {
        self.record(Call::Upload {
            file_count: files.len(),
        });
        self.uploads
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(not_scripted("upload")))
    }
}

// ─── Step builders ───────────────────────────────────────────────────────────

pub fn step(step_number: u32, question_type: QuestionType, text: &str) -> ChatStep {
    ChatStep {
        step_number,
        block: None,
        question_text: text.to_string(),
        question_type,
        input_type: None,
        input_placeholder: None,
        options: Vec::new(),
    }
}

pub fn option(order: u32, value: &str, next_step: Option<u32>) -> ChatOption {
    ChatOption {
        option_order: order,
        option_text: Some(value.to_string()),
        option_value: value.to_string(),
        next_step,
        action_type: ActionType::Navigate,
        action_data: None,
    }
}

pub fn with_options(mut step: ChatStep, options: Vec<ChatOption>) -> ChatStep {
    step.options = options;
    step
}
