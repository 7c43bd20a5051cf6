//! ChatFlow: the conversation state machine.
//!
//! A transition starts from a user action (option click, input submit,
//! finished upload) or from `load_chat_step`, and is driven to rest by a
//! loop: each resolution yields either `Transition::Goto(step)`, which loads
//! the next step, or `Transition::Stay`. Steps with an automatic
//! continuation keep the loop going without user input, capped by
//! `ui.max_auto_advance`.
//!
//! Option resolution has three tiers, tried in order:
//! 1. **Named options** (`approve_tax`, `approve_calculated`, ...) with
//!    client-side business logic
//! 2. **Override variables**: `action_data.variable` naming the unused tax
//!    loss or the payroll tax adjustment goes through the override ledger
//! 3. **Generic**: the backend's `process-choice` decides, and the returned
//!    action is dispatched
//!
//! After any tier, the edit-mode rule (401 → 402, or an explicit
//! `edit_mode` signal) may toggle the INK2 editor.
//!
//! A failed transition posts one bot error message and restores the state
//! the user last saw.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use uuid::Uuid;

use super::conversation::ConversationLog;
use super::errors::FlowError;
use super::navigation::{self, NamedOption};
use super::recalc::{self, RecalcOutcome};
use super::substitution::{render, substitute_params};
use super::typewriter;
use super::types::{ChatMessage, FlowState, Transition, UiEffect};
use crate::backend::{
    ActionType, BackendError, ChatOption, ChoiceOutcome, ChoiceRequest, ClientConfig,
    FlowBackend, QuestionType,
};
use crate::ledger::{normalize_variable, selective_merge, OverrideKey, OverrideLedger};
use crate::model::{
    json_amount, parse_amount, reduce, CompanyAction, CompanyData, FinancialFact, IngestedFacts,
    UiFlag,
};

// ─── ChatFlow ───────────────────────────────────────────────────────────────

/// One chat session over a [`FlowBackend`].
pub struct ChatFlow<B: FlowBackend> {
    backend: B,
    config: ClientConfig,
    state: FlowState,
    log: ConversationLog,
    data: CompanyData,
    ledger: OverrideLedger,
    /// INK2 rows as last returned by the backend.
    server_ink2: Vec<FinancialFact>,
    /// INK2 rows as of the last save (or the upload); unsaved edits revert here.
    accepted_ink2: Vec<FinancialFact>,
    effects: Vec<UiEffect>,
}

impl<B: FlowBackend> ChatFlow<B> {
    pub fn new(backend: B, config: ClientConfig) -> Self {
        Self {
            backend,
            config,
            state: FlowState::Idle,
            log: ConversationLog::new(),
            data: CompanyData::default(),
            ledger: OverrideLedger::new(),
            server_ink2: Vec::new(),
            accepted_ink2: Vec::new(),
            effects: Vec::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn current_step(&self) -> Option<u32> {
        self.state.step_number()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.log.messages()
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn data(&self) -> &CompanyData {
        &self.data
    }

    pub fn ledger(&self) -> &OverrideLedger {
        &self.ledger
    }

    /// Drain pending UI side effects.
    pub fn take_effects(&mut self) -> Vec<UiEffect> {
        std::mem::take(&mut self.effects)
    }

    /// The UI finished revealing a message.
    pub fn complete_reveal(&mut self, id: Uuid) -> bool {
        self.log.complete(id)
    }

    /// Apply a model update coming from outside the conversation.
    pub fn dispatch(&mut self, action: CompanyAction) {
        reduce(&mut self.data, action);
    }

    // ─── Entry points ───────────────────────────────────────────────────────

    /// Load the configured first step.
    pub async fn start(&mut self) -> Result<(), FlowError> {
        let first = self.config.ui.first_step;
        self.load_chat_step(first).await
    }

    /// Load a step and follow its automatic continuations.
    pub async fn load_chat_step(&mut self, step_number: u32) -> Result<(), FlowError> {
        let prior = self.state.clone();
        self.drive(Ok(Transition::Goto(step_number)), prior).await
    }

    /// The user clicked an option rendered for `step_number`.
    pub async fn select_option(
        &mut self,
        step_number: u32,
        option_value: &str,
    ) -> Result<(), FlowError> {
        self.select_option_with_step(step_number, option_value, None)
            .await
    }

    /// Like [`select_option`](Self::select_option), with a step that
    /// overrides the option's own `next_step`.
    pub async fn select_option_with_step(
        &mut self,
        step_number: u32,
        option_value: &str,
        explicit_step: Option<u32>,
    ) -> Result<(), FlowError> {
        let stale = || FlowError::StaleOption {
            step: step_number,
            option_value: option_value.to_string(),
        };
        let FlowState::AwaitingOptions { step, options } = &self.state else {
            return Err(stale());
        };
        if *step != step_number {
            return Err(stale());
        }
        let option = options
            .iter()
            .find(|o| o.option_value == option_value)
            .cloned()
            .ok_or_else(stale)?;

        tracing::info!(
            step = step_number,
            option = %option.option_value,
            "flow: option selected"
        );
        let echo = option
            .option_text
            .clone()
            .unwrap_or_else(|| option.option_value.clone());
        self.log.push_user(echo);

        let prior = self.state.clone();
        let first = self.resolve_option(&option, explicit_step, None).await;
        self.drive(first, prior).await
    }

    /// The user submitted the input field.
    pub async fn submit_input(&mut self, raw: &str) -> Result<(), FlowError> {
        let FlowState::AwaitingInput {
            step,
            input_type,
            submit,
            ..
        } = &self.state
        else {
            return Err(FlowError::NotAwaitingInput);
        };
        let (step, input_type, submit) = (*step, input_type.clone(), submit.clone());
        let raw = raw.trim();
        tracing::info!(step, "flow: input submitted");

        let prior = self.state.clone();
        let value = match self.parse_input(raw, input_type.as_deref(), &submit) {
            Ok(value) => value,
            Err(e) => return Err(self.fail(e, prior)),
        };
        self.log.push_user(raw);

        let first = self.resolve_option(&submit, None, Some(value)).await;
        self.drive(first, prior).await
    }

    /// Ingested file data is ready.
    ///
    /// Loads it into the model, resets overrides and, if the upload widget
    /// was showing, continues the conversation.
    pub async fn complete_file_upload(&mut self, facts: IngestedFacts) -> Result<(), FlowError> {
        tracing::info!(
            fiscal_year = ?facts.fiscal_year,
            ink2_rows = facts.ink2_data.len(),
            "flow: file data loaded"
        );
        self.server_ink2 = facts.ink2_data.clone();
        self.accepted_ink2 = facts.ink2_data.clone();
        self.ledger = OverrideLedger::new();
        reduce(&mut self.data, CompanyAction::LoadIngested(Box::new(facts)));

        let next = match &self.state {
            FlowState::FileUploadPrompt { step, next_step } => Some(next_step.unwrap_or(step + 1)),
            _ => None,
        };
        match next {
            Some(next) => {
                let prior = self.state.clone();
                self.drive(Ok(Transition::Goto(next)), prior).await
            }
            None => Ok(()),
        }
    }

    // ─── Transition driver ──────────────────────────────────────────────────

    async fn drive(
        &mut self,
        first: Result<Transition, FlowError>,
        prior: FlowState,
    ) -> Result<(), FlowError> {
        let limit = self.config.ui.max_auto_advance;
        let mut next = first;
        let mut hops = 0u32;
        loop {
            let step = match next {
                Ok(Transition::Stay) => return Ok(()),
                Ok(Transition::Goto(step)) => step,
                Err(e) => return Err(self.fail(e, prior)),
            };
            hops += 1;
            if hops > limit {
                return Err(self.fail(FlowError::AutoAdvanceLoop { step, limit }, prior));
            }
            next = self.enter_step(step).await;
        }
    }

    fn fail(&mut self, error: FlowError, prior: FlowState) -> FlowError {
        tracing::warn!(
            error = %error,
            step = ?prior.step_number(),
            "flow: transition failed"
        );
        self.state = prior;
        if error.is_reported_in_chat() {
            self.log
                .push(ChatMessage::bot(error.user_message()).with_icon("error"));
        }
        error
    }

    async fn enter_step(&mut self, step_number: u32) -> Result<Transition, FlowError> {
        tracing::info!(step = step_number, "flow: loading step");
        self.state = FlowState::Loading { step: step_number };
        let step = self.backend.fetch_step(step_number).await?;
        let text = self.render_text(&step.question_text);

        if let Some(auto) = step.auto_advance_option().cloned() {
            if step.question_type == QuestionType::Message && !text.trim().is_empty() {
                let id = self.log.push_bot(text.clone());
                typewriter::play(&text, self.config.reveal).await;
                self.log.complete(id);
            }
            self.schedule_scroll(step_number);
            tracing::debug!(
                step = step_number,
                next = ?auto.next_step,
                "flow: auto-advancing"
            );
            return self.resolve_option(&auto, None, None).await;
        }

        if !text.trim().is_empty() {
            self.log.push_bot(text);
        }
        self.state = match step.question_type {
            QuestionType::Input => FlowState::AwaitingInput {
                step: step_number,
                input_type: step.input_type.clone(),
                placeholder: step.input_placeholder.clone(),
                submit: step
                    .submit_option()
                    .cloned()
                    .unwrap_or_else(|| submit_option(None, None)),
            },
            QuestionType::Message | QuestionType::Options => FlowState::AwaitingOptions {
                step: step_number,
                options: step.visible_options(),
            },
        };
        self.schedule_scroll(step_number);
        Ok(Transition::Stay)
    }

    fn render_text(&self, template: &str) -> String {
        let context = self.data.substitution_context();
        let overrides: BTreeMap<String, Value> = self
            .ledger
            .display_manuals()
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect();
        render(template, &context, &overrides)
    }

    fn schedule_scroll(&mut self, step_number: u32) {
        if let Some((anchor, delay)) = navigation::scroll_target(step_number, &self.config.ui) {
            self.effects.push(UiEffect::ScrollToAnchor {
                anchor: anchor.to_string(),
                delay,
            });
        }
    }

    // ─── Resolution ─────────────────────────────────────────────────────────

    async fn resolve_option(
        &mut self,
        option: &ChatOption,
        explicit_step: Option<u32>,
        input: Option<Value>,
    ) -> Result<Transition, FlowError> {
        let from = self.current_step();
        let (transition, signal) =
            if let Some(named) = navigation::named_option(&option.option_value, from) {
                tracing::debug!(?named, "flow: named option");
                let transition = self.resolve_named(named, option, explicit_step).await?;
                (transition, option.action_data.clone())
            } else if let Some(key) = navigation::override_target(option) {
                tracing::debug!(key = key.variable_name(), "flow: override option");
                let transition = self
                    .resolve_override(key, option, explicit_step, input.as_ref())
                    .await?;
                (transition, option.action_data.clone())
            } else {
                self.resolve_generic(option, explicit_step, input).await?
            };

        let to = match transition {
            Transition::Goto(step) => Some(step),
            Transition::Stay => None,
        };
        if let Some(on) = navigation::edit_mode_side_effect(from, to, signal.as_ref()) {
            tracing::debug!(on, "flow: edit mode toggled by transition");
            reduce(&mut self.data, CompanyAction::SetEditMode(on));
        }
        Ok(transition)
    }

    /// Tier 1.
    async fn resolve_named(
        &mut self,
        named: NamedOption,
        option: &ChatOption,
        explicit_step: Option<u32>,
    ) -> Result<Transition, FlowError> {
        let target = explicit_step.or(option.next_step);
        match named {
            NamedOption::ApproveTax => {
                let amount = self
                    .data
                    .booked_tax
                    .or(self.data.calculated_tax)
                    .unwrap_or(0.0);
                reduce(&mut self.data, CompanyAction::ApproveTax(amount));
            }
            NamedOption::ApproveCalculated => {
                let sync = recalc::sync_calculated_tax(&self.backend, &mut self.data).await?;
                tracing::debug!(?sync, "flow: calculated tax approved");
                let amount = self
                    .data
                    .calculated_tax
                    .or(self.data.booked_tax)
                    .unwrap_or(0.0);
                reduce(&mut self.data, CompanyAction::ApproveTax(amount));
            }
            NamedOption::ReviewAdjustments => {
                reduce(&mut self.data, CompanyAction::SetFlag(UiFlag::ShowTaxPreview, true));
                reduce(&mut self.data, CompanyAction::SetFlag(UiFlag::ShowAllTaxRows, true));
            }
            NamedOption::AdjustCalculated => {
                reduce(&mut self.data, CompanyAction::SetFlag(UiFlag::ShowTaxPreview, true));
                reduce(&mut self.data, CompanyAction::SetEditMode(true));
            }
            NamedOption::KeepCurrent => {
                self.discard_unsaved_overrides().await?;
            }
            NamedOption::NoUnusedLoss => {
                self.set_override(OverrideKey::UnusedTaxLoss, 0.0).await?;
                let next = target
                    .unwrap_or_else(|| navigation::override_fallback_step(navigation::UNUSED_LOSS_STEP));
                return Ok(Transition::Goto(next));
            }
        }
        Ok(target.map_or(Transition::Stay, Transition::Goto))
    }

    /// Tier 2.
    async fn resolve_override(
        &mut self,
        key: OverrideKey,
        option: &ChatOption,
        explicit_step: Option<u32>,
        input: Option<&Value>,
    ) -> Result<Transition, FlowError> {
        let value = match input {
            Some(v) => json_amount(v).ok_or_else(|| FlowError::InvalidAmount {
                input: v.to_string(),
            })?,
            None => self.override_value(key, option),
        };
        self.set_override(key, value).await?;

        let current = self.current_step().unwrap_or(self.config.ui.first_step);
        let next = explicit_step
            .or(option.next_step)
            .unwrap_or_else(|| navigation::override_fallback_step(current));
        Ok(Transition::Goto(next))
    }

    /// Value an override option carries, or the model's best default.
    fn override_value(&self, key: OverrideKey, option: &ChatOption) -> f64 {
        let declared = option
            .action_data
            .as_ref()
            .and_then(|d| d.get("value").or_else(|| d.get("amount")))
            .map(|v| substitute_params(v, &self.data.substitution_context()))
            .and_then(|v| json_amount(&v));
        if let Some(value) = declared {
            return value;
        }
        match key {
            OverrideKey::UnusedTaxLoss => self.data.unused_tax_loss.unwrap_or(0.0),
            OverrideKey::PayrollTaxAdjustment => {
                match (self.data.payroll_tax_calculated, self.data.payroll_tax_booked) {
                    (Some(calculated), Some(booked)) => calculated - booked,
                    (Some(calculated), None) => calculated,
                    _ => 0.0,
                }
            }
        }
    }

    /// Tier 3. Also returns the action data the edit-mode rule looks at.
    async fn resolve_generic(
        &mut self,
        option: &ChatOption,
        explicit_step: Option<u32>,
        input: Option<Value>,
    ) -> Result<(Transition, Option<Value>), FlowError> {
        // Declared continuations and local submits need no round trip.
        if option.is_auto_advance() && option.action_type == ActionType::Navigate {
            if let Some(next) = explicit_step.or(option.next_step) {
                return Ok((self.navigate(next), option.action_data.clone()));
            }
        }
        if option.is_submit() && option.action_type == ActionType::SetVariable {
            if let Some(name) = option.action_str("variable") {
                let value = input.unwrap_or(Value::Null);
                self.set_variable(name.to_string(), value).await?;
                let next = explicit_step.or(option.next_step);
                return Ok((
                    next.map_or(Transition::Stay, Transition::Goto),
                    option.action_data.clone(),
                ));
            }
        }

        let step_number = self.current_step().unwrap_or(self.config.ui.first_step);
        let mut context = self.data.tax_context();
        if let Some(value) = &input {
            context.insert("input_value".into(), value.clone());
        }
        let request = ChoiceRequest {
            step_number,
            option_value: option.option_value.clone(),
            context,
        };
        let outcome = self.backend.process_choice(&request).await?;
        tracing::info!(
            step = step_number,
            action = ?outcome.action_type,
            next = ?outcome.next_step,
            "flow: choice processed"
        );

        let transition = self
            .dispatch_outcome(option, &outcome, explicit_step, input)
            .await?;
        let signal = outcome.action_data.or_else(|| option.action_data.clone());
        Ok((transition, signal))
    }

    async fn dispatch_outcome(
        &mut self,
        option: &ChatOption,
        outcome: &ChoiceOutcome,
        explicit_step: Option<u32>,
        input: Option<Value>,
    ) -> Result<Transition, FlowError> {
        let next = explicit_step.or(outcome.next_step).or(option.next_step);
        let goto = next.map_or(Transition::Stay, Transition::Goto);
        let field = |key: &str| outcome.action_data.as_ref().and_then(|d| d.get(key));

        match outcome.action_type {
            ActionType::SetVariable => {
                let name = outcome
                    .action_str("variable")
                    .or_else(|| option.action_str("variable"));
                match name {
                    Some(name) => {
                        let value = input
                            .or_else(|| field("value").cloned())
                            .unwrap_or(Value::Null);
                        self.set_variable(name.to_string(), value).await?;
                    }
                    None => tracing::warn!("flow: set_variable without a variable name"),
                }
                Ok(goto)
            }
            ActionType::ApiCall => {
                let context = self.data.substitution_context();
                let mut hints = match field("params").map(|p| substitute_params(p, &context)) {
                    Some(Value::Object(map)) => map,
                    _ => Map::new(),
                };
                hints
                    .entry("trigger")
                    .or_insert_with(|| Value::from("api_call"));
                self.apply_overrides(hints).await?;
                Ok(goto)
            }
            ActionType::EnableEditing => {
                reduce(&mut self.data, CompanyAction::SetEditMode(true));
                Ok(goto)
            }
            ActionType::SaveManualTax => {
                self.ledger.accept();
                self.accepted_ink2 = self.data.ink2_data.clone();
                reduce(&mut self.data, CompanyAction::SetFlag(UiFlag::ManualTaxSaved, true));
                reduce(&mut self.data, CompanyAction::SetEditMode(false));
                Ok(goto)
            }
            ActionType::ResetTaxEdits => {
                self.discard_unsaved_overrides().await?;
                Ok(goto)
            }
            ActionType::ShowInput => {
                let step = self.current_step().unwrap_or(self.config.ui.first_step);
                self.state = FlowState::AwaitingInput {
                    step,
                    input_type: outcome.action_str("input_type").map(String::from),
                    placeholder: outcome.action_str("placeholder").map(String::from),
                    submit: submit_option(next, outcome.action_data.clone()),
                };
                Ok(Transition::Stay)
            }
            ActionType::ShowFileUpload => {
                let step = self.current_step().unwrap_or(self.config.ui.first_step);
                self.state = FlowState::FileUploadPrompt {
                    step,
                    next_step: next,
                };
                Ok(Transition::Stay)
            }
            ActionType::Navigate | ActionType::Unknown => {
                Ok(next.map_or(Transition::Stay, |step| self.navigate(step)))
            }
        }
    }

    fn navigate(&mut self, step: u32) -> Transition {
        if navigation::is_tax_related(step) {
            reduce(&mut self.data, CompanyAction::SetFlag(UiFlag::ShowTaxPreview, true));
        }
        Transition::Goto(step)
    }

    /// Validate raw input before it is echoed or sent anywhere.
    fn parse_input(
        &self,
        raw: &str,
        input_type: Option<&str>,
        submit: &ChatOption,
    ) -> Result<Value, FlowError> {
        let value = if is_text_input(input_type) {
            Value::String(raw.to_string())
        } else {
            let amount = parse_amount(raw).ok_or_else(|| FlowError::InvalidAmount {
                input: raw.to_string(),
            })?;
            Value::from(amount)
        };

        if let (Some(variable), Some(amount)) = (submit.action_str("variable"), value.as_f64()) {
            if navigation::is_dividend_variable(variable) {
                self.check_dividend(amount)?;
            }
        }
        Ok(value)
    }

    // ─── Model updates ──────────────────────────────────────────────────────

    async fn set_variable(&mut self, name: String, value: Value) -> Result<(), FlowError> {
        if let Some(key) = normalize_variable(&name) {
            let amount = json_amount(&value).ok_or_else(|| FlowError::InvalidAmount {
                input: value.to_string(),
            })?;
            return self.set_override(key, amount).await;
        }
        if navigation::is_dividend_variable(&name) {
            let amount = json_amount(&value).ok_or_else(|| FlowError::InvalidAmount {
                input: value.to_string(),
            })?;
            self.check_dividend(amount)?;
            reduce(&mut self.data, CompanyAction::SetDividend(amount));
            return Ok(());
        }
        reduce(&mut self.data, CompanyAction::SetVariable { name, value });
        Ok(())
    }

    fn check_dividend(&self, amount: f64) -> Result<(), FlowError> {
        let available = self.data.free_equity;
        let too_large = available.is_some_and(|equity| amount > equity);
        if amount < 0.0 || too_large {
            return Err(FlowError::DividendExceedsFreeEquity {
                requested: amount,
                available: available.unwrap_or(0.0),
            });
        }
        Ok(())
    }

    /// Drop unsaved overrides: rows go back to the last saved set, then the
    /// saved overrides are re-applied. Closes the editor.
    async fn discard_unsaved_overrides(&mut self) -> Result<(), FlowError> {
        self.ledger.revert();
        if !self.accepted_ink2.is_empty() {
            let restored = selective_merge(
                &self.accepted_ink2,
                &self.accepted_ink2,
                &self.ledger.display_manuals(),
            );
            reduce(&mut self.data, CompanyAction::SetInk2Rows(restored));
        }
        self.apply_overrides(Map::new()).await?;
        reduce(&mut self.data, CompanyAction::SetEditMode(false));
        Ok(())
    }

    /// Record an override and push it into the rows. Rolls the ledger back
    /// if the recalculation fails.
    async fn set_override(&mut self, key: OverrideKey, value: f64) -> Result<(), FlowError> {
        let saved = self.ledger.clone();
        self.ledger.set(key, value);
        if let Err(e) = self.apply_overrides(Map::new()).await {
            self.ledger = saved;
            return Err(e.into());
        }
        if key == OverrideKey::UnusedTaxLoss {
            reduce(&mut self.data, CompanyAction::SetUnusedTaxLoss(value));
        }
        Ok(())
    }

    async fn apply_overrides(
        &mut self,
        hints: Map<String, Value>,
    ) -> Result<RecalcOutcome, BackendError> {
        recalc::apply_overrides(
            &self.backend,
            &mut self.data,
            &mut self.ledger,
            &mut self.server_ink2,
            hints,
        )
        .await
    }
}

fn is_text_input(input_type: Option<&str>) -> bool {
    matches!(
        input_type.map(|t| t.to_ascii_lowercase()).as_deref(),
        Some("text" | "string" | "textarea" | "email")
    )
}

/// The `submit` half of an input shown without one from the server.
fn submit_option(next_step: Option<u32>, action_data: Option<Value>) -> ChatOption {
    let has_variable = action_data
        .as_ref()
        .and_then(|d| d.get("variable"))
        .is_some();
    ChatOption {
        option_order: u32::MAX,
        option_text: None,
        option_value: "submit".to_string(),
        next_step,
        action_type: if has_variable {
            ActionType::SetVariable
        } else {
            ActionType::Navigate
        },
        action_data,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::backend::mock::{option, step, with_options, Call, MockBackend};
    use crate::backend::RevealPacing;
    use crate::flow::types::RevealState;
    use crate::model::row_amount;

    fn config() -> ClientConfig {
        ClientConfig {
            reveal: RevealPacing::instant(),
            ..ClientConfig::default()
        }
    }

    fn chat(backend: MockBackend) -> ChatFlow<MockBackend> {
        ChatFlow::new(backend, config())
    }

    fn ink2() -> Vec<FinancialFact> {
        vec![
            FinancialFact::new("INK4.1", 100_000.0).with_order(1.0),
            FinancialFact::new("INK4.14a", 0.0).with_order(14.0),
            FinancialFact::new("justering_sarskild_loneskatt", 0.0).with_order(20.0),
            FinancialFact::new("INK_beraknad_skatt", 20_600.0).with_order(30.0),
        ]
    }

    fn facts() -> IngestedFacts {
        IngestedFacts {
            company_name: Some("Exempel AB".into()),
            fiscal_year: Some(2024),
            ink2_data: ink2(),
            booked_tax: Some(20_600.0),
            free_equity: Some(100_000.0),
            ..IngestedFacts::default()
        }
    }

    fn options_step(n: u32, text: &str, options: Vec<ChatOption>) -> crate::backend::ChatStep {
        with_options(step(n, QuestionType::Options, text), options)
    }

    fn with_action(mut opt: ChatOption, action_type: ActionType, data: Value) -> ChatOption {
        opt.action_type = action_type;
        opt.action_data = Some(data);
        opt
    }

    fn outcome(action_type: ActionType, data: Option<Value>, next: Option<u32>) -> ChoiceOutcome {
        ChoiceOutcome {
            action_type,
            action_data: data,
            next_step: next,
        }
    }

    fn texts(flow: &ChatFlow<MockBackend>) -> Vec<String> {
        flow.messages().iter().map(|m| m.text.clone()).collect()
    }

    #[tokio::test]
    async fn test_start_renders_substituted_question_and_options() {
        let backend = MockBackend::new().with_step(options_step(
            101,
            "Hej {company_name}! Ska vi börja?",
            vec![
                option(2, "no", Some(103)),
                option(1, "yes", Some(102)),
                option(3, "submit", None),
            ],
        ));
        let mut flow = chat(backend);
        flow.complete_file_upload(facts()).await.unwrap();
        flow.start().await.unwrap();

        assert_eq!(texts(&flow), vec!["Hej Exempel AB! Ska vi börja?"]);
        let FlowState::AwaitingOptions { step, options } = flow.state() else {
            panic!("expected options, got {:?}", flow.state());
        };
        assert_eq!(*step, 101);
        let values: Vec<&str> = options.iter().map(|o| o.option_value.as_str()).collect();
        assert_eq!(values, vec!["yes", "no"]);
    }

    #[tokio::test]
    async fn test_auto_advance_options_step_without_extra_message() {
        let backend = MockBackend::new()
            .with_step(options_step(
                101,
                "Mellansteg",
                vec![option(0, "no_option", Some(102))],
            ))
            .with_step(options_step(102, "Fråga", vec![option(1, "ok", None)]));
        let mut flow = chat(backend);
        flow.start().await.unwrap();

        assert_eq!(flow.current_step(), Some(102));
        assert_eq!(texts(&flow), vec!["Fråga"]);
        assert!(flow.messages().iter().all(|m| m.is_bot));
        assert_eq!(
            flow.backend()
                .count(|c| matches!(c, Call::ProcessChoice { .. })),
            0
        );
    }

    #[tokio::test]
    async fn test_message_step_reveals_before_advancing() {
        let backend = MockBackend::new()
            .with_step(with_options(
                step(101, QuestionType::Message, "Välkommen."),
                vec![option(0, "no_option", Some(102))],
            ))
            .with_step(options_step(102, "Fråga", vec![option(1, "ok", None)]));
        let mut flow = chat(backend);
        flow.start().await.unwrap();

        assert_eq!(texts(&flow), vec!["Välkommen.", "Fråga"]);
        assert_eq!(flow.messages()[0].reveal, RevealState::Complete);
        assert_eq!(flow.messages()[1].reveal, RevealState::Typing);
    }

    #[tokio::test]
    async fn test_failed_step_load_reports_and_stays() {
        let backend = MockBackend::new().with_step(options_step(
            101,
            "Fråga",
            vec![option(1, "yes", Some(999))],
        ));
        backend.push_choice(Ok(outcome(ActionType::Navigate, None, Some(999))));
        let mut flow = chat(backend);
        flow.start().await.unwrap();
        let before = flow.state().clone();

        let err = flow.select_option(101, "yes").await.unwrap_err();
        assert!(matches!(err, FlowError::Backend(_)));
        assert_eq!(flow.state(), &before);
        let last = flow.log().last().unwrap();
        assert!(last.is_bot);
        assert_eq!(last.text, err.user_message());
        assert_eq!(flow.messages().len(), 3, "question, echo, error");
    }

    #[tokio::test]
    async fn test_stale_option_rejected_without_side_effects() {
        let backend = MockBackend::new().with_step(options_step(
            101,
            "Fråga",
            vec![option(1, "yes", Some(102))],
        ));
        let mut flow = chat(backend);
        flow.start().await.unwrap();

        let err = flow.select_option(101, "maybe").await.unwrap_err();
        assert!(matches!(err, FlowError::StaleOption { .. }));
        let err = flow.select_option(100, "yes").await.unwrap_err();
        assert!(matches!(err, FlowError::StaleOption { .. }));
        assert_eq!(flow.messages().len(), 1);
        assert_eq!(flow.backend().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_without_input_field_is_rejected() {
        let mut flow = chat(MockBackend::new());
        let err = flow.submit_input("100").await.unwrap_err();
        assert!(matches!(err, FlowError::NotAwaitingInput));
        assert!(flow.messages().is_empty());
    }

    fn dividend_backend() -> MockBackend {
        let submit = with_action(
            option(1, "submit", Some(502)),
            ActionType::SetVariable,
            json!({ "variable": "arets_utdelning" }),
        );
        let mut input = with_options(
            step(501, QuestionType::Input, "Hur stor utdelning?"),
            vec![submit],
        );
        input.input_type = Some("amount".into());
        MockBackend::new()
            .with_step(input)
            .with_step(options_step(
                502,
                "Balanseras: {carried_forward} kr",
                vec![option(1, "ok", None)],
            ))
    }

    #[tokio::test]
    async fn test_dividend_above_free_equity_rejected() {
        let mut flow = chat(dividend_backend());
        flow.complete_file_upload(facts()).await.unwrap();
        flow.load_chat_step(501).await.unwrap();

        let err = flow.submit_input("150 000").await.unwrap_err();
        assert!(matches!(err, FlowError::DividendExceedsFreeEquity { .. }));
        assert_eq!(flow.data().dividend, None);
        assert_eq!(flow.data().carried_forward, None);
        assert!(matches!(flow.state(), FlowState::AwaitingInput { step: 501, .. }));
        assert_eq!(
            flow.backend()
                .count(|c| matches!(c, Call::ProcessChoice { .. })),
            0
        );
        assert!(flow.messages().iter().all(|m| m.text != "150 000"));
        assert!(flow.messages().last().unwrap().is_bot);
    }

    #[tokio::test]
    async fn test_dividend_within_free_equity_sets_carry_forward() {
        let mut flow = chat(dividend_backend());
        flow.complete_file_upload(facts()).await.unwrap();
        flow.load_chat_step(501).await.unwrap();

        flow.submit_input("40000").await.unwrap();
        assert_eq!(flow.data().dividend, Some(40_000.0));
        assert_eq!(flow.data().carried_forward, Some(60_000.0));
        assert_eq!(flow.current_step(), Some(502));
        assert_eq!(flow.log().last().unwrap().text, "Balanseras: 60 000 kr");
    }

    #[tokio::test]
    async fn test_invalid_amount_reported_in_chat() {
        let mut flow = chat(dividend_backend());
        flow.load_chat_step(501).await.unwrap();

        let err = flow.submit_input("mycket").await.unwrap_err();
        assert!(matches!(err, FlowError::InvalidAmount { .. }));
        assert_eq!(flow.log().last().unwrap().text, err.user_message());
        assert!(matches!(flow.state(), FlowState::AwaitingInput { .. }));
    }

    #[tokio::test]
    async fn test_rejected_input_is_not_echoed() {
        let mut flow = chat(dividend_backend());
        flow.load_chat_step(501).await.unwrap();
        let before = flow.messages().len();

        flow.submit_input("mycket").await.unwrap_err();
        let added = &flow.messages()[before..];
        assert_eq!(added.len(), 1);
        assert!(added[0].is_bot);
        assert_eq!(added[0].icon.as_deref(), Some("error"));
    }

    fn tax_backend() -> MockBackend {
        MockBackend::new()
            .with_step(options_step(
                201,
                "Beräknad skatt {calculated_tax} kr, bokförd {booked_tax} kr.",
                vec![
                    option(1, "approve_calculated", Some(202)),
                    option(2, "approve_tax", Some(202)),
                    option(3, "review_adjustments", None),
                ],
            ))
            .with_step(options_step(202, "Klart", vec![option(1, "ok", None)]))
    }

    #[tokio::test]
    async fn test_equal_tax_approval_skips_sync() {
        let mut flow = chat(tax_backend());
        flow.complete_file_upload(facts()).await.unwrap();
        flow.load_chat_step(201).await.unwrap();
        assert_eq!(
            flow.messages()[0].text,
            "Beräknad skatt 20 600 kr, bokförd 20 600 kr."
        );

        flow.select_option(201, "approve_calculated").await.unwrap();
        assert_eq!(
            flow.backend().count(|c| matches!(c, Call::TaxSync { .. })),
            0
        );
        assert_eq!(flow.data().approved_tax, Some(20_600.0));
        assert!(flow.data().flags.tax_approved);
        assert_eq!(flow.current_step(), Some(202));
    }

    #[tokio::test]
    async fn test_different_tax_syncs_and_tolerates_404() {
        let backend = tax_backend();
        backend.push_tax_sync(Err(BackendError::HttpError {
            status: 404,
            body: "Not Found".into(),
        }));
        let mut flow = chat(backend);
        flow.complete_file_upload(IngestedFacts {
            booked_tax: Some(18_000.0),
            ..facts()
        })
        .await
        .unwrap();
        flow.load_chat_step(201).await.unwrap();

        flow.select_option(201, "approve_calculated").await.unwrap();
        assert_eq!(
            flow.backend().count(|c| matches!(c, Call::TaxSync { .. })),
            1
        );
        assert_eq!(flow.data().approved_tax, Some(20_600.0));
        assert!(flow.messages().iter().all(|m| m.icon.is_none()));
        assert_eq!(flow.current_step(), Some(202));
    }

    #[tokio::test]
    async fn test_approve_tax_uses_booked_amount() {
        let mut flow = chat(tax_backend());
        flow.complete_file_upload(IngestedFacts {
            booked_tax: Some(18_000.0),
            ..facts()
        })
        .await
        .unwrap();
        flow.load_chat_step(201).await.unwrap();

        flow.select_option(201, "approve_tax").await.unwrap();
        assert_eq!(flow.data().approved_tax, Some(18_000.0));
        assert!(flow.backend().calls().iter().all(|c| !matches!(c, Call::TaxSync { .. })));
    }

    #[tokio::test]
    async fn test_review_adjustments_stays_and_opens_preview() {
        let mut flow = chat(tax_backend());
        flow.load_chat_step(201).await.unwrap();

        flow.select_option(201, "review_adjustments").await.unwrap();
        assert!(flow.data().flags.show_tax_preview);
        assert!(flow.data().flags.show_all_tax_rows);
        assert_eq!(flow.current_step(), Some(201));
    }

    fn unused_loss_backend() -> MockBackend {
        MockBackend::new()
            .with_step(options_step(
                301,
                "Har bolaget outnyttjat underskott?",
                vec![option(2, "none", None), option(1, "yes", None)],
            ))
            .with_step(options_step(302, "Nästa", vec![option(1, "ok", None)]))
    }

    fn recalculated(unused_loss: f64, tax: f64) -> Vec<FinancialFact> {
        let mut rows = ink2();
        rows[1].amount = unused_loss;
        rows[3].amount = tax;
        rows
    }

    #[tokio::test]
    async fn test_none_on_unused_loss_step_sets_zero_override() {
        let backend = unused_loss_backend();
        backend.push_recalculation(recalculated(0.0, 20_600.0));
        let mut flow = chat(backend);
        flow.complete_file_upload(facts()).await.unwrap();
        flow.load_chat_step(301).await.unwrap();

        flow.select_option(301, "none").await.unwrap();
        assert_eq!(flow.ledger().get(OverrideKey::UnusedTaxLoss), Some(0.0));
        assert_eq!(flow.data().unused_tax_loss, Some(0.0));
        assert_eq!(flow.current_step(), Some(302));
        assert_eq!(
            flow.backend()
                .count(|c| matches!(c, Call::ProcessChoice { .. })),
            0
        );
    }

    #[tokio::test]
    async fn test_override_option_bypasses_process_choice() {
        let payroll = with_action(
            option(1, "adjust", None),
            ActionType::ApiCall,
            json!({ "variable": "sarskild_loneskatt", "value": 2426 }),
        );
        let backend = MockBackend::new()
            .with_step(options_step(420, "Justera löneskatt?", vec![payroll]))
            .with_step(options_step(422, "Klart", vec![option(1, "ok", None)]));
        backend.push_recalculation(recalculated(0.0, 20_100.0));
        let mut flow = chat(backend);
        flow.complete_file_upload(facts()).await.unwrap();
        flow.load_chat_step(420).await.unwrap();

        flow.select_option(420, "adjust").await.unwrap();
        assert_eq!(
            flow.ledger().get(OverrideKey::PayrollTaxAdjustment),
            Some(2_426.0)
        );
        assert_eq!(
            row_amount(&flow.data().ink2_data, "justering_sarskild_loneskatt"),
            Some(-2_426.0)
        );
        assert_eq!(flow.data().calculated_tax, Some(20_100.0));
        assert_eq!(flow.current_step(), Some(422), "fallback 420 → 422");
        assert_eq!(
            flow.backend()
                .count(|c| matches!(c, Call::ProcessChoice { .. })),
            0
        );
    }

    #[tokio::test]
    async fn test_show_input_then_override_submit() {
        let backend = unused_loss_backend();
        backend.push_choice(Ok(outcome(
            ActionType::ShowInput,
            Some(json!({ "variable": "unusedTaxLoss", "input_type": "amount" })),
            Some(302),
        )));
        backend.push_recalculation(recalculated(15_000.0, 17_500.0));
        let mut flow = chat(backend);
        flow.complete_file_upload(facts()).await.unwrap();
        flow.load_chat_step(301).await.unwrap();

        flow.select_option(301, "yes").await.unwrap();
        assert!(matches!(flow.state(), FlowState::AwaitingInput { step: 301, .. }));

        flow.submit_input("15 000").await.unwrap();
        assert_eq!(flow.ledger().get(OverrideKey::UnusedTaxLoss), Some(15_000.0));
        assert_eq!(row_amount(&flow.data().ink2_data, "INK4.14a"), Some(15_000.0));
        assert_eq!(flow.data().calculated_tax, Some(17_500.0));
        assert_eq!(flow.current_step(), Some(302));
        let calls = flow.backend().calls();
        assert!(calls.contains(&Call::Recalculate {
            manual_amounts: vec![
                ("INK4.14a".to_string(), 15_000.0),
                ("justering_sarskild_loneskatt".to_string(), 0.0),
            ]
        }));
    }

    #[tokio::test]
    async fn test_keep_current_reverts_unsaved_override() {
        let adjust = with_action(
            option(1, "adjust", Some(402)),
            ActionType::Navigate,
            json!({ "variable": "INK4.14a", "value": 9000 }),
        );
        let backend = MockBackend::new()
            .with_step(options_step(401, "Justera?", vec![adjust]))
            .with_step(options_step(
                402,
                "Behåll?",
                vec![option(1, "keep_current", Some(403))],
            ))
            .with_step(options_step(403, "Klart", vec![option(1, "ok", None)]));
        backend.push_recalculation(recalculated(9_000.0, 18_700.0));
        backend.push_recalculation(recalculated(0.0, 20_600.0));
        let mut flow = chat(backend);
        flow.complete_file_upload(facts()).await.unwrap();
        flow.load_chat_step(401).await.unwrap();

        flow.select_option(401, "adjust").await.unwrap();
        assert_eq!(row_amount(&flow.data().ink2_data, "INK4.14a"), Some(9_000.0));
        assert!(flow.data().flags.edit_mode, "401 → 402 opens the editor");

        flow.select_option(402, "keep_current").await.unwrap();
        assert!(flow.ledger().is_empty());
        assert_eq!(row_amount(&flow.data().ink2_data, "INK4.14a"), Some(0.0));
        assert_eq!(
            flow.backend()
                .count(|c| matches!(c, Call::Recalculate { .. })),
            2
        );
        assert_eq!(flow.data().calculated_tax, Some(20_600.0));
        assert!(!flow.data().flags.edit_mode);
        assert_eq!(flow.current_step(), Some(403));
    }

    #[tokio::test]
    async fn test_generic_set_variable_and_navigate() {
        let backend = MockBackend::new()
            .with_step(options_step(110, "Bolagsform?", vec![option(1, "ab", None)]))
            .with_step(options_step(401, "INK2", vec![option(1, "ok", None)]));
        backend.push_choice(Ok(outcome(
            ActionType::SetVariable,
            Some(json!({ "variable": "bolagsform", "value": "AB" })),
            Some(401),
        )));
        let mut flow = chat(backend);
        flow.load_chat_step(110).await.unwrap();

        flow.select_option(110, "ab").await.unwrap();
        assert_eq!(flow.data().extra.get("bolagsform"), Some(&json!("AB")));
        assert_eq!(flow.current_step(), Some(401));
        // set_variable is not a navigate action, so the preview stays closed.
        assert!(!flow.data().flags.show_tax_preview);
    }

    #[tokio::test]
    async fn test_navigate_to_tax_step_opens_preview_and_scrolls() {
        let backend = MockBackend::new()
            .with_step(options_step(110, "Vidare?", vec![option(1, "go", None)]))
            .with_step(options_step(401, "INK2", vec![option(1, "ok", None)]));
        backend.push_choice(Ok(outcome(ActionType::Navigate, None, Some(401))));
        let mut flow = chat(backend);
        flow.load_chat_step(110).await.unwrap();
        assert!(flow.take_effects().is_empty());

        flow.select_option(110, "go").await.unwrap();
        assert!(flow.data().flags.show_tax_preview);
        assert_eq!(
            flow.take_effects(),
            vec![UiEffect::ScrollToAnchor {
                anchor: "ink2-section".into(),
                delay: Duration::from_millis(500),
            }]
        );
        assert!(flow.take_effects().is_empty());
    }

    #[tokio::test]
    async fn test_auto_advance_step_420_scroll_timing() {
        let backend = MockBackend::new()
            .with_step(with_options(
                step(420, QuestionType::Message, "Löneskatt"),
                vec![option(0, "no_option", Some(421))],
            ))
            .with_step(options_step(421, "Fråga", vec![option(1, "ok", None)]));
        let mut flow = chat(backend);
        flow.load_chat_step(420).await.unwrap();

        assert_eq!(
            flow.take_effects(),
            vec![UiEffect::ScrollToAnchor {
                anchor: "payroll-tax-row".into(),
                delay: Duration::from_millis(200),
            }]
        );
    }

    #[tokio::test]
    async fn test_explicit_edit_mode_signal_from_backend() {
        let backend = MockBackend::new()
            .with_step(options_step(410, "Redigera?", vec![option(1, "edit", None)]))
            .with_step(options_step(411, "Redigera raderna", vec![option(1, "ok", None)]));
        backend.push_choice(Ok(outcome(
            ActionType::Navigate,
            Some(json!({ "edit_mode": "enable" })),
            Some(411),
        )));
        let mut flow = chat(backend);
        flow.load_chat_step(410).await.unwrap();

        flow.select_option(410, "edit").await.unwrap();
        assert!(flow.data().flags.edit_mode);
        assert!(flow.data().flags.show_all_tax_rows);
        assert_eq!(flow.current_step(), Some(411));
    }

    #[tokio::test]
    async fn test_save_manual_tax_accepts_overrides() {
        let backend = MockBackend::new()
            .with_step(options_step(402, "Spara?", vec![option(1, "save", None)]))
            .with_step(options_step(403, "Sparat", vec![option(1, "ok", None)]));
        backend.push_choice(Ok(outcome(ActionType::SaveManualTax, None, Some(403))));
        let mut flow = chat(backend);
        flow.dispatch(CompanyAction::SetEditMode(true));
        flow.load_chat_step(402).await.unwrap();

        flow.select_option(402, "save").await.unwrap();
        assert!(!flow.data().flags.edit_mode);
        assert!(flow.data().flags.manual_tax_saved);
        assert!(!flow.ledger().has_unsaved_changes());
    }

    #[tokio::test]
    async fn test_auto_advance_loop_is_capped() {
        let backend = MockBackend::new().with_step(options_step(
            101,
            "",
            vec![option(0, "no_option", Some(101))],
        ));
        let mut flow = chat(backend);

        let err = flow.start().await.unwrap_err();
        assert!(matches!(err, FlowError::AutoAdvanceLoop { step: 101, .. }));
        assert_eq!(flow.state(), &FlowState::Idle);
        assert_eq!(flow.backend().calls().len(), 32);
        assert_eq!(flow.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_file_upload_prompt_continues_after_upload() {
        let backend = MockBackend::new()
            .with_step(options_step(101, "Ladda upp?", vec![option(1, "upload", None)]))
            .with_step(options_step(102, "Tack {company_name}", vec![option(1, "ok", None)]));
        backend.push_choice(Ok(outcome(ActionType::ShowFileUpload, None, Some(102))));
        let mut flow = chat(backend);
        flow.start().await.unwrap();

        flow.select_option(101, "upload").await.unwrap();
        assert_eq!(
            flow.state(),
            &FlowState::FileUploadPrompt {
                step: 101,
                next_step: Some(102)
            }
        );

        flow.complete_file_upload(facts()).await.unwrap();
        assert_eq!(flow.current_step(), Some(102));
        assert_eq!(flow.log().last().unwrap().text, "Tack Exempel AB");
        assert!(flow.data().flags.show_statement_preview);
    }
}
